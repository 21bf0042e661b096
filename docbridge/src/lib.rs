//! Main docbridge crate providing a unified interface for typed BSON documents.
//!
//! This crate is the primary entry point for users of the docbridge framework.
//! It re-exports the codec and the document store types from the sub-crates and
//! provides convenient access to the storage backends.
//!
//! # Features
//!
//! - **Dual-path codec** - Composite values go through serde, while object ids, decimals,
//!   dates, UUIDs and the other special types get dedicated BSON elements
//! - **Typed identifiers** - `Id<T>` and `#[derive(Identity)]` for identity-aware documents
//! - **Extended JSON** - Lossless text form for logs, filters and round trips
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docbridge::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Identity)]
//! pub struct User {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
//!     pub id: Option<Id<User>>,
//!     pub name: String,
//!     pub balance: Decimal,
//! }
//!
//! impl Document for User {
//!     fn collection_name() -> &'static str { "users" }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     // Create an in-memory store backend
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await.unwrap());
//!
//!     // Get a typed collection for User documents
//!     let users = store.typed_collection::<User>();
//!
//!     // Insert a user; its identifier is generated on the way in
//!     let alice = users
//!         .insert_one(User { id: None, name: "Alice".to_string(), balance: "10.50".parse().unwrap() })
//!         .await
//!         .unwrap();
//!
//!     // Look the user up again by identifier
//!     let found = users.get(alice.id.clone().unwrap()).await.unwrap();
//!     println!("Found user: {:?}", found);
//!
//!     // Shutdown the store
//!     store.shutdown().await.unwrap();
//! }
//! ```
//!
//! # Codec Configuration
//!
//! ```ignore
//! use docbridge::{codec::Codec, id::IdGenerator, registry::UuidRepresentation};
//!
//! let codec = Codec::builder()
//!     .uuid_representation(UuidRepresentation::Standard)
//!     .id_generator(IdGenerator::UuidString)
//!     .build();
//!
//! let text = codec.to_text(&user)?;
//! let back: User = codec.from_text(&text)?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docbridge_core::{
    backend, codec, collection, decimal, document, error, extjson, id, identity, registry, shape,
    store, temporal,
};
pub use docbridge_core::document::Document;
pub use docbridge_core::store::DocumentStore;
pub use docbridge_macros::Identity;

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docbridge_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docbridge_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
