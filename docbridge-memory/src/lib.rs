//! In-memory document storage backend for docbridge.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development
//! and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Wire-faithful storage** - Documents are stored as encoded BSON bytes
//! - **Equality filters** - Top-level and dotted-path equality matching
//!
//! # Quick Start
//!
//! ```ignore
//! use docbridge::{Document, DocumentStore, Identity, id::Id, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Identity)]
//! pub struct User {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
//!     pub id: Option<Id<User>>,
//!     pub name: String,
//! }
//!
//! impl Document for User {
//!     fn collection_name() -> &'static str { "users" }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = DocumentStore::new(backend);
//!     let users = store.typed_collection::<User>();
//!
//!     let alice = users.insert_one(User { id: None, name: "Alice".to_string() }).await?;
//!     assert!(alice.id.is_some());
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbridge_memory;

pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
