//! A typed bridge between application values and BSON documents.
//!
//! This crate is the core of the docbridge project and provides:
//!
//! - **Codec** ([`codec`]) - Converts values to BSON values, BSON bytes and extended JSON, and back
//! - **Wire shapes** ([`shape`]) - Classifies values into the structural categories the codec dispatches on
//! - **Special types** ([`registry`]) - Dedicated codecs for object ids, decimals, UUIDs, binaries, timestamps and min/max keys
//! - **Decimals** ([`decimal`]) - Exact decimal numbers stored as Decimal128
//! - **Dates and times** ([`temporal`]) - Epoch-millisecond conversions for chrono and std time types
//! - **Identifiers** ([`id`]) - Typed identifiers and identifier generation
//! - **Identity resolution** ([`identity`]) - Identity field discovery, generation and lookup
//! - **Extended JSON** ([`extjson`]) - Textual rendering used for logs, filters and text round trips
//! - **Document traits** ([`document`]) - Core traits for defining typed documents
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Collections** ([`collection`]) and **stores** ([`store`]) - Typed access to a backend
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docbridge::{Document, Identity, codec::Codec, decimal::Decimal, id::Id};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Identity)]
//! pub struct Product {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
//!     pub id: Option<Id<Product>>,
//!     pub price: Decimal,
//! }
//!
//! impl Document for Product {
//!     fn collection_name() -> &'static str {
//!         "products"
//!     }
//! }
//!
//! let codec = Codec::default();
//! let product = codec.ensure_identity_present(Product { id: None, price: "19.99".parse()? })?;
//! let bytes = codec.encode_to_vec(&product)?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbridge_core;

pub mod backend;
mod bridge;
pub mod codec;
pub mod collection;
pub mod decimal;
pub mod document;
pub mod error;
pub mod extjson;
pub mod id;
pub mod identity;
pub mod registry;
pub mod shape;
pub mod store;
pub mod temporal;
