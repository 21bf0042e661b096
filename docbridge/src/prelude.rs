//! Convenient re-exports of commonly used types from docbridge.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docbridge::prelude::*;
//! ```
//!
//! This provides access to:
//! - The codec, its configuration and the special value types
//! - Identifiers and identity traits
//! - Document traits, collections and stores
//! - Store backends and builders
//! - Error types

pub use docbridge_core::{
    codec::{Codec, CodecBuilder, CodecConfig},
    decimal::Decimal,
    id::{Id, IdGenerator, IdValue},
    identity::{Identified, IdentityField, IdentityValue},
    registry::{MaxKey, MinKey, UuidRepresentation},
    shape::WireShape,
    temporal::Temporal,
    collection::{Collection, TypedCollection},
    store::DocumentStore,
    document::{Document, DocumentExt},
    backend::{StoreBackend, StoreBackendBuilder},
    error::{CodecError, CodecResult, DocumentStoreError, DocumentStoreResult},
};
pub use docbridge_macros::Identity;
