//! Document store gateway for item radar.
//!
//! Models the `findOne / find / insertOne / updateOne / delete` surface of a
//! document database over the `scenes` and `items` collections. Backends:
//! [`MemoryStore`] always, [`SqliteDocumentStore`] with the `sqlite` feature.

pub mod document;
pub mod memory;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use document::*;
pub use memory::MemoryStore;
pub use store::*;

#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteDocumentStore;
