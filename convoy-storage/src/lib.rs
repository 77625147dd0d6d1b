//! Convoy Storage - Remote Store Adapter and Local Persistence
//!
//! Defines the slice of the remote document store the sync engine consumes,
//! the cache-or-server fallback combinator built on it, an in-memory store
//! with live change streams, the local preference stores and the bulk
//! collection-delete client.

pub mod delete_client;
pub mod fallback;
pub mod memory;
pub mod prefs;
pub mod traits;

pub use delete_client::{
    CollectionDeleteClient, CollectionDeleter, DeleteResponse, StoreCollectionDeleter,
};
pub use fallback::{FallbackReader, Fetched, ReadPolicy};
pub use memory::InMemoryRemoteStore;
pub use prefs::{scoped_key, InMemoryPreferenceStore, LmdbPreferenceStore, PreferenceStore};
pub use traits::{
    ChangeBatch, ChangeKind, ChangeStream, DocumentChange, PageQuery, RemoteStore,
    UpdatePredicate, WriteMode,
};
