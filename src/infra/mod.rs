//! Collaborator implementations: process catalog and result stores.

pub mod catalog;
pub mod store;

pub use catalog::InMemoryProcessCatalog;
pub use store::{FileResultStore, InMemoryResultStore};
