//! Result store backends.

pub mod file;
pub mod memory;

pub use file::FileResultStore;
pub use memory::InMemoryResultStore;
