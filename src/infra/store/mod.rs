//! State store backends.

pub mod file;
pub mod memory;

pub use file::FileCircuitStore;
pub use memory::InMemoryStateStore;
