//! Infrastructure adapters for state storage backends.

pub mod store;
pub use store::FileCircuitStore;
pub use store::InMemoryStateStore;
