//! In-process protocol engine used by the binary and the test suites.

pub mod catalog;
mod in_memory_device;
mod in_memory_engine;
mod in_memory_hub;
pub mod pairing;

pub use catalog::StaticCatalog;
pub use in_memory_device::InMemoryDevice;
pub use in_memory_engine::{EngineEnvironment, InMemoryEngine};
pub use in_memory_hub::InMemoryHub;
