//! Bundled store adapters and the built-in registry.
//!
//! Third-party engines plug in through [`crate::interface::StoreRegistry`];
//! the crate ships a single reference adapter so experiments run out of the
//! box.

mod analytics;
mod memory;

pub use memory::MemoryStore;

use std::sync::Arc;

use crate::interface::{GraphStore, StoreRegistry};

/// Registry pre-populated with the bundled adapters.
pub fn builtin_registry() -> StoreRegistry {
    let mut registry = StoreRegistry::new();
    registry.register("memory", |options| {
        Ok(Arc::new(MemoryStore::new(options)?) as Arc<dyn GraphStore>)
    });
    registry
}
