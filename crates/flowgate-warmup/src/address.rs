//! Address book — where each runtime component listens.
//!
//! Components register their address when they bind, before reporting
//! ready, so a probe issued after readiness always resolves.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use flowgate_core::ComponentId;

/// Shared component → `host:port` map.
#[derive(Clone, Default)]
pub struct AddressBook {
    entries: Arc<RwLock<HashMap<ComponentId, String>>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: &ComponentId, address: &str) {
        let mut entries = self.entries.write().expect("address book lock");
        debug!(component = %id, %address, "registered component address");
        entries.insert(id.clone(), address.to_string());
    }

    pub fn resolve(&self, id: &ComponentId) -> Option<String> {
        let entries = self.entries.read().expect("address book lock");
        entries.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("address book lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
