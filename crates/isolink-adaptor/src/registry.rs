use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::adaptor::ChannelAdaptor;
use crate::error::{AdaptorError, Result};

/// Name-keyed lookup of live adaptors.
///
/// Holds weak references: dropping the last handle to an adaptor frees its
/// name even without [`unregister`](Self::unregister).
#[derive(Default)]
pub struct AdaptorRegistry {
    adaptors: Mutex<HashMap<String, Weak<ChannelAdaptor>>>,
}

impl AdaptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adaptor under its name.
    pub fn register(&self, adaptor: &Arc<ChannelAdaptor>) -> Result<()> {
        let name = adaptor.name().to_string();
        let mut adaptors = self.adaptors.lock();
        if adaptors
            .get(&name)
            .is_some_and(|existing| existing.strong_count() > 0)
        {
            return Err(AdaptorError::DuplicateName(name));
        }
        debug!(adaptor = %name, "registered");
        adaptors.insert(name, Arc::downgrade(adaptor));
        Ok(())
    }

    /// Remove `name`; returns whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.adaptors.lock().remove(name).is_some();
        if removed {
            debug!(adaptor = %name, "unregistered");
        }
        removed
    }

    /// Look up a live adaptor.
    pub fn get(&self, name: &str) -> Option<Arc<ChannelAdaptor>> {
        self.adaptors.lock().get(name).and_then(Weak::upgrade)
    }

    /// Names of live adaptors, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut adaptors = self.adaptors.lock();
        adaptors.retain(|_, adaptor| adaptor.strong_count() > 0);
        let mut names: Vec<String> = adaptors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for AdaptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptorRegistry")
            .field("names", &self.names())
            .finish()
    }
}
