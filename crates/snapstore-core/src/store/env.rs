use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::ids::{IdGenerator, UuidV7Generator};
use crate::policy::{EvictionPolicy, TtlEvictionPolicy};

/// Collaborators injected into every store of a container
///
/// Cloning shares the collaborators.
#[derive(Debug, Clone)]
pub struct StoreEnv {
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub eviction: Arc<dyn EvictionPolicy>,
}

impl Default for StoreEnv {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidV7Generator),
            eviction: Arc::new(TtlEvictionPolicy),
        }
    }
}

impl StoreEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn with_eviction(mut self, eviction: impl EvictionPolicy + 'static) -> Self {
        self.eviction = Arc::new(eviction);
        self
    }
}
