//! In-process registry.
//!
//! Keeps instances in a map and counts every operation, which makes it a
//! stand-in for a real registry when embedding the host or testing the
//! discovery lifecycle. It can be switched to "unreachable" to simulate an
//! outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::discovery::instance::ServiceInstance;
use crate::discovery::registry::{RegistryConnection, RegistryConnector, RegistryError};

/// Operation counters of a [`MemoryRegistry`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub connect_attempts: u32,
    pub connects: u32,
    pub registers: u32,
    pub updates: u32,
    pub unregisters: u32,
    pub closes: u32,
}

#[derive(Debug, Default)]
struct MemoryState {
    instances: HashMap<String, ServiceInstance>,
    stats: RegistryStats,
    unreachable: bool,
    failing_connects: u32,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent connect attempt fail with a transient error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Fail the next `n` connect attempts, then recover.
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().failing_connects = n;
    }

    /// Currently registered instances.
    pub fn instances(&self) -> Vec<ServiceInstance> {
        self.lock().instances.values().cloned().collect()
    }

    pub fn stats(&self) -> RegistryStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RegistryConnector for MemoryRegistry {
    async fn connect(&self) -> Result<Box<dyn RegistryConnection>, RegistryError> {
        let mut state = self.lock();
        state.stats.connect_attempts += 1;
        if state.unreachable {
            return Err(RegistryError::Unavailable("memory registry unreachable".into()));
        }
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(RegistryError::Unavailable("memory registry flapping".into()));
        }
        state.stats.connects += 1;

        Ok(Box::new(MemoryConnection {
            registry: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryConnection {
    registry: MemoryRegistry,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn open_state(&self) -> Result<MutexGuard<'_, MemoryState>, RegistryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RegistryError::Closed);
        }
        Ok(self.registry.lock())
    }
}

#[async_trait]
impl RegistryConnection for MemoryConnection {
    async fn register(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        let mut state = self.open_state()?;
        state.stats.registers += 1;
        state.instances.insert(instance.key(), instance.clone());
        Ok(())
    }

    async fn update(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        let mut state = self.open_state()?;
        let key = instance.key();
        match state.instances.get_mut(&key) {
            Some(stored) => *stored = instance.clone(),
            None => return Err(RegistryError::NotRegistered(key)),
        }
        state.stats.updates += 1;
        Ok(())
    }

    async fn unregister(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        let mut state = self.open_state()?;
        state.stats.unregisters += 1;
        state.instances.remove(&instance.key());
        Ok(())
    }

    async fn close(&self) -> Result<(), RegistryError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(RegistryError::Closed);
        }
        self.registry.lock().stats.closes += 1;
        Ok(())
    }
}
