use crate::{PvClient, PvError, PvValue};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// In-memory PV store.
///
/// Reading a PV that was never written is `PvError::NotConnected`. Every
/// put is appended to a log so tests can check write order.
#[derive(Debug, Default)]
pub struct MockPvClient {
    values: Mutex<HashMap<String, PvValue>>,
    puts: Mutex<Vec<(String, PvValue)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicked test thread must not hide the store from the others.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockPvClient {
    pub fn new() -> Self {
        Default::default()
    }

    /// Seed a value without recording a put.
    pub fn set(&self, pvname: &str, value: impl Into<PvValue>) {
        lock(&self.values).insert(pvname.to_string(), value.into());
    }

    pub fn value(&self, pvname: &str) -> Option<PvValue> {
        lock(&self.values).get(pvname).cloned()
    }

    pub fn put_log(&self) -> Vec<(String, PvValue)> {
        lock(&self.puts).clone()
    }

    /// Puts to a single PV, in order.
    pub fn puts_to(&self, pvname: &str) -> Vec<PvValue> {
        lock(&self.puts)
            .iter()
            .filter(|(name, _)| name == pvname)
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn clear_log(&self) {
        lock(&self.puts).clear();
    }
}

impl PvClient for MockPvClient {
    fn get(&self, pvname: &str) -> Result<PvValue, PvError> {
        self.value(pvname)
            .ok_or_else(|| PvError::NotConnected(pvname.to_string()))
    }

    fn put(&self, pvname: &str, value: PvValue, _wait: bool) -> Result<(), PvError> {
        lock(&self.puts).push((pvname.to_string(), value.clone()));
        lock(&self.values).insert(pvname.to_string(), value);
        Ok(())
    }
}
