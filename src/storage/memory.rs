use color_eyre::Result;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::DurableStorage;

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl DurableStorage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(values.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
    values.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
    values.remove(key);
    Ok(())
  }

  fn change_marker(&self) -> Result<i64> {
    // Nobody else can write here
    Ok(0)
  }
}
