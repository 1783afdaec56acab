//! Local edits applied during a read-modify-write cycle.

use std::collections::{BTreeMap, BTreeSet};

use dbgrid_core::{ProviderError, ProviderResult};

/// Keys to set and keys to remove. Removals apply after sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunableChanges {
    set: BTreeMap<String, String>,
    unset: BTreeSet<String>,
}

impl TunableChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `KEY=VALUE` pairs. The value may itself contain `=`.
    pub fn from_assignments<S: AsRef<str>>(pairs: &[S]) -> ProviderResult<Self> {
        let mut changes = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            match pair.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    changes.set(key.trim(), value);
                }
                _ => {
                    return Err(ProviderError::InvalidArgument(format!(
                        "invalid tunable {pair:?}, expected KEY=VALUE"
                    )));
                }
            }
        }
        Ok(changes)
    }

    /// Removal of each of `keys`.
    pub fn from_removals<S: AsRef<str>>(keys: &[S]) -> ProviderResult<Self> {
        let mut changes = Self::new();
        for key in keys {
            let key = key.as_ref().trim();
            if key.is_empty() {
                return Err(ProviderError::InvalidArgument("empty tunable key".to_string()));
            }
            changes.unset(key);
        }
        Ok(changes)
    }

    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        self.unset.remove(key);
        self.set.insert(key.to_string(), value.to_string());
        self
    }

    pub fn unset(&mut self, key: &str) -> &mut Self {
        self.set.remove(key);
        self.unset.insert(key.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// The result of applying these changes to `data`.
    pub fn apply(&self, data: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut out = data.clone();
        out.extend(self.set.iter().map(|(k, v)| (k.clone(), v.clone())));
        for key in &self.unset {
            out.remove(key);
        }
        out
    }
}
