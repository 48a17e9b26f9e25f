use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved key holding the last global expand/collapse action.
pub const ALL_KEY: &str = "__ALL__";

/// Open/closed state for tree nodes. Per-key entries beat the global
/// `__ALL__` value, which beats the caller's default; a global action does
/// not clear per-key entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandState {
    #[serde(rename = "__ALL__", default, skip_serializing_if = "Option::is_none")]
    all: Option<bool>,
    #[serde(flatten)]
    overrides: BTreeMap<String, bool>,
}

impl ExpandState {
    pub fn is_open(&self, key: &str, default_open: bool) -> bool {
        if key == ALL_KEY {
            return self.all.unwrap_or(default_open);
        }
        self.overrides
            .get(key)
            .copied()
            .or(self.all)
            .unwrap_or(default_open)
    }

    /// Flips what the node currently shows and pins it with a per-key entry.
    pub fn toggle(&mut self, key: &str, default_open: bool) -> bool {
        let next = !self.is_open(key, default_open);
        if key == ALL_KEY {
            self.all = Some(next);
        } else {
            self.overrides.insert(key.to_string(), next);
        }
        next
    }

    pub fn set_global(&mut self, open: bool) {
        self.all = Some(open);
    }

    pub fn clear(&mut self, key: &str) {
        if key == ALL_KEY {
            self.all = None;
        } else {
            self.overrides.remove(key);
        }
    }

    pub fn reset(&mut self) {
        self.all = None;
        self.overrides.clear();
    }
}
