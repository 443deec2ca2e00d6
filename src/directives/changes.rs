use std::collections::BTreeMap;

use serde_json::Value;

/// One input transition as reported by the host runtime. `None` means the
/// input is absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimpleChange {
    pub previous_value: Option<Value>,
    pub current_value: Option<Value>,
    pub first_change: bool,
}

impl SimpleChange {
    pub fn new(previous_value: Option<Value>, current_value: Option<Value>, first_change: bool) -> Self {
        Self {
            previous_value,
            current_value,
            first_change,
        }
    }

    pub fn first(current_value: impl Into<Value>) -> Self {
        Self::new(None, Some(current_value.into()), true)
    }

    pub fn is_first_change(&self) -> bool {
        self.first_change
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimpleChanges(BTreeMap<String, SimpleChange>);

impl SimpleChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, input_name: impl Into<String>, change: SimpleChange) -> Self {
        self.insert(input_name, change);
        self
    }

    pub fn insert(&mut self, input_name: impl Into<String>, change: SimpleChange) {
        self.0.insert(input_name.into(), change);
    }

    pub fn get(&self, input_name: &str) -> Option<&SimpleChange> {
        self.0.get(input_name)
    }

    pub fn contains(&self, input_name: &str) -> bool {
        self.0.contains_key(input_name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SimpleChange)> {
        self.0.iter().map(|(name, change)| (name.as_str(), change))
    }
}
