use std::collections::BTreeSet;

use serde_json::Value;

/// Set of user ids currently connected to the realtime channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSet {
    online: BTreeSet<String>,
}

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the id was not online before. Empty ids are ignored.
    pub fn mark_online(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if id.is_empty() {
            return false;
        }

        self.online.insert(id)
    }

    pub fn mark_offline(&mut self, id: &str) -> bool {
        self.online.remove(id)
    }

    /// Replaces the set with a server snapshot.
    ///
    /// Anything but a JSON array resets the set to empty. Numeric entries are
    /// stringified; other non-string entries are skipped.
    pub fn replace_all(&mut self, snapshot: &Value) {
        let ids = match snapshot {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(id) => Some(id.clone()),
                    Value::Number(id) => Some(id.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        self.replace_with(ids);
    }

    pub fn replace_with<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.online = ids.into_iter().filter(|id| !id.is_empty()).collect();
    }

    pub fn is_online(&self, id: &str) -> bool {
        self.online.contains(id)
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.online.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}
