use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Model;
use crate::name::IndirectionName;
use crate::types::Value;

/// Version string reported as the `clientversion` local fact.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Facts gathered about one node.
///
/// Values are always strings once [`stringify`](Facts::stringify) has run;
/// the raw gatherer may produce any [`Value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facts {
    pub name: String,
    pub values: BTreeMap<String, String>,
    /// Milliseconds since Unix epoch at which the facts were gathered.
    #[serde(default)]
    pub timestamp: u64,
}

impl Facts {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
            timestamp: 0,
        }
    }

    /// Builds facts from raw gathered values, converting each to a string.
    #[must_use]
    pub fn from_raw(name: impl Into<String>, raw: BTreeMap<String, Value>) -> Self {
        let mut facts = Self::new(name);
        facts.values = stringify(raw);
        facts
    }

    pub fn insert(&mut self, fact: impl Into<String>, value: impl Into<String>) {
        self.values.insert(fact.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, fact: &str) -> Option<&str> {
        self.values.get(fact).map(String::as_str)
    }

    /// Adds the facts the agent reports about itself.
    pub fn add_local_facts(&mut self) {
        self.values
            .insert("clientcert".to_string(), self.name.clone());
        self.values
            .insert("clientversion".to_string(), CLIENT_VERSION.to_string());
    }

    /// Lowercases every value; used when the site asks for case-insensitive facts.
    pub fn downcase_if_necessary(&mut self, downcase: bool) {
        if !downcase {
            return;
        }
        for value in self.values.values_mut() {
            *value = value.to_lowercase();
        }
    }
}

/// Renders every raw fact value as a string.
fn stringify(raw: BTreeMap<String, Value>) -> BTreeMap<String, String> {
    raw.into_iter()
        .map(|(fact, value)| (fact, value.to_query()))
        .collect()
}

impl Model for Facts {
    const INDIRECTION: IndirectionName = IndirectionName::FACTS;

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_stringifies_values() {
        let mut raw = BTreeMap::new();
        raw.insert("processorcount".to_string(), Value::Int(4));
        raw.insert("is_virtual".to_string(), Value::Bool(true));
        raw.insert("osfamily".to_string(), Value::from("Debian"));

        let facts = Facts::from_raw("web01", raw);
        assert_eq!(facts.get("processorcount"), Some("4"));
        assert_eq!(facts.get("is_virtual"), Some("true"));
        assert_eq!(facts.get("osfamily"), Some("Debian"));
    }

    #[test]
    fn local_facts_name_the_client() {
        let mut facts = Facts::new("web01");
        facts.add_local_facts();
        assert_eq!(facts.get("clientcert"), Some("web01"));
        assert_eq!(facts.get("clientversion"), Some(CLIENT_VERSION));
    }

    #[test]
    fn downcase_only_when_asked() {
        let mut facts = Facts::new("web01");
        facts.insert("osfamily", "Debian");
        facts.downcase_if_necessary(false);
        assert_eq!(facts.get("osfamily"), Some("Debian"));
        facts.downcase_if_necessary(true);
        assert_eq!(facts.get("osfamily"), Some("debian"));
    }
}
