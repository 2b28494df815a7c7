//! Immutable description of one dispatch call.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Model;
use crate::name::IndirectionName;
use crate::types::{Principal, Value};

/// Request option that makes `find` skip the cache read.
pub const IGNORE_CACHE: &str = "ignore_cache";
/// Request option naming the environment a node or catalog belongs to.
pub const ENVIRONMENT: &str = "environment";

/// The four operations every terminus is polymorphic over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Find,
    Search,
    Save,
    Destroy,
}

impl Operation {
    /// Lowercase operation name used in logs, errors and the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Find => "find",
            Operation::Search => "search",
            Operation::Save => "save",
            Operation::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation against one indirection.
///
/// Fields are private: a request is assembled with the constructor for its
/// operation plus the `with_*` builders, and is read-only afterwards. A save
/// request can only be built from an instance, so the "save carries an
/// instance" invariant holds by construction.
#[derive(Debug, Clone)]
pub struct Request<M> {
    indirection: IndirectionName,
    operation: Operation,
    key: String,
    instance: Option<M>,
    options: BTreeMap<String, Value>,
    requester: Option<Principal>,
}

impl<M: Model> Request<M> {
    fn new(operation: Operation, key: String, instance: Option<M>) -> Self {
        Self {
            indirection: M::INDIRECTION,
            operation,
            key,
            instance,
            options: BTreeMap::new(),
            requester: None,
        }
    }

    /// Look up a single instance by key.
    #[must_use]
    pub fn find(key: impl Into<String>) -> Self {
        Self::new(Operation::Find, key.into(), None)
    }

    /// Enumerate instances matching `pattern`.
    #[must_use]
    pub fn search(pattern: impl Into<String>) -> Self {
        Self::new(Operation::Search, pattern.into(), None)
    }

    /// Persist `instance` under its own name.
    #[must_use]
    pub fn save(instance: M) -> Self {
        let key = instance.name().to_string();
        Self::new(Operation::Save, key, Some(instance))
    }

    /// Persist `instance` under an explicit key.
    #[must_use]
    pub fn save_as(key: impl Into<String>, instance: M) -> Self {
        Self::new(Operation::Save, key.into(), Some(instance))
    }

    /// Remove the instance stored under `key`.
    #[must_use]
    pub fn destroy(key: impl Into<String>) -> Self {
        Self::new(Operation::Destroy, key.into(), None)
    }

    /// Adds one option.
    #[must_use]
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Adds every option from `options`, replacing duplicates.
    #[must_use]
    pub fn with_options(mut self, options: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.options.extend(options);
        self
    }

    /// Records the identity that issued the request.
    #[must_use]
    pub fn with_requester(mut self, requester: Principal) -> Self {
        self.requester = Some(requester);
        self
    }

    /// Derives the save request the cache layer uses to store a find result.
    ///
    /// Keeps key, options and requester of the original find.
    #[must_use]
    pub fn to_cache_save(&self, result: M) -> Self {
        Self {
            indirection: self.indirection,
            operation: Operation::Save,
            key: self.key.clone(),
            instance: Some(result),
            options: self.options.clone(),
            requester: self.requester.clone(),
        }
    }

    #[must_use]
    pub fn indirection(&self) -> IndirectionName {
        self.indirection
    }

    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Instance carried by a save request. `None` for every other operation.
    #[must_use]
    pub fn instance(&self) -> Option<&M> {
        self.instance.as_ref()
    }

    #[must_use]
    pub fn options(&self) -> &BTreeMap<String, Value> {
        &self.options
    }

    #[must_use]
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    #[must_use]
    pub fn requester(&self) -> Option<&Principal> {
        self.requester.as_ref()
    }

    /// Whether the caller asked `find` to bypass the cache read.
    #[must_use]
    pub fn ignore_cache(&self) -> bool {
        self.option(IGNORE_CACHE).is_some_and(Value::is_truthy)
    }

    /// Environment option, if the caller supplied one.
    #[must_use]
    pub fn environment(&self) -> Option<&str> {
        self.option(ENVIRONMENT).and_then(Value::as_str)
    }
}

impl<M> fmt::Display for Request<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.operation, self.indirection, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::Facts;

    #[test]
    fn save_uses_instance_name_as_key() {
        let request = Request::save(Facts::new("web01"));
        assert_eq!(request.operation(), Operation::Save);
        assert_eq!(request.key(), "web01");
        assert_eq!(request.indirection(), IndirectionName::FACTS);
        assert!(request.instance().is_some());
    }

    #[test]
    fn find_carries_no_instance() {
        let request = Request::<Facts>::find("web01");
        assert!(request.instance().is_none());
        assert_eq!(request.to_string(), "find facts/web01");
    }

    #[test]
    fn options_and_requester() {
        let request = Request::<Facts>::find("web01")
            .with_option(IGNORE_CACHE, true)
            .with_option(ENVIRONMENT, "staging")
            .with_requester(Principal::authenticated("master"));
        assert!(request.ignore_cache());
        assert_eq!(request.environment(), Some("staging"));
        assert_eq!(request.requester().unwrap().id, "master");
    }

    #[test]
    fn cache_save_keeps_key_and_options() {
        let find = Request::<Facts>::find("web01").with_option(ENVIRONMENT, "dev");
        let save = find.to_cache_save(Facts::new("web01"));
        assert_eq!(save.operation(), Operation::Save);
        assert_eq!(save.key(), "web01");
        assert_eq!(save.environment(), Some("dev"));
        assert!(save.instance().is_some());
    }
}
