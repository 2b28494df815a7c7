use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::facts::Facts;
use crate::model::Model;
use crate::name::IndirectionName;

/// Environment assigned to nodes that do not name one.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Classification of one node: environment, classes and top-scope parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub environment: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Node {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            classes: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Merges fact values into the node's parameters.
    ///
    /// Parameters set by the classifier win over facts of the same name. An
    /// `environment` fact selects the node's environment only when the node
    /// is still on the default.
    pub fn merge(&mut self, facts: &Facts) {
        for (fact, value) in &facts.values {
            self.parameters
                .entry(fact.clone())
                .or_insert_with(|| value.clone());
        }
        if self.environment == DEFAULT_ENVIRONMENT {
            if let Some(env) = facts.get("environment") {
                self.environment = env.to_string();
            }
        }
    }
}

impl Model for Node {
    const INDIRECTION: IndirectionName = IndirectionName::NODE;

    fn name(&self) -> &str {
        &self.name
    }
}
