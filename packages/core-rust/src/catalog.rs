use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Model;
use crate::name::IndirectionName;
use crate::node::DEFAULT_ENVIRONMENT;
use crate::types::Value;

/// One resource declaration inside a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl Resource {
    #[must_use]
    pub fn new(kind: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            parameters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Canonical reference, e.g. `File[/etc/motd]`.
    #[must_use]
    pub fn reference(&self) -> String {
        let mut kind = self.kind.clone();
        if let Some(first) = kind.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        format!("{kind}[{}]", self.title)
    }
}

/// Dependency edge between two resource references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// Compiled configuration for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub name: String,
    pub version: u64,
    pub environment: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Catalog {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            classes: Vec::new(),
            resources: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_resource(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    /// Adds an edge between two existing resources.
    ///
    /// Returns `false` (and adds nothing) when either reference is unknown.
    pub fn add_edge(&mut self, source: &str, target: &str) -> bool {
        let known = |r: &str| self.resources.iter().any(|res| res.reference() == r);
        if !known(source) || !known(target) {
            return false;
        }
        self.edges.push(Edge {
            source: source.to_string(),
            target: target.to_string(),
        });
        true
    }

    #[must_use]
    pub fn resource(&self, reference: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.reference() == reference)
    }
}

impl Model for Catalog {
    const INDIRECTION: IndirectionName = IndirectionName::CATALOG;

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_reference_capitalizes_type() {
        let r = Resource::new("file", "/etc/motd");
        assert_eq!(r.reference(), "File[/etc/motd]");
    }

    #[test]
    fn edges_require_known_resources() {
        let mut catalog = Catalog::new("web01");
        catalog.add_resource(Resource::new("package", "nginx"));
        catalog.add_resource(Resource::new("service", "nginx"));

        assert!(catalog.add_edge("Package[nginx]", "Service[nginx]"));
        assert!(!catalog.add_edge("Package[nginx]", "Service[apache]"));
        assert_eq!(catalog.edges.len(), 1);
        assert!(catalog.resource("Service[nginx]").is_some());
    }

    #[test]
    fn resource_type_serializes_as_type() {
        let r = Resource::new("file", "/tmp/x").with_parameter("ensure", "present");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["parameters"]["ensure"], "present");
    }
}
