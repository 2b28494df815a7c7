//! Interned indirection identifiers.

use std::fmt;

use serde::{Serialize, Serializer};

/// Interned identifier naming one logical object type (e.g. `"facts"`).
///
/// Names are `&'static str` so they are `Copy`, hash cheaply and can key
/// process-lifetime registries without allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndirectionName(&'static str);

impl IndirectionName {
    /// Node facts gathered on the agent.
    pub const FACTS: IndirectionName = IndirectionName("facts");
    /// Compiled configuration catalogs.
    pub const CATALOG: IndirectionName = IndirectionName("catalog");
    /// Certificate status records backed by the certificate authority.
    pub const CERTIFICATE_STATUS: IndirectionName = IndirectionName("certificate_status");
    /// Node classification records.
    pub const NODE: IndirectionName = IndirectionName("node");

    /// Creates a name from a static string.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Resolves one of the well-known names from a runtime string.
    #[must_use]
    pub fn well_known(name: &str) -> Option<Self> {
        [Self::FACTS, Self::CATALOG, Self::CERTIFICATE_STATUS, Self::NODE]
            .into_iter()
            .find(|n| n.0 == name)
    }

    /// Returns the underlying string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }

    /// Collection form used in REST URLs (`catalog` -> `catalogs`,
    /// `certificate_status` -> `certificate_statuses`).
    ///
    /// Names already ending in `s` would collide with their singular URL, so
    /// they take a `_search` suffix instead (`facts` -> `facts_search`).
    #[must_use]
    pub fn plural(&self) -> String {
        if self.0.ends_with("status") {
            format!("{}es", self.0)
        } else if self.0.ends_with('s') {
            format!("{}_search", self.0)
        } else {
            format!("{}s", self.0)
        }
    }
}

impl fmt::Display for IndirectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for IndirectionName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}
