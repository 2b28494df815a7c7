//! Code termini: instances computed in-process on every call.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use indirector_core::{Catalog, ClockSource, Facts, Node, Request, Value};
use tracing::debug;

use crate::error::IndirectorResult;
use crate::indirector::Terminus;

// ---------------------------------------------------------------------------
// Facts
// ---------------------------------------------------------------------------

/// Produces the raw facts of the local machine.
pub trait FactSource: Send + Sync {
    /// # Errors
    ///
    /// Implementations may fail when the platform cannot be inspected.
    fn gather(&self) -> IndirectorResult<BTreeMap<String, Value>>;
}

/// Fact source reading the host name, platform constants and `FACTER_*`
/// environment variables.
#[derive(Debug, Clone, Default)]
pub struct SystemFactSource;

/// Prefix of environment variables exported as facts.
const ENV_FACT_PREFIX: &str = "FACTER_";

impl SystemFactSource {
    fn hostname() -> String {
        std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .or_else(|| {
                std::fs::read_to_string("/proc/sys/kernel/hostname")
                    .ok()
                    .map(|h| h.trim().to_string())
                    .filter(|h| !h.is_empty())
            })
            .unwrap_or_else(|| "localhost".to_string())
    }
}

impl FactSource for SystemFactSource {
    fn gather(&self) -> IndirectorResult<BTreeMap<String, Value>> {
        let mut facts = BTreeMap::new();
        let fqdn = Self::hostname();
        let (hostname, domain) = match fqdn.split_once('.') {
            Some((host, domain)) => (host.to_string(), Some(domain.to_string())),
            None => (fqdn.clone(), None),
        };
        facts.insert("fqdn".to_string(), Value::from(fqdn));
        facts.insert("hostname".to_string(), Value::from(hostname));
        if let Some(domain) = domain {
            facts.insert("domain".to_string(), Value::from(domain));
        }
        facts.insert("kernel".to_string(), Value::from(std::env::consts::OS));
        facts.insert("osfamily".to_string(), Value::from(std::env::consts::FAMILY));
        facts.insert(
            "architecture".to_string(),
            Value::from(std::env::consts::ARCH),
        );
        for (name, value) in std::env::vars() {
            if let Some(fact) = name.strip_prefix(ENV_FACT_PREFIX) {
                facts.insert(fact.to_lowercase(), Value::from(value));
            }
        }
        Ok(facts)
    }
}

/// `facter` terminus of the facts indirection. Find only.
pub struct FacterTerminus {
    source: Arc<dyn FactSource>,
    clock: Arc<dyn ClockSource>,
    downcase: bool,
}

impl FacterTerminus {
    #[must_use]
    pub fn new(source: Arc<dyn FactSource>, clock: Arc<dyn ClockSource>, downcase: bool) -> Self {
        Self {
            source,
            clock,
            downcase,
        }
    }
}

#[async_trait]
impl Terminus<Facts> for FacterTerminus {
    fn name(&self) -> &'static str {
        "facter"
    }

    async fn find(&self, request: &Request<Facts>) -> IndirectorResult<Option<Facts>> {
        let raw = self.source.gather()?;
        let mut facts = Facts::from_raw(request.key(), raw);
        facts.timestamp = self.clock.now();
        facts.add_local_facts();
        facts.downcase_if_necessary(self.downcase);
        debug!(certname = request.key(), count = facts.values.len(), "gathered facts");
        Ok(Some(facts))
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// `plain` terminus of the node indirection: an unclassified node per key.
#[derive(Debug, Clone, Default)]
pub struct PlainNodeTerminus;

#[async_trait]
impl Terminus<Node> for PlainNodeTerminus {
    fn name(&self) -> &'static str {
        "plain"
    }

    async fn find(&self, request: &Request<Node>) -> IndirectorResult<Option<Node>> {
        let node = match request.environment() {
            Some(environment) => Node::new(request.key()).with_environment(environment),
            None => Node::new(request.key()),
        };
        Ok(Some(node))
    }
}

// ---------------------------------------------------------------------------
// Catalogs
// ---------------------------------------------------------------------------

/// Catalog compiler collaborator.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// # Errors
    ///
    /// Returns the compiler's failure; it is passed through unchanged.
    async fn compile(&self, node: &Node) -> IndirectorResult<Catalog>;
}

/// `compiler` terminus of the catalog indirection.
pub struct CompilerTerminus {
    compiler: Arc<dyn Compiler>,
}

impl CompilerTerminus {
    #[must_use]
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self { compiler }
    }
}

#[async_trait]
impl Terminus<Catalog> for CompilerTerminus {
    fn name(&self) -> &'static str {
        "compiler"
    }

    async fn find(&self, request: &Request<Catalog>) -> IndirectorResult<Option<Catalog>> {
        let mut node = Node::new(request.key());
        if let Some(environment) = request.environment() {
            node.environment = environment.to_string();
        }
        let catalog = self.compiler.compile(&node).await?;
        debug!(
            node = request.key(),
            resources = catalog.resources.len(),
            "compiled catalog"
        );
        Ok(Some(catalog))
    }
}
