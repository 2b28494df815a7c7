//! Routing half of a catalog run: facts, node, catalog, then hand-off.

use std::sync::Arc;

use async_trait::async_trait;
use indirector_core::{Catalog, Facts, IndirectionName, Node, Request, Value};
use tracing::{debug, info};

use crate::error::{IndirectorError, IndirectorResult};
use crate::indirector::{Indirection, IndirectionRegistry};
use crate::telemetry::benchmark;

/// Applies a retrieved catalog to the local system.
#[async_trait]
pub trait CatalogApplier: Send + Sync {
    /// # Errors
    ///
    /// Implementations report resources they could not converge.
    async fn apply(&self, catalog: &Catalog) -> IndirectorResult<()>;
}

/// Drives `facts.find -> node.find -> merge -> catalog.find -> apply`.
pub struct CatalogRun {
    facts: Arc<Indirection<Facts>>,
    nodes: Arc<Indirection<Node>>,
    catalogs: Arc<Indirection<Catalog>>,
    applier: Arc<dyn CatalogApplier>,
}

impl CatalogRun {
    /// # Errors
    ///
    /// Returns a configuration error when one of the three indirections is
    /// not registered.
    pub fn new(
        registry: &IndirectionRegistry,
        applier: Arc<dyn CatalogApplier>,
    ) -> IndirectorResult<Self> {
        Ok(Self {
            facts: registry.lookup::<Facts>(IndirectionName::FACTS.as_str())?,
            nodes: registry.lookup::<Node>(IndirectionName::NODE.as_str())?,
            catalogs: registry.lookup::<Catalog>(IndirectionName::CATALOG.as_str())?,
            applier,
        })
    }

    /// Retrieves the catalog for `certname` without applying it.
    ///
    /// Missing facts are tolerated; a missing node or catalog is a state error.
    ///
    /// # Errors
    ///
    /// Propagates any dispatch error from the three indirections.
    pub async fn retrieve(
        &self,
        certname: &str,
        options: impl IntoIterator<Item = (String, Value)>,
    ) -> IndirectorResult<Catalog> {
        let facts = self.facts.find(Request::find(certname)).await?;
        let mut node = self
            .nodes
            .find(Request::find(certname))
            .await?
            .ok_or_else(|| IndirectorError::state(format!("could not find node {certname}")))?;
        match &facts {
            Some(facts) => node.merge(facts),
            None => debug!(certname, "no facts found; using unmerged node"),
        }

        let request = Request::find(node.name.clone())
            .with_options(options)
            .with_option("environment", node.environment.clone());
        self.catalogs.find(request).await?.ok_or_else(|| {
            IndirectorError::state(format!("could not retrieve catalog for {}", node.name))
        })
    }

    /// Retrieves the catalog for `certname` and hands it to the applier.
    ///
    /// # Errors
    ///
    /// Propagates retrieval and application errors.
    pub async fn run(
        &self,
        certname: &str,
        options: impl IntoIterator<Item = (String, Value)>,
    ) -> IndirectorResult<Catalog> {
        let catalog = benchmark("catalog retrieval", self.retrieve(certname, options)).await?;
        info!(
            certname,
            resources = catalog.resources.len(),
            "applying catalog"
        );
        benchmark("catalog application", self.applier.apply(&catalog)).await?;
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::config::Settings;
    use crate::indirector::{Terminus, TerminusContext, TerminusKind};
    use crate::termini::{CompilerTerminus, Compiler, MemoryTerminus, PlainNodeTerminus};

    struct EchoCompiler;

    #[async_trait]
    impl Compiler for EchoCompiler {
        async fn compile(&self, node: &Node) -> IndirectorResult<Catalog> {
            let mut catalog = Catalog::new(node.name.clone());
            catalog.environment = node.environment.clone();
            catalog.add_resource(
                indirector_core::Resource::new("notify", node.environment.clone())
                    .with_parameter("message", node.name.clone()),
            );
            Ok(catalog)
        }
    }

    #[derive(Default)]
    struct Recorder {
        applied: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CatalogApplier for Recorder {
        async fn apply(&self, catalog: &Catalog) -> IndirectorResult<()> {
            self.applied.lock().push(catalog.name.clone());
            Ok(())
        }
    }

    async fn registry(facts: Option<Facts>) -> IndirectionRegistry {
        let registry = IndirectionRegistry::new(TerminusContext::new(Settings::default()));
        let store = Arc::new(MemoryTerminus::<Facts>::new("memory"));
        if let Some(facts) = facts {
            store.save(&Request::save(facts)).await.unwrap();
        }
        registry
            .register_terminus::<Facts, _>("memory", TerminusKind::Memory, move |_ctx| {
                Ok(Arc::clone(&store) as Arc<dyn Terminus<Facts>>)
            })
            .unwrap();
        registry
            .register_terminus::<Node, _>("plain", TerminusKind::Code, |_ctx| {
                Ok(Arc::new(PlainNodeTerminus) as Arc<dyn Terminus<Node>>)
            })
            .unwrap();
        registry
            .register_terminus::<Catalog, _>("compiler", TerminusKind::Code, |_ctx| {
                Ok(Arc::new(CompilerTerminus::new(Arc::new(EchoCompiler)))
                    as Arc<dyn Terminus<Catalog>>)
            })
            .unwrap();
        registry
            .register::<Facts>(IndirectionName::FACTS, "memory", None)
            .unwrap();
        registry
            .register::<Node>(IndirectionName::NODE, "plain", None)
            .unwrap();
        registry
            .register::<Catalog>(IndirectionName::CATALOG, "compiler", None)
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn run_merges_facts_into_node_and_applies() {
        let mut facts = Facts::new("web01");
        facts.insert("environment", "staging");
        let registry = registry(Some(facts)).await;
        let recorder = Arc::new(Recorder::default());
        let run = CatalogRun::new(&registry, Arc::clone(&recorder) as Arc<dyn CatalogApplier>)
            .unwrap();

        let catalog = run.run("web01", []).await.unwrap();
        assert_eq!(catalog.environment, "staging");
        assert!(catalog.resource("Notify[staging]").is_some());
        assert_eq!(*recorder.applied.lock(), vec!["web01".to_string()]);
    }

    #[tokio::test]
    async fn missing_facts_are_tolerated() {
        let registry = registry(None).await;
        let run = CatalogRun::new(&registry, Arc::new(Recorder::default())).unwrap();
        let catalog = run.retrieve("db01", []).await.unwrap();
        assert_eq!(catalog.name, "db01");
        assert_eq!(catalog.environment, "production");
    }

    #[test]
    fn requires_registered_indirections() {
        let registry = IndirectionRegistry::new(TerminusContext::new(Settings::default()));
        let err = CatalogRun::new(&registry, Arc::new(Recorder::default())).err();
        assert!(matches!(err, Some(IndirectorError::Configuration(_))));
    }
}
