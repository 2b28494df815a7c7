//! Wiring of the default terminus classes and run-mode configuration.
//!
//! [`Collaborators`] is the injection point for the pieces the crate does not
//! ship (compiler, fact source, broker). [`register_termini`] makes every
//! built-in class available and [`configure`] binds the four indirections to
//! the classes their run mode calls for.

use std::fmt;
use std::sync::Arc;

use indirector_core::{Catalog, Facts, Host, IndirectionName, Model, Node};
use tracing::info;

use crate::config::{RunMode, Settings};
use crate::error::IndirectorResult;
use crate::indirector::{IndirectionRegistry, Terminus, TerminusContext, TerminusKind};
use crate::termini::{
    Broker, CertificateStatusTerminus, Compiler, CompilerTerminus, DirectoryBroker,
    FactSource, FacterTerminus, FileTerminus, MemoryTerminus, PlainNodeTerminus, QueueTerminus,
    RestTerminus, SystemFactSource,
};

/// Terminus class backing the catalog store fed by the queue daemon.
pub const STORE_CONFIGS: &str = "store_configs";

/// External pieces the built-in termini delegate to.
#[derive(Clone)]
pub struct Collaborators {
    /// Catalog compiler; the `compiler` class is only registered when set.
    pub compiler: Option<Arc<dyn Compiler>>,
    pub fact_source: Arc<dyn FactSource>,
    pub broker: Arc<dyn Broker>,
}

impl Collaborators {
    /// System fact source and a directory broker spooling under `queue_dir`.
    #[must_use]
    pub fn for_settings(settings: &Settings) -> Self {
        Self {
            compiler: None,
            fact_source: Arc::new(SystemFactSource),
            broker: Arc::new(DirectoryBroker::new(settings.queue_dir())),
        }
    }

    #[must_use]
    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    #[must_use]
    pub fn with_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = broker;
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("compiler", &self.compiler.is_some())
            .field("broker", &self.broker.name())
            .finish_non_exhaustive()
    }
}

/// Terminus and cache class one indirection starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub name: IndirectionName,
    pub terminus: &'static str,
    pub cache: Option<&'static str>,
}

impl Binding {
    const fn new(name: IndirectionName, terminus: &'static str, cache: Option<&'static str>) -> Self {
        Self {
            name,
            terminus,
            cache,
        }
    }
}

/// Default bindings for `mode`, in registration order.
#[must_use]
pub fn default_bindings(mode: RunMode) -> [Binding; 4] {
    match mode {
        RunMode::Agent => [
            Binding::new(IndirectionName::FACTS, "facter", None),
            Binding::new(IndirectionName::NODE, "rest", None),
            Binding::new(IndirectionName::CATALOG, "rest", Some("file")),
            Binding::new(IndirectionName::CERTIFICATE_STATUS, "rest", None),
        ],
        RunMode::Master => [
            Binding::new(IndirectionName::FACTS, "file", None),
            Binding::new(IndirectionName::NODE, "plain", None),
            Binding::new(IndirectionName::CATALOG, "compiler", None),
            Binding::new(IndirectionName::CERTIFICATE_STATUS, "file", None),
        ],
        RunMode::Queue => [
            Binding::new(IndirectionName::FACTS, "file", None),
            Binding::new(IndirectionName::NODE, "plain", None),
            Binding::new(IndirectionName::CATALOG, STORE_CONFIGS, None),
            Binding::new(IndirectionName::CERTIFICATE_STATUS, "rest", None),
        ],
        RunMode::Apply => [
            Binding::new(IndirectionName::FACTS, "facter", None),
            Binding::new(IndirectionName::NODE, "plain", None),
            Binding::new(IndirectionName::CATALOG, "compiler", None),
            Binding::new(IndirectionName::CERTIFICATE_STATUS, "file", None),
        ],
    }
}

/// Registers every built-in terminus class on `registry`.
///
/// # Errors
///
/// Fails only if an indirection name is already bound to another model type.
pub fn register_termini(
    registry: &IndirectionRegistry,
    collaborators: &Collaborators,
) -> IndirectorResult<()> {
    register_common::<Facts>(registry)?;
    register_common::<Node>(registry)?;
    register_common::<Catalog>(registry)?;

    let source = Arc::clone(&collaborators.fact_source);
    registry.register_terminus::<Facts, _>("facter", TerminusKind::Code, move |ctx| {
        Ok(Arc::new(FacterTerminus::new(
            Arc::clone(&source),
            Arc::clone(&ctx.clock),
            ctx.settings.downcase_facts,
        )) as Arc<dyn Terminus<Facts>>)
    })?;

    registry.register_terminus::<Node, _>("plain", TerminusKind::Code, |_ctx| {
        Ok(Arc::new(PlainNodeTerminus) as Arc<dyn Terminus<Node>>)
    })?;

    if let Some(compiler) = &collaborators.compiler {
        let compiler = Arc::clone(compiler);
        registry.register_terminus::<Catalog, _>("compiler", TerminusKind::Code, move |_ctx| {
            Ok(Arc::new(CompilerTerminus::new(Arc::clone(&compiler))) as Arc<dyn Terminus<Catalog>>)
        })?;
    }
    let broker = Arc::clone(&collaborators.broker);
    registry.register_terminus::<Catalog, _>("queue", TerminusKind::Queue, move |_ctx| {
        Ok(Arc::new(QueueTerminus::<Catalog>::new(Arc::clone(&broker))) as Arc<dyn Terminus<Catalog>>)
    })?;
    registry.register_terminus::<Catalog, _>(STORE_CONFIGS, TerminusKind::File, |ctx| {
        Ok(Arc::new(FileTerminus::<Catalog>::new(
            STORE_CONFIGS,
            ctx.settings.storeconfigs_dir(),
            ctx.settings.preferred_format,
        )) as Arc<dyn Terminus<Catalog>>)
    })?;

    registry.register_terminus::<Host, _>("file", TerminusKind::File, |ctx| {
        Ok(Arc::new(CertificateStatusTerminus::new(ctx)) as Arc<dyn Terminus<Host>>)
    })?;
    registry.register_terminus::<Host, _>("rest", TerminusKind::Rest, |ctx| {
        Ok(Arc::new(RestTerminus::<Host>::new(&ctx.settings)?) as Arc<dyn Terminus<Host>>)
    })?;
    Ok(())
}

/// `memory`, `file` and `rest`, available for every routed model but
/// certificate status.
fn register_common<M: Model>(registry: &IndirectionRegistry) -> IndirectorResult<()> {
    registry.register_terminus::<M, _>("memory", TerminusKind::Memory, |_ctx| {
        Ok(Arc::new(MemoryTerminus::<M>::new("memory")) as Arc<dyn Terminus<M>>)
    })?;
    registry.register_terminus::<M, _>("file", TerminusKind::File, |ctx| {
        Ok(Arc::new(FileTerminus::<M>::new(
            "file",
            ctx.settings.yamldir(),
            ctx.settings.preferred_format,
        )) as Arc<dyn Terminus<M>>)
    })?;
    registry.register_terminus::<M, _>("rest", TerminusKind::Rest, |ctx| {
        Ok(Arc::new(RestTerminus::<M>::new(&ctx.settings)?) as Arc<dyn Terminus<M>>)
    })?;
    Ok(())
}

/// Registers the four indirections with the defaults of the configured run mode.
///
/// # Errors
///
/// Returns a configuration error when a default class is missing, e.g. a
/// master without a compiler.
pub fn configure(registry: &IndirectionRegistry) -> IndirectorResult<()> {
    let mode = registry.context().settings.run_mode;
    for binding in default_bindings(mode) {
        match binding.name {
            IndirectionName::FACTS => {
                registry.register::<Facts>(binding.name, binding.terminus, binding.cache)?;
            }
            IndirectionName::NODE => {
                registry.register::<Node>(binding.name, binding.terminus, binding.cache)?;
            }
            IndirectionName::CATALOG => {
                registry.register::<Catalog>(binding.name, binding.terminus, binding.cache)?;
            }
            _ => {
                registry.register::<Host>(binding.name, binding.terminus, binding.cache)?;
            }
        }
    }
    info!(run_mode = %mode, "indirections configured");
    Ok(())
}

/// Builds a registry with every built-in class registered and configured
/// for the run mode in `context`.
///
/// # Errors
///
/// See [`register_termini`] and [`configure`].
pub fn build_registry(
    context: TerminusContext,
    collaborators: &Collaborators,
) -> IndirectorResult<Arc<IndirectionRegistry>> {
    let registry = IndirectionRegistry::new(context);
    register_termini(&registry, collaborators)?;
    configure(&registry)?;
    Ok(Arc::new(registry))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use indirector_core::{Request, Value};

    use super::*;
    use crate::error::IndirectorError;
    use crate::termini::MemoryBroker;

    struct FixedSource;

    impl FactSource for FixedSource {
        fn gather(&self) -> IndirectorResult<BTreeMap<String, Value>> {
            Ok(BTreeMap::from([(
                "osfamily".to_string(),
                Value::from("Debian"),
            )]))
        }
    }

    struct EmptyCompiler;

    #[async_trait]
    impl Compiler for EmptyCompiler {
        async fn compile(&self, node: &Node) -> IndirectorResult<Catalog> {
            Ok(Catalog::new(node.name.clone()))
        }
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            compiler: None,
            fact_source: Arc::new(FixedSource),
            broker: Arc::new(MemoryBroker::new()),
        }
    }

    fn context(mode: RunMode, dir: &std::path::Path) -> TerminusContext {
        TerminusContext::new(Settings {
            run_mode: mode,
            ..Settings::rooted_at(dir)
        })
    }

    #[test]
    fn agent_caches_catalogs_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let registry = build_registry(context(RunMode::Agent, dir.path()), &collaborators()).unwrap();
        assert_eq!(registry.describe("catalog"), Some(("rest", Some("file"))));
        assert_eq!(registry.describe("facts"), Some(("facter", None)));
        assert_eq!(registry.describe("node"), Some(("rest", None)));
    }

    #[test]
    fn queue_mode_stores_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        let registry = build_registry(context(RunMode::Queue, dir.path()), &collaborators()).unwrap();
        assert_eq!(registry.describe("catalog"), Some((STORE_CONFIGS, None)));
    }

    #[test]
    fn master_requires_a_compiler() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_registry(context(RunMode::Master, dir.path()), &collaborators()).err().unwrap();
        assert!(matches!(err, IndirectorError::Configuration(_)));

        let with_compiler = collaborators().with_compiler(Arc::new(EmptyCompiler));
        let registry = build_registry(context(RunMode::Master, dir.path()), &with_compiler).unwrap();
        assert_eq!(registry.describe("catalog"), Some(("compiler", None)));
        assert_eq!(registry.describe("certificate_status"), Some(("file", None)));
    }

    #[tokio::test]
    async fn facter_uses_injected_source() {
        let dir = tempfile::tempdir().unwrap();
        let registry = build_registry(context(RunMode::Agent, dir.path()), &collaborators()).unwrap();
        let facts = registry.lookup::<Facts>("facts").unwrap();
        let found = facts.find(Request::find("web01")).await.unwrap().unwrap();
        assert_eq!(found.get("osfamily"), Some("Debian"));
        assert_eq!(found.get("clientcert"), Some("web01"));
    }

    #[tokio::test]
    async fn store_configs_writes_under_storeconfigs_dir() {
        let dir = tempfile::tempdir().unwrap();
        let registry = build_registry(context(RunMode::Queue, dir.path()), &collaborators()).unwrap();
        let catalogs = registry.lookup::<Catalog>("catalog").unwrap();
        catalogs
            .save(Request::save(Catalog::new("web01")))
            .await
            .unwrap();
        assert!(dir
            .path()
            .join("storeconfigs/catalog/web01.json")
            .exists());
    }
}
