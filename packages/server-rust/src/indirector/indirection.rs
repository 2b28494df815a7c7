//! A configured binding between one model type and its termini.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indirector_core::{IndirectionName, Model, Operation, Request};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::cache::CachedTerminus;
use super::terminus::{Terminus, TerminusClass, TerminusContext};
use crate::error::{IndirectorError, IndirectorResult};

/// Terminus classes registered for one indirection, shared with the registry
/// so classes registered after the indirection are still resolvable.
pub(crate) type ClassTable<M> = Arc<RwLock<HashMap<&'static str, TerminusClass<M>>>>;

/// Named binding between a model type and its configured terminus classes.
///
/// Terminus instances are built lazily on first use and memoized per class
/// name, so switching back to a previously used class reuses its instance.
pub struct Indirection<M: Model> {
    name: IndirectionName,
    context: TerminusContext,
    classes: ClassTable<M>,
    terminus_class: RwLock<&'static str>,
    cache_class: RwLock<Option<&'static str>>,
    instances: DashMap<&'static str, Arc<dyn Terminus<M>>>,
}

impl<M: Model> Indirection<M> {
    /// Creates an indirection; both class names must already be registered.
    ///
    /// # Errors
    ///
    /// Returns [`IndirectorError::Configuration`] for an unknown class name.
    pub(crate) fn new(
        context: TerminusContext,
        classes: ClassTable<M>,
        terminus_class: &str,
        cache_class: Option<&str>,
    ) -> IndirectorResult<Self> {
        let indirection = Self {
            name: M::INDIRECTION,
            context,
            classes,
            terminus_class: RwLock::new(""),
            cache_class: RwLock::new(None),
            instances: DashMap::new(),
        };
        let primary = indirection.resolve_class(terminus_class)?;
        let cache = cache_class
            .map(|class| indirection.resolve_class(class))
            .transpose()?;
        *indirection.terminus_class.write() = primary;
        *indirection.cache_class.write() = cache;
        Ok(indirection)
    }

    #[must_use]
    pub fn name(&self) -> IndirectionName {
        self.name
    }

    #[must_use]
    pub fn terminus_class(&self) -> &'static str {
        *self.terminus_class.read()
    }

    #[must_use]
    pub fn cache_class(&self) -> Option<&'static str> {
        *self.cache_class.read()
    }

    /// Switches the primary terminus class.
    ///
    /// # Errors
    ///
    /// Returns [`IndirectorError::Configuration`] when `class` is not
    /// registered; the previous class stays in effect.
    pub fn set_terminus_class(&self, class: &str) -> IndirectorResult<()> {
        let class = self.resolve_class(class)?;
        *self.terminus_class.write() = class;
        info!(indirection = %self.name, terminus = class, "terminus class set");
        Ok(())
    }

    /// Sets or clears the cache class.
    ///
    /// # Errors
    ///
    /// Returns [`IndirectorError::Configuration`] when `class` is not
    /// registered; the previous class stays in effect.
    pub fn set_cache_class(&self, class: Option<&str>) -> IndirectorResult<()> {
        let class = class.map(|c| self.resolve_class(c)).transpose()?;
        *self.cache_class.write() = class;
        info!(indirection = %self.name, cache = ?class, "cache class set");
        Ok(())
    }

    /// Names of every terminus class registered for this indirection.
    #[must_use]
    pub fn available_classes(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.classes.read().keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Drops memoized terminus instances; the next call rebuilds them.
    pub fn reset(&self) {
        self.instances.clear();
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Propagates terminus errors; an absent instance is `Ok(None)`.
    pub async fn find(&self, request: Request<M>) -> IndirectorResult<Option<M>> {
        let terminus = self.dispatch_target(&request, Operation::Find)?;
        terminus.find(&request).await
    }

    /// # Errors
    ///
    /// Propagates terminus errors; no matches is `Ok(vec![])`.
    pub async fn search(&self, request: Request<M>) -> IndirectorResult<Vec<M>> {
        let terminus = self.dispatch_target(&request, Operation::Search)?;
        terminus.search(&request).await
    }

    /// # Errors
    ///
    /// Propagates terminus errors.
    pub async fn save(&self, request: Request<M>) -> IndirectorResult<()> {
        let terminus = self.dispatch_target(&request, Operation::Save)?;
        terminus.save(&request).await
    }

    /// # Errors
    ///
    /// Propagates terminus errors.
    pub async fn destroy(&self, request: Request<M>) -> IndirectorResult<()> {
        let terminus = self.dispatch_target(&request, Operation::Destroy)?;
        terminus.destroy(&request).await
    }

    fn dispatch_target(
        &self,
        request: &Request<M>,
        expected: Operation,
    ) -> IndirectorResult<CachedTerminus<M>> {
        if request.operation() != expected {
            return Err(IndirectorError::configuration(format!(
                "{request} dispatched as {expected}"
            )));
        }
        let primary_class = self.terminus_class();
        let cache_class = self.cache_class();
        debug!(
            indirection = %self.name,
            operation = %expected,
            key = request.key(),
            terminus = primary_class,
            cache = ?cache_class,
            "dispatching {request}"
        );
        let primary = self.instance(primary_class)?;
        let cache = cache_class.map(|c| self.instance(c)).transpose()?;
        Ok(CachedTerminus::new(primary, cache))
    }

    // -----------------------------------------------------------------------
    // Class resolution
    // -----------------------------------------------------------------------

    fn resolve_class(&self, class: &str) -> IndirectorResult<&'static str> {
        self.classes
            .read()
            .get(class)
            .map(|c| c.name)
            .ok_or_else(|| {
                IndirectorError::configuration(format!(
                    "could not find terminus {class} for indirection {}",
                    self.name
                ))
            })
    }

    /// Memoized terminus instance for `class`, built at most once.
    fn instance(&self, class: &'static str) -> IndirectorResult<Arc<dyn Terminus<M>>> {
        if let Some(existing) = self.instances.get(class) {
            return Ok(Arc::clone(existing.value()));
        }
        let definition = self
            .classes
            .read()
            .get(class)
            .cloned()
            .ok_or_else(|| {
                IndirectorError::configuration(format!(
                    "could not find terminus {class} for indirection {}",
                    self.name
                ))
            })?;
        match self.instances.entry(class) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let terminus = definition.build(&self.context)?;
                debug!(
                    indirection = %self.name,
                    terminus = class,
                    kind = %definition.kind,
                    "built terminus"
                );
                entry.insert(Arc::clone(&terminus));
                Ok(terminus)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Type erasure for the registry
// ---------------------------------------------------------------------------

/// Model-independent view of an [`Indirection`] stored by the registry.
pub(crate) trait ErasedIndirection: Send + Sync {
    fn name(&self) -> IndirectionName;
    fn terminus_class(&self) -> &'static str;
    fn cache_class(&self) -> Option<&'static str>;
    fn reset(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<M: Model> ErasedIndirection for Indirection<M> {
    fn name(&self) -> IndirectionName {
        self.name
    }

    fn terminus_class(&self) -> &'static str {
        Indirection::terminus_class(self)
    }

    fn cache_class(&self) -> Option<&'static str> {
        Indirection::cache_class(self)
    }

    fn reset(&self) {
        Indirection::reset(self);
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use indirector_core::Facts;

    use super::*;
    use crate::config::Settings;
    use crate::indirector::terminus::TerminusKind;
    use crate::termini::MemoryTerminus;

    struct FindOnly;

    #[async_trait]
    impl Terminus<Facts> for FindOnly {
        fn name(&self) -> &'static str {
            "find_only"
        }

        async fn find(&self, request: &Request<Facts>) -> IndirectorResult<Option<Facts>> {
            Ok(Some(Facts::new(request.key())))
        }
    }

    fn table(builds: &Arc<AtomicU32>) -> ClassTable<Facts> {
        let mut classes = HashMap::new();
        let counter = Arc::clone(builds);
        classes.insert(
            "memory",
            TerminusClass::new("memory", TerminusKind::Memory, move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MemoryTerminus::<Facts>::new("memory")) as Arc<dyn Terminus<Facts>>)
            }),
        );
        classes.insert(
            "find_only",
            TerminusClass::new("find_only", TerminusKind::Code, |_ctx| {
                Ok(Arc::new(FindOnly) as Arc<dyn Terminus<Facts>>)
            }),
        );
        classes.insert(
            "broken",
            TerminusClass::new("broken", TerminusKind::Rest, |_ctx| {
                Err(IndirectorError::remote("no route to host"))
            }),
        );
        Arc::new(RwLock::new(classes))
    }

    fn indirection(terminus: &str, cache: Option<&str>) -> (Indirection<Facts>, Arc<AtomicU32>) {
        let builds = Arc::new(AtomicU32::new(0));
        let ind = Indirection::new(
            TerminusContext::new(Settings::default()),
            table(&builds),
            terminus,
            cache,
        )
        .unwrap();
        (ind, builds)
    }

    #[test]
    fn unknown_class_is_rejected_at_construction() {
        let builds = Arc::new(AtomicU32::new(0));
        let err = Indirection::new(
            TerminusContext::new(Settings::default()),
            table(&builds),
            "ldap",
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(err, IndirectorError::Configuration(_)));
    }

    #[test]
    fn failed_reconfiguration_keeps_previous_class() {
        let (ind, _) = indirection("memory", None);
        assert!(ind.set_terminus_class("ldap").is_err());
        assert_eq!(ind.terminus_class(), "memory");
        assert!(ind.set_cache_class(Some("ldap")).is_err());
        assert_eq!(ind.cache_class(), None);
    }

    #[tokio::test]
    async fn instances_are_memoized() {
        let (ind, builds) = indirection("memory", None);
        ind.save(Request::save(Facts::new("web01"))).await.unwrap();
        ind.find(Request::find("web01")).await.unwrap();
        ind.search(Request::search("*")).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        ind.reset();
        ind.find(Request::find("web01")).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_first_use_builds_once() {
        let (ind, builds) = indirection("memory", None);
        let ind = Arc::new(ind);
        let mut handles = Vec::new();
        for i in 0..16 {
            let ind = Arc::clone(&ind);
            handles.push(tokio::spawn(async move {
                ind.find(Request::find(format!("host{i}"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn constructor_failure_is_configuration_error_and_not_memoized() {
        let (ind, _) = indirection("broken", None);
        let err = ind.find(Request::find("web01")).await.unwrap_err();
        assert!(matches!(err, IndirectorError::Configuration(ref m) if m.contains("no route")));
        assert!(ind.instances.is_empty());
    }

    #[tokio::test]
    async fn unsupported_operation_has_no_side_effect() {
        let (ind, _) = indirection("find_only", Some("memory"));
        let err = ind.save(Request::save(Facts::new("web01"))).await.unwrap_err();
        assert!(matches!(
            err,
            IndirectorError::NotSupported { operation: Operation::Save, .. }
        ));

        ind.set_terminus_class("memory").unwrap();
        ind.set_cache_class(None).unwrap();
        assert!(ind.find(Request::find("web01")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mismatched_operation_is_rejected() {
        let (ind, _) = indirection("memory", None);
        let err = ind.find(Request::destroy("web01")).await.unwrap_err();
        assert!(matches!(err, IndirectorError::Configuration(_)));
    }

    #[test]
    fn available_classes_are_sorted() {
        let (ind, _) = indirection("memory", None);
        assert_eq!(ind.available_classes(), vec!["broken", "find_only", "memory"]);
    }
}
