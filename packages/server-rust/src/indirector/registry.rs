//! Process-wide table of indirections and their terminus classes.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use indirector_core::{IndirectionName, Model};
use parking_lot::RwLock;
use tracing::info;

use super::indirection::{ClassTable, ErasedIndirection, Indirection};
use super::terminus::{Terminus, TerminusClass, TerminusContext, TerminusKind};
use crate::error::{IndirectorError, IndirectorResult};

/// Registry of indirections, constructed once and passed around by `Arc`.
///
/// Terminus classes are registered per indirection; an indirection is then
/// registered with the class names it starts with. Lookup is by name and
/// checked against the requested model type.
pub struct IndirectionRegistry {
    context: TerminusContext,
    /// Indirection name -> `ClassTable<M>` for that indirection's model.
    classes: DashMap<&'static str, Arc<dyn Any + Send + Sync>>,
    /// Indirection name -> configured indirection.
    by_name: DashMap<&'static str, Arc<dyn ErasedIndirection>>,
    /// Registration order, for deterministic listing and reset.
    init_order: RwLock<Vec<IndirectionName>>,
}

impl IndirectionRegistry {
    #[must_use]
    pub fn new(context: TerminusContext) -> Self {
        Self {
            context,
            classes: DashMap::new(),
            by_name: DashMap::new(),
            init_order: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn context(&self) -> &TerminusContext {
        &self.context
    }

    /// Registers a terminus class for `M`'s indirection, replacing any class
    /// of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`IndirectorError::Configuration`] if the indirection name is
    /// already bound to a different model type.
    pub fn register_terminus<M, F>(
        &self,
        class: &'static str,
        kind: TerminusKind,
        constructor: F,
    ) -> IndirectorResult<()>
    where
        M: Model,
        F: Fn(&TerminusContext) -> IndirectorResult<Arc<dyn Terminus<M>>> + Send + Sync + 'static,
    {
        let table = self.class_table::<M>()?;
        table
            .write()
            .insert(class, TerminusClass::new(class, kind, constructor));
        Ok(())
    }

    /// Binds `name` to model `M` with an initial terminus and cache class.
    ///
    /// # Errors
    ///
    /// Returns [`IndirectorError::Configuration`] when `name` does not match
    /// the model's indirection, is already registered, or names an unknown
    /// terminus or cache class.
    pub fn register<M: Model>(
        &self,
        name: IndirectionName,
        terminus_class: &str,
        cache_class: Option<&str>,
    ) -> IndirectorResult<Arc<Indirection<M>>> {
        if name != M::INDIRECTION {
            return Err(IndirectorError::configuration(format!(
                "model for {} cannot be registered as {name}",
                M::INDIRECTION
            )));
        }
        if self.by_name.contains_key(name.as_str()) {
            return Err(IndirectorError::configuration(format!(
                "indirection {name} is already registered"
            )));
        }
        let table = self.class_table::<M>()?;
        let indirection = Arc::new(Indirection::new(
            self.context.clone(),
            table,
            terminus_class,
            cache_class,
        )?);
        self.by_name
            .insert(name.as_str(), Arc::clone(&indirection) as Arc<dyn ErasedIndirection>);
        self.init_order.write().push(name);
        info!(
            indirection = %name,
            terminus = indirection.terminus_class(),
            cache = ?indirection.cache_class(),
            "registered indirection"
        );
        Ok(indirection)
    }

    /// Retrieves the indirection registered under `name` as model `M`.
    ///
    /// # Errors
    ///
    /// Returns [`IndirectorError::Configuration`] for an unknown name or when
    /// the indirection serves a different model type.
    pub fn lookup<M: Model>(&self, name: &str) -> IndirectorResult<Arc<Indirection<M>>> {
        let erased = self
            .by_name
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                IndirectorError::configuration(format!("no indirection named {name}"))
            })?;
        erased.into_any().downcast::<Indirection<M>>().map_err(|_| {
            IndirectorError::configuration(format!(
                "indirection {name} does not serve {}",
                M::INDIRECTION
            ))
        })
    }

    /// Registered indirection names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<IndirectionName> {
        self.init_order.read().clone()
    }

    /// `(terminus class, cache class)` currently configured for `name`.
    #[must_use]
    pub fn describe(&self, name: &str) -> Option<(&'static str, Option<&'static str>)> {
        self.by_name
            .get(name)
            .map(|entry| (entry.terminus_class(), entry.cache_class()))
    }

    /// Drops every memoized terminus instance; configuration is kept.
    pub fn reset(&self) {
        for name in self.init_order.read().iter() {
            if let Some(entry) = self.by_name.get(name.as_str()) {
                entry.reset();
            }
        }
    }

    fn class_table<M: Model>(&self) -> IndirectorResult<ClassTable<M>> {
        let name = M::INDIRECTION;
        let erased = Arc::clone(
            self.classes
                .entry(name.as_str())
                .or_insert_with(|| {
                    let table: ClassTable<M> = Arc::new(RwLock::new(HashMap::new()));
                    Arc::new(table) as Arc<dyn Any + Send + Sync>
                })
                .value(),
        );
        erased
            .downcast::<ClassTable<M>>()
            .map(|table| Arc::clone(&*table))
            .map_err(|_| {
                IndirectorError::configuration(format!(
                    "indirection {name} is bound to a different model type"
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
