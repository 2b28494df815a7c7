//! The terminus contract and the registration record for terminus classes.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indirector_core::{ClockSource, Model, Operation, Request, SystemClock};

use crate::config::Settings;
use crate::error::{IndirectorError, IndirectorResult};

/// Closed set of backend strategies a terminus class can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminusKind {
    /// Computes instances in-process on every call.
    Code,
    /// Keeps instances in process memory.
    Memory,
    /// Persists instances on the local filesystem.
    File,
    /// Talks to a remote indirection over HTTP.
    Rest,
    /// Publishes to and consumes from a message broker.
    Queue,
}

impl TerminusKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TerminusKind::Code => "code",
            TerminusKind::Memory => "memory",
            TerminusKind::File => "file",
            TerminusKind::Rest => "rest",
            TerminusKind::Queue => "queue",
        }
    }
}

impl fmt::Display for TerminusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend strategy answering some subset of find/search/save/destroy.
///
/// Every operation defaults to [`IndirectorError::NotSupported`], so a
/// terminus only overrides what it implements and an unsupported call has
/// no side effect. Instances are shared across callers and threads and must
/// not keep per-request state.
#[async_trait]
pub trait Terminus<M: Model>: Send + Sync {
    /// Class name this terminus was registered under (e.g. `"rest"`).
    fn name(&self) -> &'static str;

    async fn find(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        Err(self.not_supported(request.operation()))
    }

    async fn search(&self, request: &Request<M>) -> IndirectorResult<Vec<M>> {
        Err(self.not_supported(request.operation()))
    }

    async fn save(&self, request: &Request<M>) -> IndirectorResult<()> {
        Err(self.not_supported(request.operation()))
    }

    async fn destroy(&self, request: &Request<M>) -> IndirectorResult<()> {
        Err(self.not_supported(request.operation()))
    }

    /// Builds the error returned for an operation this terminus lacks.
    fn not_supported(&self, operation: Operation) -> IndirectorError {
        IndirectorError::NotSupported {
            indirection: M::INDIRECTION,
            terminus: self.name(),
            operation,
        }
    }
}

/// Context provided to terminus constructors.
#[derive(Clone)]
pub struct TerminusContext {
    pub settings: Arc<Settings>,
    /// Clock used for fact timestamps and certificate validity.
    pub clock: Arc<dyn ClockSource>,
}

impl TerminusContext {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the wall clock, e.g. with a `ManualClock` in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }
}

impl fmt::Debug for TerminusContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminusContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Builds a terminus instance from the process context.
pub type TerminusConstructor<M> =
    Arc<dyn Fn(&TerminusContext) -> IndirectorResult<Arc<dyn Terminus<M>>> + Send + Sync>;

/// A registered terminus class: name, variant, and how to build it.
pub struct TerminusClass<M: Model> {
    pub name: &'static str,
    pub kind: TerminusKind,
    constructor: TerminusConstructor<M>,
}

impl<M: Model> TerminusClass<M> {
    pub fn new<F>(name: &'static str, kind: TerminusKind, constructor: F) -> Self
    where
        F: Fn(&TerminusContext) -> IndirectorResult<Arc<dyn Terminus<M>>> + Send + Sync + 'static,
    {
        Self {
            name,
            kind,
            constructor: Arc::new(constructor),
        }
    }

    /// Runs the constructor. Failures surface as configuration errors.
    pub(crate) fn build(&self, ctx: &TerminusContext) -> IndirectorResult<Arc<dyn Terminus<M>>> {
        (self.constructor)(ctx).map_err(|e| match e {
            IndirectorError::Configuration(_) => e,
            other => IndirectorError::configuration(format!(
                "could not create {} terminus {} for {}: {other}",
                self.kind,
                self.name,
                M::INDIRECTION
            )),
        })
    }
}

impl<M: Model> Clone for TerminusClass<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            kind: self.kind,
            constructor: Arc::clone(&self.constructor),
        }
    }
}

impl<M: Model> fmt::Debug for TerminusClass<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminusClass")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
