//! Indirector server: the indirection registry, terminus variants, the
//! certificate authority, the HTTP front end and the queue daemon.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub(crate) mod fsutil;
pub mod indirector;
pub mod network;
pub mod pipeline;
pub mod shutdown;
pub mod ssl;
pub mod telemetry;
pub mod termini;

pub use config::{RunMode, Settings};
pub use error::{IndirectorError, IndirectorResult};
pub use indirector::{Indirection, IndirectionRegistry, Terminus, TerminusContext, TerminusKind};
pub use network::NetworkModule;
pub use ssl::CertificateAuthority;
