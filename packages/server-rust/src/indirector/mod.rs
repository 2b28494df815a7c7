//! Indirection dispatch: terminus contract, cache decorator and registry.

pub mod cache;
pub mod indirection;
pub mod registry;
pub mod terminus;

pub use cache::CachedTerminus;
pub use indirection::Indirection;
pub use registry::IndirectionRegistry;
pub use terminus::{Terminus, TerminusClass, TerminusContext, TerminusKind};
