//! Indirector core: requests, routed models, wire formats and SSL primitives.

pub mod catalog;
pub mod clock;
pub mod error;
pub mod facts;
pub mod format;
pub mod host;
pub mod model;
pub mod name;
pub mod node;
pub mod request;
pub mod ssl;
pub mod types;

pub use catalog::{Catalog, Edge, Resource};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use error::{FormatError, SslError};
pub use facts::Facts;
pub use format::Format;
pub use host::{DesiredState, Host, HostState};
pub use model::Model;
pub use name::IndirectionName;
pub use node::Node;
pub use request::{Operation, Request};
pub use types::{Principal, Value};

