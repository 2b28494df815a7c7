use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::format::Format;
use crate::name::IndirectionName;

/// A logical object type that can be routed through an indirection.
///
/// Implementors declare which indirection they belong to and which wire
/// formats they can be exchanged in. Instances must be cheap enough to clone
/// that the cache layer can keep its own copy.
pub trait Model: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// The indirection this model is served by.
    const INDIRECTION: IndirectionName;

    /// Instance name (certname, hostname, ...). Used as the storage key
    /// when an instance is saved without an explicit key.
    fn name(&self) -> &str;

    /// Formats this model can be rendered in, most preferred first.
    #[must_use]
    fn supported_formats() -> &'static [Format] {
        &[Format::Json, Format::Msgpack]
    }

    /// Format used when the peer expresses no preference.
    #[must_use]
    fn default_format() -> Format {
        Self::supported_formats()
            .first()
            .copied()
            .unwrap_or(Format::Json)
    }
}
