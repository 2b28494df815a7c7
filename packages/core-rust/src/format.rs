//! Wire formats a model can be rendered in, with content negotiation.
//!
//! Every [`Model`] declares the formats it supports and a default. The REST
//! terminus advertises the supported list in `Accept`, the HTTP front end
//! picks the first acceptable one, and both sides decode according to the
//! response `Content-Type`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::FormatError;
use crate::model::Model;

/// A serialization format understood by the indirector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// UTF-8 JSON (`application/json`).
    Json,
    /// `MsgPack` with named struct fields (`application/x-msgpack`).
    Msgpack,
}

impl Format {
    /// Short name as used in configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Msgpack => "msgpack",
        }
    }

    /// MIME type sent in `Content-Type` / `Accept`.
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Msgpack => "application/x-msgpack",
        }
    }

    /// File extension used by file-backed termini.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Msgpack => "msgpack",
        }
    }

    /// Parses a configuration name (`"json"`, `"msgpack"`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Format::Json),
            "msgpack" => Some(Format::Msgpack),
            _ => None,
        }
    }

    /// Parses a `Content-Type` header value, ignoring parameters.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::UnsupportedMime`] for unknown media types.
    pub fn from_mime(mime: &str) -> Result<Self, FormatError> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "application/json" | "text/json" => Ok(Format::Json),
            "application/x-msgpack" | "application/msgpack" => Ok(Format::Msgpack),
            _ => Err(FormatError::UnsupportedMime(mime.to_string())),
        }
    }

    /// Picks the first format from an `Accept` header that is also in `supported`.
    ///
    /// A wildcard (`*/*`) or empty header selects the first supported format.
    /// Quality parameters are ignored; header order is the preference order.
    #[must_use]
    pub fn negotiate(accept: &str, supported: &[Format]) -> Option<Format> {
        if accept.trim().is_empty() {
            return supported.first().copied();
        }
        for entry in accept.split(',') {
            let essence = entry.split(';').next().unwrap_or("").trim();
            if essence == "*/*" {
                return supported.first().copied();
            }
            if let Ok(format) = Format::from_mime(essence) {
                if supported.contains(&format) {
                    return Some(format);
                }
            }
        }
        None
    }

    /// Builds an `Accept` header value listing `formats` in order.
    #[must_use]
    pub fn accept_header(formats: &[Format]) -> String {
        formats
            .iter()
            .map(|f| f.mime())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Encodes a single model instance.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Encode`] when the serializer rejects the value.
    pub fn render<M: Model>(self, instance: &M) -> Result<Vec<u8>, FormatError> {
        self.encode_value(M::INDIRECTION.as_str(), instance)
    }

    /// Encodes a list of model instances (search results).
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Encode`] when the serializer rejects the value.
    pub fn render_many<M: Model>(self, instances: &[M]) -> Result<Vec<u8>, FormatError> {
        self.encode_value(M::INDIRECTION.as_str(), &instances)
    }

    /// Decodes a single model instance.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Decode`] when the bytes are not a valid instance.
    pub fn intern<M: Model>(self, bytes: &[u8]) -> Result<M, FormatError> {
        self.decode_value(M::INDIRECTION.as_str(), bytes)
    }

    /// Decodes a list of model instances.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Decode`] when the bytes are not a valid list.
    pub fn intern_many<M: Model>(self, bytes: &[u8]) -> Result<Vec<M>, FormatError> {
        self.decode_value(M::INDIRECTION.as_str(), bytes)
    }

    fn encode_value<T: Serialize + ?Sized>(
        self,
        model: &'static str,
        value: &T,
    ) -> Result<Vec<u8>, FormatError> {
        let encoded = match self {
            Format::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
            Format::Msgpack => rmp_serde::to_vec_named(value).map_err(|e| e.to_string()),
        };
        encoded.map_err(|reason| FormatError::Encode {
            model,
            format: self.name(),
            reason,
        })
    }

    fn decode_value<T: DeserializeOwned>(
        self,
        model: &'static str,
        bytes: &[u8],
    ) -> Result<T, FormatError> {
        let decoded = match self {
            Format::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
            Format::Msgpack => rmp_serde::from_slice(bytes).map_err(|e| e.to_string()),
        };
        decoded.map_err(|reason| FormatError::Decode {
            model,
            format: self.name(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::Facts;

    #[test]
    fn from_mime_ignores_parameters() {
        assert_eq!(
            Format::from_mime("application/json; charset=utf-8").unwrap(),
            Format::Json
        );
        assert_eq!(
            Format::from_mime("application/x-msgpack").unwrap(),
            Format::Msgpack
        );
        assert!(Format::from_mime("text/yaml").is_err());
    }

    #[test]
    fn negotiate_prefers_header_order() {
        let supported = [Format::Json, Format::Msgpack];
        assert_eq!(
            Format::negotiate("application/x-msgpack, application/json", &supported),
            Some(Format::Msgpack)
        );
        assert_eq!(Format::negotiate("*/*", &supported), Some(Format::Json));
        assert_eq!(Format::negotiate("", &supported), Some(Format::Json));
        assert_eq!(Format::negotiate("text/yaml", &supported), None);
        assert_eq!(
            Format::negotiate("application/x-msgpack", &[Format::Json]),
            None
        );
    }

    #[test]
    fn accept_header_lists_all() {
        assert_eq!(
            Format::accept_header(&[Format::Msgpack, Format::Json]),
            "application/x-msgpack, application/json"
        );
    }

    #[test]
    fn msgpack_and_json_decode_what_they_encode() {
        let mut facts = Facts::new("web01");
        facts.insert("osfamily", "Debian");
        for format in [Format::Json, Format::Msgpack] {
            let bytes = format.render(&facts).unwrap();
            let back: Facts = format.intern(&bytes).unwrap();
            assert_eq!(back, facts, "format {format:?}");
        }
    }

    #[test]
    fn decode_error_names_model_and_format() {
        let err = Format::Json.intern::<Facts>(b"not json").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("facts"), "{msg}");
        assert!(msg.contains("json"), "{msg}");
    }
}
