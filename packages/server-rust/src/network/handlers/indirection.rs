//! Generic handlers serving one indirection per mounted model type.
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | GET | `/{indirection}/{key}` | find |
//! | PUT | `/{indirection}/{key}` | save |
//! | DELETE | `/{indirection}/{key}` | destroy |
//! | GET | `/{plural}/{key}` | search |

use std::collections::BTreeMap;

use bytes::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use indirector_core::{Format, FormatError, Model, Principal, Request, Value};
use serde_json::json;
use tracing::warn;

use super::AppState;
use crate::error::IndirectorError;

/// Header carrying the client certificate subject set by a TLS-terminating proxy.
pub const CLIENT_DN_HEADER: &str = "x-client-dn";
/// Header set to `SUCCESS` by the proxy when the client certificate verified.
pub const CLIENT_VERIFY_HEADER: &str = "x-client-verify";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error response: a status plus a JSON `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status sent to the client.
    pub status: StatusCode,
    /// Text placed in the `error` field.
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<IndirectorError> for ApiError {
    fn from(err: IndirectorError) -> Self {
        let status = match &err {
            IndirectorError::NotSupported { .. } => StatusCode::METHOD_NOT_ALLOWED,
            IndirectorError::State(_)
            | IndirectorError::InvalidKey { .. }
            | IndirectorError::Format(_) => StatusCode::BAD_REQUEST,
            IndirectorError::Ssl(_) | IndirectorError::Forbidden { .. } => StatusCode::FORBIDDEN,
            IndirectorError::Remote(_) => StatusCode::BAD_GATEWAY,
            IndirectorError::Configuration(_) | IndirectorError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!(error = %err, "request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<FormatError> for ApiError {
    fn from(err: FormatError) -> Self {
        IndirectorError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request assembly
// ---------------------------------------------------------------------------

/// Query parameters as typed request options.
fn options(params: BTreeMap<String, String>) -> impl Iterator<Item = (String, Value)> {
    params
        .into_iter()
        .map(|(name, raw)| {
            let value = Value::from_query(&raw);
            (name, value)
        })
}

/// Requester identity as reported by the fronting proxy.
fn requester(headers: &HeaderMap) -> Principal {
    let verified = headers
        .get(CLIENT_VERIFY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "SUCCESS");
    let subject = headers
        .get(CLIENT_DN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|dn| {
            dn.split(['/', ','])
                .find_map(|part| part.trim().strip_prefix("CN="))
                .unwrap_or(dn)
                .to_string()
        });
    match subject {
        Some(subject) if verified => Principal::authenticated(subject),
        Some(subject) => Principal::anonymous(subject),
        None => Principal::anonymous("unknown"),
    }
}

/// Format named by `Accept`, restricted to what `M` supports.
fn response_format<M: Model>(headers: &HeaderMap) -> Result<Format, ApiError> {
    let accept = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    Format::negotiate(accept, M::supported_formats()).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_ACCEPTABLE,
            format!(
                "no supported format for {} in {accept:?}; supported: {}",
                M::INDIRECTION,
                Format::accept_header(M::supported_formats())
            ),
        )
    })
}

/// Format named by `Content-Type`, or the model default when absent.
fn request_format<M: Model>(headers: &HeaderMap) -> Result<Format, ApiError> {
    match headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        Some(mime) => Ok(Format::from_mime(mime)?),
        None => Ok(M::default_format()),
    }
}

fn encoded(format: Format, body: Vec<u8>) -> Response {
    (
        [(CONTENT_TYPE, HeaderValue::from_static(format.mime()))],
        body,
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /{indirection}/{key}`: renders the found instance.
///
/// # Errors
///
/// 404 when the key is absent; otherwise the mapped dispatch error.
pub async fn find_handler<M: Model>(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let _in_flight = state.shutdown.in_flight_guard();
    let format = response_format::<M>(&headers)?;
    let indirection = state.registry.lookup::<M>(M::INDIRECTION.as_str())?;
    let request = Request::find(key.clone())
        .with_options(options(params))
        .with_requester(requester(&headers));
    match indirection.find(request).await? {
        Some(instance) => Ok(encoded(format, format.render(&instance)?)),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("could not find {} {key}", M::INDIRECTION),
        )),
    }
}

/// `GET /{plural}/{key}`: renders every match as a list.
///
/// # Errors
///
/// The mapped dispatch error; no matches is an empty list, not an error.
pub async fn search_handler<M: Model>(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let _in_flight = state.shutdown.in_flight_guard();
    let format = response_format::<M>(&headers)?;
    let indirection = state.registry.lookup::<M>(M::INDIRECTION.as_str())?;
    let request = Request::search(key)
        .with_options(options(params))
        .with_requester(requester(&headers));
    let found = indirection.search(request).await?;
    Ok(encoded(format, format.render_many(&found)?))
}

/// `PUT /{indirection}/{key}`: decodes the body and saves it. Answers 204.
///
/// # Errors
///
/// 400 for an undecodable body; otherwise the mapped dispatch error.
pub async fn save_handler<M: Model>(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let _in_flight = state.shutdown.in_flight_guard();
    let instance: M = request_format::<M>(&headers)?.intern(&body)?;
    let indirection = state.registry.lookup::<M>(M::INDIRECTION.as_str())?;
    let request = Request::save_as(key, instance)
        .with_options(options(params))
        .with_requester(requester(&headers));
    indirection.save(request).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /{indirection}/{key}`: removes the instance. Answers 204.
///
/// # Errors
///
/// The mapped dispatch error.
pub async fn destroy_handler<M: Model>(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let _in_flight = state.shutdown.in_flight_guard();
    let indirection = state.registry.lookup::<M>(M::INDIRECTION.as_str())?;
    let request = Request::destroy(key)
        .with_options(options(params))
        .with_requester(requester(&headers));
    indirection.destroy(request).await?;
    Ok(StatusCode::NO_CONTENT)
}
