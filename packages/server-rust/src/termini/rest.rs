use std::marker::PhantomData;

use async_trait::async_trait;
use indirector_core::{Format, Model, Request};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode, Url};
use tracing::debug;

use crate::config::Settings;
use crate::error::{IndirectorError, IndirectorResult};
use crate::indirector::Terminus;

/// Talks to the same indirection served by a remote process.
///
/// `find`/`save`/`destroy` address `/{indirection}/{key}`; `search` addresses
/// the plural collection `/{plural}/{key}`. Request options travel as query
/// parameters. There are no retries; the only timeout is the client's.
pub struct RestTerminus<M: Model> {
    client: reqwest::Client,
    base: Url,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> RestTerminus<M> {
    /// Client for the master named in `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`IndirectorError::Configuration`] for an unusable master URL
    /// or HTTP client configuration.
    pub fn new(settings: &Settings) -> IndirectorResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.http_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| IndirectorError::configuration(format!("http client: {e}")))?;
        Self::with_client(client, &settings.master_url())
    }

    /// # Errors
    ///
    /// Returns [`IndirectorError::Configuration`] when `base` is not an
    /// absolute http(s) URL.
    pub fn with_client(client: reqwest::Client, base: &str) -> IndirectorResult<Self> {
        let base = Url::parse(base)
            .map_err(|e| IndirectorError::configuration(format!("invalid master url {base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(IndirectorError::configuration(format!(
                "invalid master url {base}"
            )));
        }
        Ok(Self {
            client,
            base,
            _model: PhantomData,
        })
    }

    /// URL for `request`: singular for find/save/destroy, plural for search.
    ///
    /// # Errors
    ///
    /// Returns [`IndirectorError::Configuration`] if the base URL cannot
    /// carry path segments.
    pub fn url(&self, request: &Request<M>, collection: bool) -> IndirectorResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                IndirectorError::configuration(format!("invalid master url {}", self.base))
            })?;
            segments.pop_if_empty();
            if collection {
                segments.push(&M::INDIRECTION.plural());
            } else {
                segments.push(M::INDIRECTION.as_str());
            }
            segments.push(request.key());
        }
        if !request.options().is_empty() {
            let mut query = url.query_pairs_mut();
            for (name, value) in request.options() {
                query.append_pair(name, &value.to_query());
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> IndirectorResult<Response> {
        debug!(method = %method, url = %url, "rest call");
        let mut builder = self
            .client
            .request(method, url)
            .header(ACCEPT, Format::accept_header(M::supported_formats()));
        if let Some(body) = body {
            builder = builder
                .header(CONTENT_TYPE, M::default_format().mime())
                .body(body);
        }
        Ok(builder.send().await?)
    }

    /// Decoder selected by the response `Content-Type`.
    fn response_format(response: &Response) -> IndirectorResult<Format> {
        match response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            Some(mime) => Ok(Format::from_mime(mime)?),
            None => Ok(M::default_format()),
        }
    }
}

/// Fails with [`IndirectorError::Remote`] on a non-success status.
async fn ensure_success(response: Response) -> IndirectorResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let detail = response.text().await.unwrap_or_default();
    Err(IndirectorError::remote(format!(
        "{url} returned {status}: {}",
        detail.trim()
    )))
}

#[async_trait]
impl<M: Model> Terminus<M> for RestTerminus<M> {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn find(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        let response = self.send(Method::GET, self.url(request, false)?, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        let format = Self::response_format(&response)?;
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(None);
        }
        Ok(Some(format.intern(&body)?))
    }

    async fn search(&self, request: &Request<M>) -> IndirectorResult<Vec<M>> {
        let response = self.send(Method::GET, self.url(request, true)?, None).await?;
        let response = ensure_success(response).await?;
        let format = Self::response_format(&response)?;
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Vec::new());
        }
        Ok(format.intern_many(&body)?)
    }

    async fn save(&self, request: &Request<M>) -> IndirectorResult<()> {
        let instance = request.instance().ok_or_else(|| {
            IndirectorError::state(format!("{request} carries no instance"))
        })?;
        let body = M::default_format().render(instance)?;
        let response = self
            .send(Method::PUT, self.url(request, false)?, Some(body))
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn destroy(&self, request: &Request<M>) -> IndirectorResult<()> {
        let response = self
            .send(Method::DELETE, self.url(request, false)?, None)
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indirector_core::request::IGNORE_CACHE;
    use indirector_core::{Catalog, Facts, Host};

    use super::*;

    fn terminus<M: Model>(base: &str) -> RestTerminus<M> {
        RestTerminus::with_client(reqwest::Client::new(), base).unwrap()
    }

    #[test]
    fn singular_and_collection_urls() {
        let rest = terminus::<Catalog>("http://puppet:8140");
        let request = Request::find("web01.example.com").with_option("environment", "dev");
        assert_eq!(
            rest.url(&request, false).unwrap().as_str(),
            "http://puppet:8140/catalog/web01.example.com?environment=dev"
        );
        assert_eq!(
            rest.url(&Request::search("web"), true).unwrap().as_str(),
            "http://puppet:8140/catalogs/web"
        );

        let hosts = terminus::<Host>("http://puppet:8140/");
        assert_eq!(
            hosts.url(&Request::search("*"), true).unwrap().as_str(),
            "http://puppet:8140/certificate_statuses/*"
        );
    }

    #[test]
    fn keys_are_escaped() {
        let rest = terminus::<Facts>("http://puppet:8140");
        let request = Request::<Facts>::find("a b/c").with_option(IGNORE_CACHE, true);
        assert_eq!(
            rest.url(&request, false).unwrap().as_str(),
            "http://puppet:8140/facts/a%20b%2Fc?ignore_cache=true"
        );
    }

    #[test]
    fn invalid_base_is_configuration_error() {
        let err = RestTerminus::<Facts>::with_client(reqwest::Client::new(), "not a url")
            .err()
            .unwrap();
        assert!(matches!(err, IndirectorError::Configuration(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_remote_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let rest = terminus::<Facts>(&format!("http://127.0.0.1:{port}"));
        let err = rest.find(&Request::find("web01")).await.unwrap_err();
        assert!(matches!(err, IndirectorError::Remote(_)));
    }
}
