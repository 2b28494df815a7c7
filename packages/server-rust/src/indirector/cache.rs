//! Read-cache decorator over a primary terminus.
//!
//! Only `find` consults the cache. `save`, `search` and `destroy` go to the
//! primary alone, and nothing but a successful primary `find` ever writes to
//! the cache. A consumer that saves what it just received therefore cannot
//! feed its own writes back into the cache.

use std::sync::Arc;

use async_trait::async_trait;
use indirector_core::{Model, Request};
use tracing::{debug, warn};

use super::terminus::Terminus;
use crate::error::IndirectorResult;

/// A primary terminus with an optional read cache in front of it.
pub struct CachedTerminus<M: Model> {
    primary: Arc<dyn Terminus<M>>,
    cache: Option<Arc<dyn Terminus<M>>>,
}

impl<M: Model> CachedTerminus<M> {
    #[must_use]
    pub fn new(primary: Arc<dyn Terminus<M>>, cache: Option<Arc<dyn Terminus<M>>>) -> Self {
        Self { primary, cache }
    }
}

#[async_trait]
impl<M: Model> Terminus<M> for CachedTerminus<M> {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn find(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        if let Some(cache) = &self.cache {
            if request.ignore_cache() {
                debug!(key = request.key(), "ignoring cache for {}", M::INDIRECTION);
            } else {
                match cache.find(request).await {
                    Ok(Some(hit)) => {
                        debug!(
                            key = request.key(),
                            cache = cache.name(),
                            "using cached {} for {}",
                            M::INDIRECTION,
                            request.key()
                        );
                        return Ok(Some(hit));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(
                            key = request.key(),
                            cache = cache.name(),
                            error = %e,
                            "cached {} lookup failed; falling back to {}",
                            M::INDIRECTION,
                            self.primary.name()
                        );
                    }
                }
            }
        }

        let result = self.primary.find(request).await?;

        if let (Some(cache), Some(found)) = (&self.cache, &result) {
            let cache_request = request.to_cache_save(found.clone());
            match cache.save(&cache_request).await {
                Ok(()) => debug!(key = request.key(), "cached {} for {}", M::INDIRECTION, request.key()),
                Err(e) => warn!(
                    key = request.key(),
                    cache = cache.name(),
                    error = %e,
                    "could not cache {} for {}",
                    M::INDIRECTION,
                    request.key()
                ),
            }
        }

        Ok(result)
    }

    async fn search(&self, request: &Request<M>) -> IndirectorResult<Vec<M>> {
        self.primary.search(request).await
    }

    async fn save(&self, request: &Request<M>) -> IndirectorResult<()> {
        self.primary.save(request).await
    }

    async fn destroy(&self, request: &Request<M>) -> IndirectorResult<()> {
        self.primary.destroy(request).await
    }
}
