//! HTTP front end with deferred startup.
//!
//! `new()` allocates shared state, `mount::<M>()` adds an indirection's
//! routes, `start()` binds the listener and `serve()` runs until the
//! shutdown future resolves, then drains in-flight requests.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use indirector_core::Model;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::HttpConfig;
use super::handlers::{
    destroy_handler, find_handler, health_handler, liveness_handler, readiness_handler,
    save_handler, search_handler, AppState,
};
use super::middleware::build_http_layers;
use crate::indirector::IndirectionRegistry;
use crate::shutdown::{ShutdownController, ShutdownReason};

/// Serves registered indirections over HTTP.
pub struct NetworkModule {
    config: HttpConfig,
    listener: Option<TcpListener>,
    registry: Arc<IndirectionRegistry>,
    shutdown: Arc<ShutdownController>,
    routes: Router<AppState>,
    mounted: Vec<&'static str>,
}

impl NetworkModule {
    /// Creates a module with no indirections mounted and a fresh controller.
    #[must_use]
    pub fn new(config: HttpConfig, registry: Arc<IndirectionRegistry>) -> Self {
        Self {
            config,
            listener: None,
            registry,
            shutdown: Arc::new(ShutdownController::new()),
            routes: Router::new(),
            mounted: Vec::new(),
        }
    }

    /// Returns a shared handle to the controller driving health and drain.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Indirections mounted so far, in mount order.
    #[must_use]
    pub fn mounted(&self) -> &[&'static str] {
        &self.mounted
    }

    /// Adds the find/save/destroy and search routes of `M`'s indirection.
    #[must_use]
    pub fn mount<M: Model>(mut self) -> Self {
        let name = M::INDIRECTION;
        let singular = format!("/{name}/{{key}}");
        let plural = format!("/{}/{{key}}", name.plural());
        self.routes = self
            .routes
            .route(
                &singular,
                get(find_handler::<M>)
                    .put(save_handler::<M>)
                    .delete(destroy_handler::<M>),
            )
            .route(&plural, get(search_handler::<M>));
        self.mounted.push(name.as_str());
        self
    }

    /// Router with health routes, mounted indirections and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            shutdown: Arc::clone(&self.shutdown),
            start_time: Instant::now(),
        };
        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .merge(self.routes.clone())
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the listener; returns the bound port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "http listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then waits for in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server fails.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let controller = self.shutdown;

        controller.set_ready();
        info!(indirections = ?self.mounted, "serving indirections");

        let signal_controller = Arc::clone(&controller);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                signal_controller.trigger(ShutdownReason::Terminate);
            })
            .await?;

        if controller.wait_for_drain(self.config.drain_timeout).await {
            info!("http front end stopped");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with requests in flight"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indirector_core::{Catalog, Facts};

    use super::*;
    use crate::config::Settings;
    use crate::indirector::TerminusContext;

    fn module() -> NetworkModule {
        let registry = IndirectionRegistry::new(TerminusContext::new(Settings::default()));
        NetworkModule::new(HttpConfig::ephemeral(), Arc::new(registry))
    }

    #[test]
    fn mount_records_indirections() {
        let module = module().mount::<Facts>().mount::<Catalog>();
        assert_eq!(module.mounted(), ["facts", "catalog"]);
        let _router = module.build_router();
    }

    #[tokio::test]
    async fn start_binds_ephemeral_port() {
        let mut module = module();
        let port = module.start().await.unwrap();
        assert!(port > 0);
    }

    #[tokio::test]
    async fn serve_requires_start() {
        let result = module().serve(std::future::pending::<()>()).await;
        assert!(result.is_err());
    }
}
