//! Queue daemon: consumes queued catalogs into the configured catalog store.

use std::sync::Arc;

use async_trait::async_trait;
use indirector_core::{Catalog, IndirectionName, Model, Request};
use tracing::{debug, info};

use crate::error::IndirectorResult;
use crate::indirector::{Indirection, IndirectionRegistry};
use crate::shutdown::{ShutdownController, ShutdownReason};
use crate::termini::{Broker, QueueHandler, QueueSubscription, QueueTerminus};

/// Saves every consumed catalog through the catalog indirection.
struct StoreCatalog {
    catalogs: Arc<Indirection<Catalog>>,
}

#[async_trait]
impl QueueHandler<Catalog> for StoreCatalog {
    async fn handle(&self, catalog: Catalog) -> IndirectorResult<()> {
        let name = catalog.name().to_string();
        self.catalogs.save(Request::save(catalog)).await?;
        debug!(catalog = %name, terminus = self.catalogs.terminus_class(), "stored queued catalog");
        Ok(())
    }
}

/// Long-running consumer of the catalog queue.
pub struct QueueDaemon {
    catalogs: Arc<Indirection<Catalog>>,
    source: QueueTerminus<Catalog>,
}

impl QueueDaemon {
    /// # Errors
    ///
    /// Returns a configuration error when the catalog indirection is not
    /// registered.
    pub fn new(registry: &IndirectionRegistry, broker: Arc<dyn Broker>) -> IndirectorResult<Self> {
        let catalogs = registry.lookup::<Catalog>(IndirectionName::CATALOG.as_str())?;
        Ok(Self {
            catalogs,
            source: QueueTerminus::new(broker),
        })
    }

    /// Starts consuming; the returned subscription keeps running until stopped.
    #[must_use]
    pub fn start(&self) -> QueueSubscription {
        info!(
            queue = QueueTerminus::<Catalog>::queue_name(),
            terminus = self.catalogs.terminus_class(),
            "queue daemon consuming"
        );
        self.source.subscribe(Arc::new(StoreCatalog {
            catalogs: Arc::clone(&self.catalogs),
        }))
    }

    /// Consumes until `shutdown` is triggered, lets the current message
    /// finish, and returns the reason so the caller can pick an exit code.
    pub async fn run(&self, shutdown: &ShutdownController) -> ShutdownReason {
        let mut subscription = self.start();
        shutdown.set_ready();
        let reason = shutdown.triggered().await;
        info!(?reason, "queue daemon stopping");
        subscription.stop().await;
        reason
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::Settings;
    use crate::indirector::{Terminus, TerminusContext, TerminusKind};
    use crate::termini::{MemoryBroker, MemoryTerminus};

    fn setup() -> (IndirectionRegistry, Arc<MemoryTerminus<Catalog>>) {
        let registry = IndirectionRegistry::new(TerminusContext::new(Settings::default()));
        let store = Arc::new(MemoryTerminus::<Catalog>::new("memory"));
        let shared = Arc::clone(&store);
        registry
            .register_terminus::<Catalog, _>("memory", TerminusKind::Memory, move |_ctx| {
                Ok(Arc::clone(&shared) as Arc<dyn Terminus<Catalog>>)
            })
            .unwrap();
        registry
            .register::<Catalog>(IndirectionName::CATALOG, "memory", None)
            .unwrap();
        (registry, store)
    }

    #[tokio::test]
    async fn stores_published_catalogs_until_signalled() {
        let (registry, store) = setup();
        let broker = Arc::new(MemoryBroker::new());
        let daemon = QueueDaemon::new(&registry, Arc::clone(&broker) as Arc<dyn Broker>).unwrap();
        let publisher = QueueTerminus::<Catalog>::new(Arc::clone(&broker) as Arc<dyn Broker>);

        let controller = Arc::new(ShutdownController::new());
        let running = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { daemon.run(&controller).await })
        };

        for name in ["web01", "db01"] {
            publisher
                .save(&Request::save(Catalog::new(name)))
                .await
                .unwrap();
        }
        for _ in 0..100 {
            if store.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.len(), 2);

        controller.trigger(ShutdownReason::Interrupt);
        let reason = running.await.unwrap();
        assert_eq!(reason, ShutdownReason::Interrupt);
        assert_eq!(reason.exit_code(), 1);
    }

    #[test]
    fn requires_catalog_indirection() {
        let registry = IndirectionRegistry::new(TerminusContext::new(Settings::default()));
        assert!(QueueDaemon::new(&registry, Arc::new(MemoryBroker::new())).is_err());
    }
}
