//! Catalogs published to the spool directory end up in the catalog store.

use std::sync::Arc;
use std::time::Duration;

use indirector_core::{Catalog, Request, Resource};
use indirector_server::bootstrap::{self, Collaborators, STORE_CONFIGS};
use indirector_server::daemon::QueueDaemon;
use indirector_server::indirector::Terminus;
use indirector_server::shutdown::{ShutdownController, ShutdownReason};
use indirector_server::termini::{Broker, DirectoryBroker, QueueTerminus};
use indirector_server::{RunMode, Settings, TerminusContext};

#[tokio::test]
async fn spooled_catalogs_are_stored_and_terminate_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        run_mode: RunMode::Queue,
        ..Settings::rooted_at(dir.path())
    };
    let broker: Arc<dyn Broker> = Arc::new(
        DirectoryBroker::new(settings.queue_dir()).with_poll_interval(Duration::from_millis(20)),
    );
    let collaborators = Collaborators::for_settings(&settings).with_broker(Arc::clone(&broker));
    let registry =
        bootstrap::build_registry(TerminusContext::new(settings.clone()), &collaborators).unwrap();
    assert_eq!(registry.describe("catalog"), Some((STORE_CONFIGS, None)));

    let publisher = QueueTerminus::<Catalog>::new(Arc::clone(&broker));
    let mut catalog = Catalog::new("web01");
    catalog.add_resource(Resource::new("file", "/etc/motd").with_parameter("content", "hi"));
    publisher.save(&Request::save(catalog.clone())).await.unwrap();
    publisher
        .save(&Request::save(Catalog::new("db01")))
        .await
        .unwrap();

    let daemon = QueueDaemon::new(&registry, Arc::clone(&broker)).unwrap();
    let controller = Arc::new(ShutdownController::new());
    let running = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { daemon.run(&controller).await })
    };

    let store = settings.storeconfigs_dir().join("catalog");
    for _ in 0..200 {
        if store.join("web01.json").exists() && store.join("db01.json").exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let catalogs = registry
        .lookup::<Catalog>("catalog")
        .unwrap();
    let stored = catalogs.find(Request::find("web01")).await.unwrap();
    assert_eq!(stored, Some(catalog));
    assert!(catalogs.find(Request::find("db01")).await.unwrap().is_some());

    controller.trigger(ShutdownReason::Terminate);
    let reason = running.await.unwrap();
    assert_eq!(reason.exit_code(), 0);
}
