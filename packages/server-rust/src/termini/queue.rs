use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use indirector_core::{Format, Model, Request};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::broker::Broker;
use crate::error::{IndirectorError, IndirectorResult};
use crate::indirector::Terminus;

/// Callback invoked for every instance consumed from a queue.
#[async_trait]
pub trait QueueHandler<M: Model>: Send + Sync + 'static {
    /// # Errors
    ///
    /// A returned error is logged by the subscription and the message is dropped.
    async fn handle(&self, instance: M) -> IndirectorResult<()>;
}

/// Publishes saved instances to a broker queue named after the indirection.
///
/// Only `save` is supported on the dispatch path; consumers attach through
/// [`QueueTerminus::subscribe`].
pub struct QueueTerminus<M: Model> {
    broker: Arc<dyn Broker>,
    format: Format,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> QueueTerminus<M> {
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            format: M::default_format(),
            _model: PhantomData,
        }
    }

    /// Queue this terminus publishes to and consumes from.
    #[must_use]
    pub fn queue_name() -> &'static str {
        M::INDIRECTION.as_str()
    }

    /// Starts a consumer that hands every decoded message to `handler`.
    ///
    /// Messages are taken one at a time; each handler call runs on its own
    /// task so a panic is contained. Handler failures, panics and malformed
    /// messages are logged and the message is dropped.
    #[must_use]
    pub fn subscribe(&self, handler: Arc<dyn QueueHandler<M>>) -> QueueSubscription {
        let broker = Arc::clone(&self.broker);
        let format = self.format;
        let queue = Self::queue_name();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            info!(queue, broker = broker.name(), "subscribed");
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    received = broker.receive(queue) => match received {
                        Ok(Some(bytes)) => deliver(format, &bytes, &handler, queue).await,
                        Ok(None) => break,
                        Err(e) => {
                            error!(queue, error = %e, "could not receive from broker");
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        }
                    }
                }
            }
            info!(queue, "subscription stopped");
        });

        QueueSubscription {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

/// Decodes one message and runs the handler on its own task.
async fn deliver<M: Model>(
    format: Format,
    bytes: &[u8],
    handler: &Arc<dyn QueueHandler<M>>,
    queue: &'static str,
) {
    let instance: M = match format.intern(bytes) {
        Ok(instance) => instance,
        Err(e) => {
            error!(queue, error = %e, "dropping malformed message");
            return;
        }
    };
    let name = instance.name().to_string();
    let handler = Arc::clone(handler);
    match tokio::spawn(async move { handler.handle(instance).await }).await {
        Ok(Ok(())) => debug!(queue, name, "handled message"),
        Ok(Err(e)) => error!(queue, name, error = %e, "handler failed; message dropped"),
        Err(join) => error!(queue, name, error = %join, "handler panicked; message dropped"),
    }
}

#[async_trait]
impl<M: Model> Terminus<M> for QueueTerminus<M> {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn save(&self, request: &Request<M>) -> IndirectorResult<()> {
        let instance = request.instance().ok_or_else(|| {
            IndirectorError::state(format!("{request} carries no instance"))
        })?;
        let bytes = self.format.render(instance)?;
        self.broker.publish(Self::queue_name(), bytes).await?;
        debug!(queue = Self::queue_name(), key = request.key(), "published");
        Ok(())
    }
}

/// Handle on a running queue consumer.
pub struct QueueSubscription {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl QueueSubscription {
    /// Signals the consumer and waits for it; an in-flight handler finishes first.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    /// Waits for the consumer to end on its own (broker closed).
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use indirector_core::Catalog;
    use parking_lot::Mutex;

    use super::*;
    use crate::termini::MemoryBroker;

    /// Records names; fails on `bad` and panics on `boom`.
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueueHandler<Catalog> for Recorder {
        async fn handle(&self, catalog: Catalog) -> IndirectorResult<()> {
            match catalog.name.as_str() {
                "bad" => Err(IndirectorError::state("rejected")),
                "boom" => panic!("handler blew up"),
                name => {
                    self.seen.lock().push(name.to_string());
                    Ok(())
                }
            }
        }
    }

    async fn wait_for(recorder: &Recorder, count: usize) {
        for _ in 0..200 {
            if recorder.seen.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn save_publishes_and_subscriber_consumes() {
        let broker = Arc::new(MemoryBroker::new());
        let queue = QueueTerminus::<Catalog>::new(broker.clone());
        queue.save(&Request::save(Catalog::new("web01"))).await.unwrap();
        assert_eq!(broker.pending("catalog"), 1);

        let recorder = Arc::new(Recorder { seen: Mutex::new(Vec::new()) });
        let mut subscription = queue.subscribe(recorder.clone());
        wait_for(&recorder, 1).await;
        subscription.stop().await;

        assert_eq!(*recorder.seen.lock(), vec!["web01".to_string()]);
        assert!(!subscription.is_running());
    }

    #[tokio::test]
    async fn failures_do_not_block_later_messages() {
        let broker = Arc::new(MemoryBroker::new());
        let queue = QueueTerminus::<Catalog>::new(broker.clone());
        broker.publish("catalog", b"not json".to_vec()).await.unwrap();
        for name in ["bad", "boom", "web01", "web02"] {
            queue.save(&Request::save(Catalog::new(name))).await.unwrap();
        }

        let recorder = Arc::new(Recorder { seen: Mutex::new(Vec::new()) });
        let mut subscription = queue.subscribe(recorder.clone());
        wait_for(&recorder, 2).await;
        subscription.stop().await;

        assert_eq!(*recorder.seen.lock(), vec!["web01".to_string(), "web02".to_string()]);
        assert_eq!(broker.pending("catalog"), 0);
    }

    #[tokio::test]
    async fn find_is_not_supported() {
        let queue = QueueTerminus::<Catalog>::new(Arc::new(MemoryBroker::new()));
        let err = queue.find(&Request::find("web01")).await.unwrap_err();
        assert!(matches!(err, IndirectorError::NotSupported { terminus: "queue", .. }));
    }
}
