use std::time::Duration;

use async_trait::async_trait;
use tokio::{
    select,
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    time::{sleep, Instant},
};
use tracing::{debug, Instrument as _};

use crate::error::ExportError;

/// Processes bundles of items once they are flushed.
#[async_trait]
pub trait BundleHandler<T>: Send + Sync + 'static {
    /// Handles a non-empty bundle of items.
    async fn handle_bundle(&self, bundle: Vec<T>);
}

/// Bundler settings.
#[derive(Clone, Copy, Debug)]
pub struct BundlerSettings {
    /// Number of pending items that triggers a flush.
    pub count_threshold: usize,

    /// Maximum time the oldest pending item waits before a flush.
    pub delay_threshold: Duration,

    /// Number of items that can be queued for the bundler task before new items are rejected.
    pub buffer_size: usize,
}

enum Message<T> {
    Item(T),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running bundler task.
///
/// Items are grouped into bundles and handed to the bundle handler when enough items are pending, when the oldest
/// pending item has waited long enough, or when a flush or shutdown is requested.
pub struct BundlerHandle<T> {
    messages_tx: mpsc::Sender<Message<T>>,
}

impl<T> Clone for BundlerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            messages_tx: self.messages_tx.clone(),
        }
    }
}

impl<T> BundlerHandle<T>
where
    T: Send + 'static,
{
    /// Spawns a bundler task on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn<H>(settings: BundlerSettings, handler: H) -> Self
    where
        H: BundleHandler<T>,
    {
        let (messages_tx, messages_rx) = mpsc::channel(settings.buffer_size.max(1));
        tokio::spawn(run_bundler(messages_rx, handler, settings).in_current_span());

        Self { messages_tx }
    }

    /// Adds an item to the current bundle.
    ///
    /// # Errors
    ///
    /// If the bundler's buffer is full, or the bundler has shut down, the item is dropped and an error is returned.
    pub fn add(&self, item: T) -> Result<(), ExportError> {
        self.messages_tx.try_send(Message::Item(item)).map_err(|e| match e {
            TrySendError::Full(_) => ExportError::BundlerFull,
            TrySendError::Closed(_) => ExportError::BundlerClosed,
        })
    }

    /// Flushes every item added so far, waiting until they have been handled.
    ///
    /// # Errors
    ///
    /// If the bundler has shut down, an error is returned.
    pub async fn flush(&self) -> Result<(), ExportError> {
        self.request(Message::Flush).await
    }

    /// Flushes every item added so far and stops the bundler task.
    ///
    /// Items added after shutdown are rejected.
    ///
    /// # Errors
    ///
    /// If the bundler has already shut down, an error is returned.
    pub async fn shutdown(&self) -> Result<(), ExportError> {
        self.request(Message::Shutdown).await
    }

    async fn request<F>(&self, message: F) -> Result<(), ExportError>
    where
        F: FnOnce(oneshot::Sender<()>) -> Message<T>,
    {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.messages_tx
            .send(message(ack_tx))
            .await
            .map_err(|_| ExportError::BundlerClosed)?;
        ack_rx.await.map_err(|_| ExportError::BundlerClosed)
    }
}

async fn run_bundler<T, H>(mut messages_rx: mpsc::Receiver<Message<T>>, handler: H, settings: BundlerSettings)
where
    T: Send + 'static,
    H: BundleHandler<T>,
{
    let count_threshold = settings.count_threshold.max(1);
    let mut pending = Vec::new();

    let mut pending_flush = false;
    let pending_flush_timeout = sleep(settings.delay_threshold);
    tokio::pin!(pending_flush_timeout);

    loop {
        select! {
            maybe_message = messages_rx.recv() => match maybe_message {
                Some(Message::Item(item)) => {
                    pending.push(item);

                    if pending.len() >= count_threshold {
                        debug!(items = pending.len(), "Count threshold reached. Flushing bundle.");
                        flush_pending(&handler, &mut pending).await;
                        pending_flush = false;
                    } else if !pending_flush {
                        // The delay counts from the oldest pending item.
                        pending_flush_timeout.as_mut().reset(Instant::now() + settings.delay_threshold);
                        pending_flush = true;
                    }
                }
                Some(Message::Flush(ack_tx)) => {
                    flush_pending(&handler, &mut pending).await;
                    pending_flush = false;
                    let _ = ack_tx.send(());
                }
                Some(Message::Shutdown(ack_tx)) => {
                    flush_pending(&handler, &mut pending).await;
                    let _ = ack_tx.send(());
                    break;
                }
                None => {
                    flush_pending(&handler, &mut pending).await;
                    break;
                }
            },
            _ = &mut pending_flush_timeout, if pending_flush => {
                debug!(items = pending.len(), "Delay threshold reached. Flushing bundle.");
                pending_flush = false;
                flush_pending(&handler, &mut pending).await;
            }
        }
    }

    debug!("Bundler stopped.");
}

async fn flush_pending<T, H>(handler: &H, pending: &mut Vec<T>)
where
    H: BundleHandler<T>,
{
    if pending.is_empty() {
        return;
    }

    let bundle = std::mem::take(pending);
    handler.handle_bundle(bundle).await;
}
