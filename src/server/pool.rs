use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tracing::debug;

type TransferBody = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Error)]
pub enum SubmitError {
  #[error("transfer queue is full")]
  QueueFull,
  #[error("transfer pool is shut down")]
  ShutDown,
}

/// Bounded executor for transfer bodies.
///
/// Workers pick queued bodies up in FIFO order; a submission made while the
/// queue is full is rejected so the handler can report the failure on the
/// control connection. After [`TransferPool::shutdown`] no submission is
/// accepted, queued bodies drain, and the workers are joined.
pub struct TransferPool {
  queue: Mutex<Option<mpsc::Sender<TransferBody>>>,
  workers: Mutex<JoinSet<()>>,
}

impl TransferPool {
  pub fn new(workers: usize, queue_len: usize) -> Self {
    let (tx, rx) = mpsc::channel::<TransferBody>(queue_len.max(1));
    let rx = Arc::new(Mutex::new(rx));
    let mut set = JoinSet::new();
    for id in 0..workers.max(1) {
      let rx = Arc::clone(&rx);
      set.spawn(async move {
        loop {
          // Hold the receiver lock only while waiting for a body, never
          // while running one.
          let body = { rx.lock().await.recv().await };
          match body {
            Some(body) => body.await,
            None => break,
          }
        }
        debug!(worker = id, "transfer worker exiting");
      });
    }
    Self {
      queue: Mutex::new(Some(tx)),
      workers: Mutex::new(set),
    }
  }

  /// Queues a transfer body. On success the returned receiver resolves once
  /// the body has run to completion, letting the submitting session park
  /// until its transfer is over.
  pub async fn submit<F>(&self, body: F) -> Result<oneshot::Receiver<()>, SubmitError>
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let (done_tx, done_rx) = oneshot::channel();
    let job: TransferBody = Box::pin(async move {
      body.await;
      let _ = done_tx.send(());
    });
    let queue = self.queue.lock().await;
    let tx = queue.as_ref().ok_or(SubmitError::ShutDown)?;
    match tx.try_send(job) {
      Ok(()) => Ok(done_rx),
      Err(mpsc::error::TrySendError::Full(_)) => Err(SubmitError::QueueFull),
      Err(mpsc::error::TrySendError::Closed(_)) => Err(SubmitError::ShutDown),
    }
  }

  /// Stops accepting submissions, lets queued bodies drain, and joins the
  /// workers.
  pub async fn shutdown(&self) {
    self.queue.lock().await.take();
    let mut workers = self.workers.lock().await;
    while workers.join_next().await.is_some() {}
  }
}
