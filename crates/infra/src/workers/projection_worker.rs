use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use procureflow_core::BusinessId;
use procureflow_events::{BusinessScoped, EventBus, Subscription};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Generic projection worker loop.
///
/// - Subscribes to the bus before returning, so nothing published after
///   `spawn` is missed
/// - Applies an idempotent handler for each message
/// - Optional business filtering
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker thread draining a bus subscription.
    ///
    /// - `business_id`: when provided, messages for other businesses are ignored
    /// - `handler`: must be idempotent (at-least-once delivery)
    pub fn spawn<M, B, H, E>(
        name: &'static str,
        bus: &B,
        business_id: Option<BusinessId>,
        mut handler: H,
    ) -> std::io::Result<WorkerHandle>
    where
        M: BusinessScoped + Send + 'static,
        B: EventBus<M> + ?Sized,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, business_id, &mut handler))?;

        debug!(worker = name, "projection worker started");
        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    business_id: Option<BusinessId>,
    handler: &mut H,
) where
    M: BusinessScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(50);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if let Some(b) = business_id {
                    if msg.business_id() != b {
                        continue;
                    }
                }

                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = ?err, "projection worker handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker = name, "projection worker stopped");
}
