//! Controller runtime: watch, work queue and workers.
//!
//! Keys enter the queue from the initial list, from store events and from
//! requeue directives. A key is never handed to two workers at once; a change
//! that arrives while its cycle is running marks it dirty and it runs again
//! as soon as the cycle finishes. Each key has at most one live requeue
//! timer, the newest directive wins.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::reconciler::{Action, Reconciler};
use crate::store::{self, EipStore, StoreEvent};

#[derive(Default)]
struct QueueState {
    /// Sent to the ready channel, not yet picked up.
    queued: HashSet<String>,
    in_flight: HashSet<String>,
    /// Changed while in flight.
    dirty: HashSet<String>,
    /// Token of the live timer per key.
    timers: HashMap<String, u64>,
    next_token: u64,
}

struct WorkQueue {
    state: Mutex<QueueState>,
    ready: mpsc::UnboundedSender<String>,
    shutdown: watch::Receiver<bool>,
}

impl WorkQueue {
    fn new(ready: mpsc::UnboundedSender<String>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            ready,
            shutdown,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a key for immediate processing.
    fn enqueue(&self, key: &str) {
        let mut state = self.lock();
        // Superseded by the immediate run
        state.timers.remove(key);
        if state.in_flight.contains(key) {
            state.dirty.insert(key.to_string());
            return;
        }
        if state.queued.insert(key.to_string()) {
            let _ = self.ready.send(key.to_string());
        }
    }

    /// Queue a key after `delay`, replacing any earlier timer for it.
    fn schedule(self: &Arc<Self>, key: &str, delay: Duration) {
        if delay.is_zero() {
            self.enqueue(key);
            return;
        }

        let token = {
            let mut state = self.lock();
            state.next_token += 1;
            let token = state.next_token;
            state.timers.insert(key.to_string(), token);
            token
        };

        let queue = Arc::clone(self);
        let key = key.to_string();
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => queue.fire(&key, token),
                _ = shutdown.changed() => {}
            }
        });
    }

    fn fire(&self, key: &str, token: u64) {
        let live = {
            let mut state = self.lock();
            if state.timers.get(key) == Some(&token) {
                state.timers.remove(key);
                true
            } else {
                false
            }
        };
        if live {
            debug!(name = %key, "Requeue timer fired");
            self.enqueue(key);
        }
    }

    fn forget(&self, key: &str) {
        self.lock().timers.remove(key);
    }

    fn begin(&self, key: &str) {
        let mut state = self.lock();
        state.queued.remove(key);
        state.in_flight.insert(key.to_string());
    }

    fn finish(self: &Arc<Self>, key: &str, next: Option<Duration>) {
        let dirty = {
            let mut state = self.lock();
            state.in_flight.remove(key);
            state.dirty.remove(key)
        };
        if dirty {
            self.enqueue(key);
        } else if let Some(delay) = next {
            self.schedule(key, delay);
        }
    }
}

/// Drives a [`Reconciler`] from store changes and requeue directives.
pub struct Controller {
    store: Arc<dyn EipStore>,
    reconciler: Arc<dyn Reconciler>,
    workers: usize,
}

impl Controller {
    pub fn new(store: Arc<dyn EipStore>, reconciler: Arc<dyn Reconciler>, workers: usize) -> Self {
        Self {
            store,
            reconciler,
            workers: workers.max(1),
        }
    }

    async fn relist(&self, queue: &WorkQueue) -> store::Result<()> {
        let objects = self.store.list().await?;
        debug!(count = objects.len(), "Listed EIP objects");
        for eip in &objects {
            queue.enqueue(eip.name());
        }
        Ok(())
    }

    /// Run until `shutdown` flips to true (or its sender is dropped), then
    /// wait for in-flight cycles to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> store::Result<()> {
        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(WorkQueue::new(ready_tx, shutdown.clone()));

        // Subscribe before listing so no change falls in between
        let mut events = self.store.subscribe();
        self.relist(&queue).await?;

        let semaphore = Arc::new(Semaphore::new(self.workers));
        // A key is only taken off the ready channel while a worker slot is held
        let mut slot: Option<OwnedSemaphorePermit> = None;
        let mut tasks = JoinSet::new();
        info!(workers = self.workers, "Controller started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,

                event = events.recv() => match event {
                    Ok(StoreEvent::Deleted { name }) => {
                        debug!(%name, "EIP object purged");
                        queue.forget(&name);
                    }
                    Ok(event) if event.needs_reconcile() => queue.enqueue(event.name()),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Store watch lagged, relisting");
                        if let Err(e) = self.relist(&queue).await {
                            error!(error = %e, "Relist failed");
                        }
                    }
                    Err(RecvError::Closed) => {
                        warn!("Store watch closed");
                        break;
                    }
                },

                permit = Arc::clone(&semaphore).acquire_owned(), if slot.is_none() => {
                    match permit {
                        Ok(permit) => slot = Some(permit),
                        Err(_) => break,
                    }
                }

                Some(key) = ready_rx.recv(), if slot.is_some() => {
                    let Some(permit) = slot.take() else {
                        continue;
                    };
                    queue.begin(&key);

                    let reconciler = Arc::clone(&self.reconciler);
                    let queue = Arc::clone(&queue);
                    tasks.spawn(async move {
                        let _permit = permit;
                        let next = match reconciler.reconcile(&key).await {
                            Ok(Action::Requeue(delay)) => Some(delay),
                            Ok(Action::Done) => None,
                            Err(e) => Some(reconciler.error_policy(&key, &e)),
                        };
                        queue.finish(&key, next);
                    });
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Reconcile task failed");
                    }
                }
            }
        }

        info!(in_flight = tasks.len(), "Controller stopping, waiting for in-flight reconciles");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Reconcile task failed");
            }
        }
        info!("Controller stopped");
        Ok(())
    }
}
