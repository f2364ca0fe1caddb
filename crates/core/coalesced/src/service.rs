use std::{
    collections::{hash_map::Entry, HashMap},
    fmt::{self, Debug},
    future::Future,
    hash::Hash,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use futures::FutureExt;
use tokio::{
    runtime::Handle,
    sync::{
        watch::{channel as watch_channel, Receiver, Sender},
        RwLock,
    },
};
use tracing::{debug, trace, warn};

use crate::{
    stats::Counters, CloneReplicator, CoalescionServiceConfig, CoalescionStats, Error, Replicate,
};

type Outcome<Value, Err> = Option<Result<Arc<Value>, Error<Err>>>;
type Registration<Value, Err> = (Sender<Outcome<Value, Err>>, Handle);

/// Runs concurrent identical operations once and hands every caller its own copy of the result.
///
/// Each key maps to at most one in-flight operation. The first caller for a key (the initiator)
/// starts the operation on a background task, every caller that arrives while the entry is still
/// in the table (a joiner) waits for that same outcome. Successful entries linger for
/// [`CoalescionServiceConfig::grace_period`] so callers issued right as the operation finished
/// still share it, failed entries are evicted straight away.
///
/// Cloning the service yields another handle to the same table.
pub struct CoalescionService<Id, Value, Err, R = CloneReplicator> {
    config: Arc<CoalescionServiceConfig>,
    watchers: Arc<RwLock<HashMap<Id, Receiver<Outcome<Value, Err>>>>>,
    replicator: Arc<R>,
    counters: Arc<Counters>,
}

impl<Id, Value, Err> CoalescionService<Id, Value, Err>
where
    Id: Hash + Eq,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: CoalescionServiceConfig) -> Self {
        Self::with_replicator(config, CloneReplicator)
    }
}

impl<Id, Value, Err, R> CoalescionService<Id, Value, Err, R>
where
    Id: Hash + Eq,
{
    /// Use a custom strategy for copying successful values to each caller
    pub fn with_replicator(config: CoalescionServiceConfig, replicator: R) -> Self {
        Self {
            config: Arc::new(config),
            watchers: Arc::new(RwLock::new(HashMap::new())),
            replicator: Arc::new(replicator),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &CoalescionServiceConfig {
        &self.config
    }

    pub fn stats(&self) -> CoalescionStats {
        self.counters.snapshot()
    }

    /// Entries currently in the table, in flight or inside their grace window.
    /// Only the in-flight ones count towards `max_concurrent`.
    pub async fn current_task_count(&self) -> usize {
        self.watchers.read().await.len()
    }

    pub async fn contains(&self, id: &Id) -> bool {
        self.watchers.read().await.contains_key(id)
    }
}

impl<Id, Value, Err, R> CoalescionService<Id, Value, Err, R>
where
    Id: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    Value: Send + Sync + 'static,
    Err: Clone + Send + Sync + 'static,
    R: Replicate<Value>,
{
    /// Run `func` for `id` unless an operation for `id` is already in the table, in which case
    /// wait for its outcome instead.
    ///
    /// Only route idempotent reads through here: callers that join never run their own `func`.
    ///
    /// Dropping the returned future only stops this caller from waiting, the operation itself
    /// always runs to completion.
    pub async fn execute<F, Fut>(&self, id: Id, func: F) -> Result<Value, Error<Err>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, Err>> + Send + 'static,
    {
        let existing = self.watchers.read().await.get(&id).cloned();

        let receiver = match existing {
            Some(receiver) => {
                self.counters.joined();
                debug!(key = ?id, "joining in-flight operation");
                receiver
            }
            None => {
                let (receiver, registration) = self.join_or_register(&id).await?;

                if let Some((sender, runtime)) = registration {
                    match panic::catch_unwind(AssertUnwindSafe(func)) {
                        Ok(operation) => self.spawn_driver(&runtime, id, sender, operation),
                        Err(_) => {
                            Self::settle_failure(
                                &self.watchers,
                                &self.counters,
                                &id,
                                sender,
                                Error::Panicked,
                            )
                            .await
                        }
                    }
                }

                receiver
            }
        };

        self.wait_for(receiver).await
    }

    /// Look the key up again under the write lock and either join or insert a fresh entry.
    /// Only the caller that inserted gets the sender, together with the runtime to drive it on.
    async fn join_or_register(
        &self,
        id: &Id,
    ) -> Result<(Receiver<Outcome<Value, Err>>, Option<Registration<Value, Err>>), Error<Err>> {
        let mut watchers = self.watchers.write().await;

        match watchers.entry(id.clone()) {
            Entry::Occupied(entry) => {
                self.counters.joined();
                debug!(key = ?id, "joining in-flight operation");

                Ok((entry.get().clone(), None))
            }
            Entry::Vacant(entry) => {
                if let Some(max_concurrent) = self.config.max_concurrent {
                    if self.counters.in_flight() >= max_concurrent as u64 {
                        warn!(key = ?id, max_concurrent, "refusing to start operation");
                        return Err(Error::MaxConcurrent);
                    }
                }

                let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

                let (send, recv) = watch_channel(None);
                entry.insert(recv.clone());

                self.counters.initiated();
                debug!(key = ?id, "starting operation");

                Ok((recv, Some((send, runtime))))
            }
        }
    }

    fn spawn_driver<Fut>(
        &self,
        runtime: &Handle,
        id: Id,
        send: Sender<Outcome<Value, Err>>,
        operation: Fut,
    ) where
        Fut: Future<Output = Result<Value, Err>> + Send + 'static,
    {
        let watchers = self.watchers.clone();
        let counters = self.counters.clone();
        let grace_period = self.config.grace_period;

        runtime.spawn(async move {
            let outcome = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(Ok(value)) => Ok(Arc::new(value)),
                Ok(Err(err)) => Err(Error::Operation(err)),
                Err(_) => Err(Error::Panicked),
            };

            match outcome {
                Ok(value) => {
                    counters.succeeded();
                    send.send_modify(|opt| {
                        opt.replace(Ok(value));
                    });

                    if !grace_period.is_zero() {
                        tokio::time::sleep(grace_period).await;
                    }

                    watchers.write().await.remove(&id);
                    trace!(key = ?id, "evicted after grace period");
                }
                Err(error) => {
                    Self::settle_failure(&watchers, &counters, &id, send, error).await;
                }
            }
        });
    }

    async fn settle_failure(
        watchers: &RwLock<HashMap<Id, Receiver<Outcome<Value, Err>>>>,
        counters: &Counters,
        id: &Id,
        send: Sender<Outcome<Value, Err>>,
        error: Error<Err>,
    ) {
        counters.failed();
        if matches!(error, Error::Panicked) {
            warn!(key = ?id, "operation panicked, evicting");
        } else {
            warn!(key = ?id, "operation failed, evicting");
        }

        // Evict before publishing so the next call starts over instead of joining
        watchers.write().await.remove(id);

        send.send_modify(|opt| {
            opt.replace(Err(error));
        });
    }

    async fn wait_for(
        &self,
        mut receiver: Receiver<Outcome<Value, Err>>,
    ) -> Result<Value, Error<Err>> {
        let outcome = receiver
            .wait_for(|v| v.is_some())
            .await
            .map_err(|_| Error::RecvError)?
            .clone();

        match outcome {
            Some(Ok(value)) => self.replicator.replicate(&*value).map_err(|err| {
                self.counters.replicate_failed();
                warn!(reason = err.reason(), "unable to replicate value for caller");
                Error::Replicate(err)
            }),
            Some(Err(err)) => Err(err),
            None => Err(Error::RecvError),
        }
    }
}

impl<Id, Value, Err, R> Clone for CoalescionService<Id, Value, Err, R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            watchers: self.watchers.clone(),
            replicator: self.replicator.clone(),
            counters: self.counters.clone(),
        }
    }
}

impl<Id, Value, Err, R> Debug for CoalescionService<Id, Value, Err, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoalescionService")
            .field("config", &self.config)
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl<Id, Value, Err> Default for CoalescionService<Id, Value, Err>
where
    Id: Hash + Eq,
{
    fn default() -> Self {
        Self::from_config(CoalescionServiceConfig::default())
    }
}
