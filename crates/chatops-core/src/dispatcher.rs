//! Message dispatch: routes channel-classified messages to handlers on a
//! bounded worker pool.
//!
//! Followup messages run on their own pool so an invocation parked in
//! [`Invocation::wait_for_transition`] can always be released.

use crate::bot::BotContext;
use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::handler::{Handler, HandlerMatch};
use crate::invocation::{Invocation, InvocationRecord};
use crate::message::Message;
use crate::registry::HandlerRegistry;
use crate::suggest::find_suggestion;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Dispatcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Concurrent broadcast and targeted dispatches.
    pub max_workers: usize,
    /// Concurrent followup dispatches.
    pub followup_workers: usize,
    /// Finished invocations kept per message kind.
    pub max_history: HashMap<String, usize>,
    /// Message kinds that get "did you mean" suggestions.
    pub suggestable_kinds: HashSet<String>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_workers: 8,
            followup_workers: 2,
            max_history: HashMap::new(),
            suggestable_kinds: ["slack", "telnet"].iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Bounded pool of tokio tasks.
#[derive(Clone)]
struct WorkerPool {
    name: &'static str,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    fn new(name: &'static str, size: usize) -> Self {
        Self {
            name,
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    fn spawn<F, T>(&self, work: F) -> JoinHandle<Result<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        let name = self.name;
        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| Error::Unavailable(format!("worker pool '{}' is closed", name)))?;
            work.await
        })
    }
}

/// Per channel, per kind, per sub-kind message counts.
pub type Occurrences = HashMap<Channel, HashMap<String, HashMap<String, u64>>>;

struct Shared {
    bot: Arc<BotContext>,
    registry: Arc<HandlerRegistry>,
    settings: DispatchSettings,
    next_id: AtomicU64,
    quiescing: AtomicBool,
    active: Mutex<Vec<Arc<Invocation>>>,
    prior: Mutex<HashMap<(Channel, String), VecDeque<InvocationRecord>>>,
    occurrences: Mutex<Occurrences>,
}

/// Routes messages to handlers.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
    workers: WorkerPool,
    followups: WorkerPool,
}

impl Dispatcher {
    pub fn new(bot: Arc<BotContext>, registry: Arc<HandlerRegistry>, settings: DispatchSettings) -> Self {
        let workers = WorkerPool::new("workers", settings.max_workers);
        let followups = WorkerPool::new("followups", settings.followup_workers);
        info!(
            handlers = registry.len(),
            max_workers = settings.max_workers,
            followup_workers = settings.followup_workers,
            "Dispatcher ready"
        );
        Self {
            shared: Arc::new(Shared {
                bot,
                registry,
                settings,
                next_id: AtomicU64::new(1),
                quiescing: AtomicBool::new(false),
                active: Mutex::new(Vec::new()),
                prior: Mutex::new(HashMap::new()),
                occurrences: Mutex::new(HashMap::new()),
            }),
            workers,
            followups,
        }
    }

    pub fn bot(&self) -> &Arc<BotContext> {
        &self.shared.bot
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.shared.registry
    }

    /// Process `message` on a worker, returning a handle to the outcome.
    ///
    /// Only targeted dispatches carry a meaningful result value.
    pub fn submit(&self, message: Message, channel: Channel) -> JoinHandle<Result<Option<String>>> {
        let shared = self.shared.clone();
        let pool = match channel {
            Channel::Followup => &self.followups,
            Channel::Broadcast | Channel::Targeted => &self.workers,
        };
        pool.spawn(async move { shared.process(message, channel).await })
    }

    /// Refuse new dispatches (they fail with [`Error::Dying`]) while set.
    pub fn set_quiescing(&self, quiescing: bool) {
        self.shared.quiescing.store(quiescing, Ordering::SeqCst);
    }

    pub fn is_quiescing(&self) -> bool {
        self.shared.quiescing.load(Ordering::SeqCst)
    }

    /// Records of invocations currently running or suspended.
    pub fn active(&self) -> Vec<InvocationRecord> {
        self.shared
            .active
            .lock()
            .iter()
            .map(|invocation| invocation.record())
            .collect()
    }

    /// Finished invocations for a channel and kind, newest first.
    pub fn prior(&self, channel: Channel, kind: &str) -> Vec<InvocationRecord> {
        self.shared
            .prior
            .lock()
            .get(&(channel, kind.to_string()))
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn occurrences(&self) -> Occurrences {
        self.shared.occurrences.lock().clone()
    }
}

impl Shared {
    async fn process(self: Arc<Self>, message: Message, channel: Channel) -> Result<Option<String>> {
        if self.bot.shutdown.is_set() || self.quiescing.load(Ordering::SeqCst) {
            return Err(Error::Dying);
        }
        debug!(channel = %channel, kind = %message.raw_kind(), "Processing message");
        self.count_occurrence(&message, channel);
        match channel {
            Channel::Broadcast => self.process_broadcast(message).await,
            Channel::Targeted => self.process_targeted(message).await,
            Channel::Followup => self.process_followup(message).await,
        }
    }

    fn count_occurrence(&self, message: &Message, channel: Channel) {
        let mut occurrences = self.occurrences.lock();
        *occurrences
            .entry(channel)
            .or_default()
            .entry(message.kind.clone())
            .or_default()
            .entry(message.sub_kind.clone())
            .or_default() += 1;
    }

    async fn process_broadcast(self: &Arc<Self>, message: Message) -> Result<Option<String>> {
        for handler in self.registry.handlers() {
            if self.bot.shutdown.is_set() {
                return Err(Error::Dying);
            }
            let Some(matched) = handler.handles(&self.bot, &message, Channel::Broadcast) else {
                continue;
            };
            if let Err(err) = self
                .run(handler.clone(), message.clone(), Channel::Broadcast, matched)
                .await
            {
                error!(handler = %handler.name(), error = %err, "Broadcast handler failed");
            }
        }
        Ok(None)
    }

    async fn process_targeted(self: &Arc<Self>, message: Message) -> Result<Option<String>> {
        for handler in self.registry.handlers() {
            let Some(matched) = handler.handles(&self.bot, &message, Channel::Targeted) else {
                continue;
            };
            return self
                .run(handler.clone(), message, Channel::Targeted, matched)
                .await;
        }
        if !message.headers.to_me {
            return Ok(None);
        }
        let suggestion = if self.settings.suggestable_kinds.contains(&message.kind) {
            find_suggestion(message.body.match_text(), self.registry.handlers(), "")
        } else {
            String::new()
        };
        Err(Error::NoHandlerFound { suggestion })
    }

    async fn process_followup(self: &Arc<Self>, message: Message) -> Result<Option<String>> {
        let Some(thread_ts) = message.body.thread_ts.as_deref() else {
            return Err(Error::NoFollowupHandlerFound);
        };
        let candidates: Vec<Arc<Invocation>> = self
            .active
            .lock()
            .iter()
            .filter(|invocation| {
                let origin = &invocation.message().body;
                origin.ts.as_deref() == Some(thread_ts) && origin.channel == message.body.channel
            })
            .cloned()
            .collect();
        for invocation in candidates {
            for follower in invocation.followers() {
                match follower.follow(&invocation, &message).await {
                    Ok(true) => {
                        debug!(handler = %invocation.handler().name(), "Followup consumed");
                        return Ok(None);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(
                            handler = %invocation.handler().name(),
                            error = %e,
                            "Follower failed, trying the next one"
                        );
                    }
                }
            }
        }
        Err(Error::NoFollowupHandlerFound)
    }

    async fn run(
        self: &Arc<Self>,
        handler: Arc<dyn Handler>,
        message: Message,
        channel: Channel,
        matched: HandlerMatch,
    ) -> Result<Option<String>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let invocation = Arc::new(Invocation::new(id, self.bot.clone(), handler, message));
        let mut guard = RecordGuard::enter(self.clone(), channel, invocation.clone());
        let result = invocation.run(matched).await;
        guard.failed = result.is_err();
        result
    }

    fn retire(&self, channel: Channel, invocation: &Arc<Invocation>) {
        self.active
            .lock()
            .retain(|active| !Arc::ptr_eq(active, invocation));

        let kind = invocation.message().kind.clone();
        let keep = self.settings.max_history.get(&kind).copied().unwrap_or(0);
        if keep == 0 {
            return;
        }
        let record = invocation.record();
        let mut prior = self.prior.lock();
        let records = prior.entry((channel, kind)).or_default();
        records.push_front(record);
        records.truncate(keep);
    }
}

/// Tracks one invocation as active and settles its stats exactly once,
/// whichever way the run ends.
struct RecordGuard {
    shared: Arc<Shared>,
    channel: Channel,
    invocation: Arc<Invocation>,
    failed: bool,
}

impl RecordGuard {
    fn enter(shared: Arc<Shared>, channel: Channel, invocation: Arc<Invocation>) -> Self {
        shared.active.lock().push(invocation.clone());
        shared.bot.stats.record_started(invocation.handler().name());
        Self {
            shared,
            channel,
            invocation,
            failed: true,
        }
    }
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        let name = self.invocation.handler().name();
        self.shared
            .bot
            .stats
            .record_finished(name, self.failed, self.invocation.elapsed().ok());
        self.shared.retire(self.channel, &self.invocation);
    }
}
