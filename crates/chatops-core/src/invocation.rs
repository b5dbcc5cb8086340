//! One run of one handler for one message, with its state machine.

use crate::args::Args;
use crate::bot::BotContext;
use crate::error::{Error, Result};
use crate::followers::{Follower, ShowStatus};
use crate::handler::{Handler, HandlerMatch};
use crate::message::Message;
use crate::stats::{NotStarted, Stopwatch};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

/// One `(from, to)` state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl Transition {
    pub fn new(from: Option<&str>, to: Option<&str>) -> Self {
        Self {
            from: from.map(str::to_string),
            to: to.map(str::to_string),
        }
    }
}

/// Options for [`Invocation::wait_for_transition`].
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Give up after this long; `None` waits until shutdown.
    pub timeout: Option<Duration>,
    /// Upper bound between shutdown checks.
    pub check_delay: Duration,
    /// State parked in while waiting.
    pub start_state: String,
    /// Restore the state held before the wait on every exit.
    pub reset_prior_state: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            check_delay: Duration::from_millis(100),
            start_state: "SUSPENDED".to_string(),
            reset_prior_state: false,
        }
    }
}

impl WaitOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn check_delay(mut self, delay: Duration) -> Self {
        self.check_delay = delay;
        self
    }

    pub fn start_state(mut self, state: &str) -> Self {
        self.start_state = state.to_string();
        self
    }

    pub fn reset_prior_state(mut self) -> Self {
        self.reset_prior_state = true;
        self
    }
}

/// Snapshot of a finished or running invocation.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationRecord {
    pub id: u64,
    pub handler: String,
    pub state: Option<String>,
    pub history: Vec<Transition>,
    pub elapsed: Option<Duration>,
    pub created_at: DateTime<Utc>,
    pub message_ts: Option<String>,
}

/// A handler bound to a message.
pub struct Invocation {
    id: u64,
    bot: Arc<BotContext>,
    handler: Arc<dyn Handler>,
    message: Message,
    config: Value,
    state_tx: watch::Sender<Option<String>>,
    history: Mutex<Vec<Transition>>,
    watch: Mutex<Stopwatch>,
    created_at: DateTime<Utc>,
    followers: Mutex<Vec<Arc<dyn Follower>>>,
}

impl Invocation {
    pub fn new(id: u64, bot: Arc<BotContext>, handler: Arc<dyn Handler>, message: Message) -> Self {
        let config = bot.config_section(handler.requirements().config_section.as_deref());
        let mut followers: Vec<Arc<dyn Follower>> = vec![Arc::new(ShowStatus)];
        followers.extend(handler.handles_what().followers.iter().map(|make| make()));
        let (state_tx, _) = watch::channel(None);
        Self {
            id,
            bot,
            handler,
            message,
            config,
            state_tx,
            history: Mutex::new(Vec::new()),
            watch: Mutex::new(Stopwatch::default()),
            created_at: Utc::now(),
            followers: Mutex::new(followers),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn bot(&self) -> &BotContext {
        &self.bot
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The handler's configuration section (empty mapping when absent).
    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> Option<String> {
        self.state_tx.borrow().clone()
    }

    pub fn history(&self) -> Vec<Transition> {
        self.history.lock().clone()
    }

    pub fn elapsed(&self) -> std::result::Result<Duration, NotStarted> {
        self.watch.lock().elapsed()
    }

    /// Followers currently attached, in the order they are offered messages.
    pub fn followers(&self) -> Vec<Arc<dyn Follower>> {
        self.followers.lock().clone()
    }

    /// The only public state mutator; records `(old, new)` before swapping.
    pub fn change_state(&self, new_state: &str) {
        self.set_state(Some(new_state.to_string()));
    }

    fn set_state(&self, new_state: Option<String>) {
        let mut history = self.history.lock();
        let old = self.state_tx.send_replace(new_state.clone());
        debug!(
            handler = %self.handler.name(),
            from = ?old,
            to = ?new_state,
            "Invocation state changed"
        );
        history.push(Transition {
            from: old,
            to: new_state,
        });
    }

    pub fn record(&self) -> InvocationRecord {
        InvocationRecord {
            id: self.id,
            handler: self.handler.name().to_string(),
            state: self.state(),
            history: self.history(),
            elapsed: self.elapsed().ok(),
            created_at: self.created_at,
            message_ts: self.message.body.ts.clone(),
        }
    }

    /// Drive the handler through parsing, validation, authorization,
    /// manipulation and execution.
    pub async fn run(&self, matched: HandlerMatch) -> Result<Option<String>> {
        self.watch.lock().start();
        let result = self.run_steps(matched).await;
        self.watch.lock().stop();
        result
    }

    async fn run_steps(&self, matched: HandlerMatch) -> Result<Option<String>> {
        let handler = self.handler.as_ref();

        self.change_state("PARSING");
        let (mut args, trusted): (Args, bool) = match handler.extract_arguments(&matched) {
            Ok(extracted) => extracted,
            Err(issues) => {
                self.change_state("PARSING_FAILED");
                return Err(Error::reported(handler.name(), issues));
            }
        };

        self.change_state("VALIDATING");
        if !trusted {
            if let Err(issues) = handler.validate_arguments(&args) {
                self.change_state("VALIDATING_FAILED");
                return Err(Error::reported(handler.name(), issues));
            }
        }

        self.change_state("AUTHORIZING");
        if let Err(err) = handler
            .check_authorized(&self.bot, &self.message, Some(&args))
            .await
        {
            self.change_state("AUTHORIZING_FAILED");
            return Err(err);
        }

        self.change_state("MANIPULATING");
        if let Err(issues) = handler.manipulate_arguments(&mut args) {
            self.change_state("MANIPULATING_FAILED");
            return Err(Error::reported(handler.name(), issues));
        }

        self.change_state("RUNNING");
        let result = handler.execute(self, args).await;
        let current = self.state().unwrap_or_default();
        match &result {
            Ok(_) => self.change_state(&format!("{}_HAPPILY_FINISHED", current)),
            Err(_) => self.change_state(&format!("{}_SADLY_FAILED", current)),
        }
        result
    }

    /// Park in `options.start_state` until something else changes the state.
    ///
    /// The optional follower is attached for the duration of the wait and
    /// always detached on exit. Returns the state that ended the wait.
    /// Fails with [`Error::WaitTimeout`] when the timeout elapses and with
    /// [`Error::Dying`] when shutdown is signalled.
    pub async fn wait_for_transition(
        &self,
        follower: Option<Arc<dyn Follower>>,
        options: WaitOptions,
    ) -> Result<Option<String>> {
        let prior = self.state();
        let _attached = follower.map(|f| AttachedFollower::attach(self, f));
        let mut changes = self.state_tx.subscribe();
        self.change_state(&options.start_state);

        let started = Instant::now();
        let outcome = loop {
            let current = self.state();
            if current.as_deref() != Some(options.start_state.as_str()) {
                break Ok(current);
            }
            if self.bot.shutdown.is_set() {
                break Err(Error::Dying);
            }
            let elapsed = started.elapsed();
            let mut delay = options.check_delay;
            if let Some(timeout) = options.timeout {
                if elapsed >= timeout {
                    break Err(Error::WaitTimeout { elapsed });
                }
                delay = delay.min(timeout - elapsed);
            }
            tokio::select! {
                _ = changes.changed() => {}
                _ = self.bot.shutdown.wait(delay) => {}
            }
        };

        if options.reset_prior_state {
            self.set_state(prior);
        }
        outcome
    }
}

/// Keeps a follower attached to an invocation until dropped.
struct AttachedFollower<'a> {
    invocation: &'a Invocation,
    follower: Arc<dyn Follower>,
}

impl<'a> AttachedFollower<'a> {
    fn attach(invocation: &'a Invocation, follower: Arc<dyn Follower>) -> Self {
        invocation.followers.lock().push(follower.clone());
        Self {
            invocation,
            follower,
        }
    }
}

impl Drop for AttachedFollower<'_> {
    fn drop(&mut self) {
        let target = Arc::as_ptr(&self.follower) as *const ();
        self.invocation
            .followers
            .lock()
            .retain(|f| Arc::as_ptr(f) as *const () != target);
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("id", &self.id)
            .field("handler", &self.handler.name())
            .field("state", &self.state())
            .field("message", &self.message)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgsSpec;
    use crate::channel::Channel;
    use crate::handler::HandlesWhat;
    use crate::matchers::MessageMatcher;
    use crate::message::{Headers, MessageBody, NullReplier};
    use crate::schema::Schema;
    use crate::shutdown::ShutdownState;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo {
        what: HandlesWhat,
        fail: bool,
    }

    impl Echo {
        fn new(fail: bool) -> Self {
            Self {
                what: HandlesWhat::new(Channel::Targeted, MessageMatcher::telnet(&[]))
                    .trigger("echo", true)
                    .args(
                        ArgsSpec::new(["text", "times"])
                            .default_value("times", 1)
                            .schema(Schema::new(json!({
                                "type": "object",
                                "properties": {
                                    "text": {"type": "string", "minLength": 1},
                                    "times": true
                                },
                                "required": ["text"],
                                "additionalProperties": false
                            }))),
                    ),
                fail,
            }
        }
    }

    #[async_trait]
    impl Handler for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn handles_what(&self) -> &HandlesWhat {
            &self.what
        }

        async fn execute(&self, _invocation: &Invocation, args: Args) -> Result<Option<String>> {
            if self.fail {
                return Err(anyhow::anyhow!("echo broke").into());
            }
            Ok(args.get_str("text").map(str::to_string))
        }
    }

    fn invocation(fail: bool) -> Invocation {
        let bot = Arc::new(BotContext::new("bot", json!({})));
        let message = Message::new("telnet/message", MessageBody::text("echo hi"), Arc::new(NullReplier))
            .with_headers(Headers {
                to_me: true,
                ..Default::default()
            });
        Invocation::new(1, bot, Arc::new(Echo::new(fail)), message)
    }

    #[tokio::test]
    async fn test_happy_history() {
        let inv = invocation(false);
        let out = inv.run(HandlerMatch::Text("hi".into())).await.unwrap();
        assert_eq!(out.as_deref(), Some("hi"));
        let expected = vec![
            Transition::new(None, Some("PARSING")),
            Transition::new(Some("PARSING"), Some("VALIDATING")),
            Transition::new(Some("VALIDATING"), Some("AUTHORIZING")),
            Transition::new(Some("AUTHORIZING"), Some("MANIPULATING")),
            Transition::new(Some("MANIPULATING"), Some("RUNNING")),
            Transition::new(Some("RUNNING"), Some("RUNNING_HAPPILY_FINISHED")),
        ];
        assert_eq!(inv.history(), expected);
        assert!(inv.elapsed().is_ok());
    }

    #[tokio::test]
    async fn test_sadly_failed() {
        let inv = invocation(true);
        let err = inv.run(HandlerMatch::Text("hi".into())).await.unwrap_err();
        assert!(matches!(err, Error::Failed(_)));
        assert_eq!(inv.state().as_deref(), Some("RUNNING_SADLY_FAILED"));
    }

    #[tokio::test]
    async fn test_parse_and_validate_failures() {
        let inv = invocation(false);
        let err = inv.run(HandlerMatch::Text("a b c".into())).await.unwrap_err();
        assert!(matches!(err, Error::HandlerReportedIssues { .. }));
        assert_eq!(inv.state().as_deref(), Some("PARSING_FAILED"));

        let inv = invocation(false);
        let err = inv.run(HandlerMatch::Text("''".into())).await.unwrap_err();
        assert!(matches!(err, Error::HandlerReportedIssues { .. }));
        assert_eq!(inv.state().as_deref(), Some("VALIDATING_FAILED"));
    }

    #[tokio::test]
    async fn test_explicit_match_skips_validation() {
        let inv = invocation(false);
        let mut args = Args::new();
        args.insert("text", "");
        let out = inv.run(HandlerMatch::Explicit(args)).await.unwrap();
        assert_eq!(out.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_wait_timeout_resets_prior_state() {
        let inv = invocation(false);
        inv.change_state("RUNNING");
        let started = Instant::now();
        let err = inv
            .wait_for_transition(
                None,
                WaitOptions::default()
                    .timeout(Duration::from_millis(200))
                    .reset_prior_state(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WaitTimeout { .. }));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(200));
        assert!(waited < Duration::from_millis(600));
        assert_eq!(inv.state().as_deref(), Some("RUNNING"));
        assert_eq!(inv.followers().len(), 1);
    }

    #[tokio::test]
    async fn test_wait_resets_to_no_state() {
        let inv = invocation(false);
        let err = inv
            .wait_for_transition(
                None,
                WaitOptions::default()
                    .timeout(Duration::from_millis(50))
                    .reset_prior_state(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WaitTimeout { .. }));
        assert_eq!(inv.state(), None);
        assert_eq!(
            inv.history(),
            vec![
                Transition::new(None, Some("SUSPENDED")),
                Transition::new(Some("SUSPENDED"), None),
            ]
        );
    }

    #[tokio::test]
    async fn test_wait_released_by_state_change() {
        let inv = Arc::new(invocation(false));
        inv.change_state("RUNNING");
        let waiter = {
            let inv = inv.clone();
            tokio::spawn(async move {
                inv.wait_for_transition(
                    Some(Arc::new(crate::followers::CancelMe)),
                    WaitOptions::default().timeout(Duration::from_secs(5)),
                )
                .await
            })
        };
        while inv.state().as_deref() != Some("SUSPENDED") {
            tokio::task::yield_now().await;
        }
        assert_eq!(inv.followers().len(), 2);
        inv.change_state("CONFIRMED");
        let ended = waiter.await.unwrap().unwrap();
        assert_eq!(ended.as_deref(), Some("CONFIRMED"));
        assert_eq!(inv.followers().len(), 1);
    }

    #[tokio::test]
    async fn test_wait_aborted_by_shutdown() {
        let inv = Arc::new(invocation(false));
        let waiter = {
            let inv = inv.clone();
            tokio::spawn(async move { inv.wait_for_transition(None, WaitOptions::default()).await })
        };
        while inv.state().as_deref() != Some("SUSPENDED") {
            tokio::task::yield_now().await;
        }
        inv.bot().shutdown.set(ShutdownState::Dying).unwrap();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_dying());
    }
}
