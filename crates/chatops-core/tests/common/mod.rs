//! Common test utilities for dispatch integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chatops_core::args::converters;
use chatops_core::followers::{CancelMe, ConfirmMe};
use chatops_core::schema::Schema;
use chatops_core::{
    Args, ArgsSpec, Attachment, BotContext, Channel, DispatchSettings, Dispatcher, Error, Follower,
    Handler, HandlerRegistry, HandlesWhat, Headers, Invocation, Message, MessageBody,
    MessageMatcher, Replier, ReplyOptions, Result, WaitOptions,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Replier that records every reply.
#[derive(Default)]
pub struct RecordingReplier {
    pub replies: Mutex<Vec<(String, ReplyOptions)>>,
}

impl RecordingReplier {
    pub fn texts(&self) -> Vec<String> {
        self.replies.lock().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl Replier for RecordingReplier {
    async fn reply_text(&self, _body: &MessageBody, text: &str, options: &ReplyOptions) -> Result<()> {
        self.replies.lock().push((text.to_string(), options.clone()));
        Ok(())
    }

    async fn reply_attachments(
        &self,
        _body: &MessageBody,
        text: Option<&str>,
        _attachments: &[Attachment],
        options: &ReplyOptions,
    ) -> Result<()> {
        self.replies
            .lock()
            .push((text.unwrap_or_default().to_string(), options.clone()));
        Ok(())
    }
}

/// Build a directed slack message.
pub fn slack_message(text: &str, ts: &str, user: &str, replier: Arc<RecordingReplier>) -> Message {
    let body = MessageBody {
        ts: Some(ts.to_string()),
        channel: Some("C1".to_string()),
        channel_name: Some("ops".to_string()),
        user_name: Some(user.to_string()),
        user_id: Some(format!("U-{}", user)),
        ..MessageBody::text(text)
    };
    Message::new("slack/message", body, replier).with_headers(Headers {
        to_me: true,
        ..Default::default()
    })
}

/// Build a threaded reply to `thread_ts`.
pub fn slack_reply(text: &str, thread_ts: &str, user: &str, replier: Arc<RecordingReplier>) -> Message {
    let mut message = slack_message(text, &format!("{}.r", thread_ts), user, replier);
    message.body.thread_ts = Some(thread_ts.to_string());
    message
}

/// Handler answering a fixed trigger with a fixed outcome.
pub struct Fixed {
    name: String,
    what: HandlesWhat,
    reply: std::result::Result<String, String>,
    pub calls: Mutex<u32>,
    pub args: Mutex<Vec<Args>>,
}

impl Fixed {
    pub fn ok(name: &str, trigger: &str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            what: HandlesWhat::new(Channel::Targeted, MessageMatcher::slack(&[]))
                .trigger(trigger, true),
            reply: Ok(reply.to_string()),
            calls: Mutex::new(0),
            args: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &str, trigger: &str, reason: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            what: HandlesWhat::new(Channel::Targeted, MessageMatcher::slack(&[]))
                .trigger(trigger, true),
            reply: Err(reason.to_string()),
            calls: Mutex::new(0),
            args: Mutex::new(Vec::new()),
        })
    }

    /// Same outcome, but listening passively on the broadcast channel.
    pub fn broadcast(name: &str, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            what: HandlesWhat::new(Channel::Broadcast, MessageMatcher::slack(&[])).passive(),
            reply: if fail { Err("boom".into()) } else { Ok("seen".into()) },
            calls: Mutex::new(0),
            args: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl Handler for Fixed {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles_what(&self) -> &HandlesWhat {
        &self.what
    }

    async fn execute(&self, _invocation: &Invocation, args: Args) -> Result<Option<String>> {
        *self.calls.lock() += 1;
        self.args.lock().push(args);
        match &self.reply {
            Ok(text) => Ok(Some(text.clone())),
            Err(reason) => Err(anyhow::anyhow!(reason.clone()).into()),
        }
    }
}

/// `jenkins watch <job_name> <build>`; records the arguments it ran with.
pub struct JenkinsWatch {
    what: HandlesWhat,
    pub seen: Mutex<Vec<(Args, Option<String>)>>,
}

impl JenkinsWatch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            what: HandlesWhat::new(Channel::Targeted, MessageMatcher::slack(&[]))
                .trigger("jenkins watch", true)
                .args(
                    ArgsSpec::new(["job_name", "build"])
                        .convert("build", converters::integer())
                        .schema(Schema::new(json!({
                            "type": "object",
                            "properties": {
                                "job_name": {"type": "string", "minLength": 1},
                                "build": {"type": "integer"}
                            },
                            "required": ["job_name", "build"],
                            "additionalProperties": false
                        }))),
                ),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Handler for JenkinsWatch {
    fn name(&self) -> &str {
        "jenkins.watch"
    }

    fn title(&self) -> &str {
        "Watches a jenkins job build."
    }

    fn handles_what(&self) -> &HandlesWhat {
        &self.what
    }

    async fn execute(&self, invocation: &Invocation, args: Args) -> Result<Option<String>> {
        self.seen.lock().push((args.clone(), invocation.state()));
        Ok(Some(format!(
            "Watching {} #{}",
            args.get_str("job_name").unwrap_or_default(),
            args.get_i64("build").unwrap_or_default()
        )))
    }
}

/// `restart`; waits for a sign-off before answering.
pub struct Restart {
    what: HandlesWhat,
    timeout: Duration,
}

impl Restart {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            what: HandlesWhat::new(Channel::Targeted, MessageMatcher::slack(&[])).trigger("restart", false),
            timeout,
        })
    }
}

#[async_trait]
impl Handler for Restart {
    fn name(&self) -> &str {
        "restart"
    }

    fn handles_what(&self) -> &HandlesWhat {
        &self.what
    }

    async fn execute(&self, invocation: &Invocation, _args: Args) -> Result<Option<String>> {
        let confirm = Arc::new(ConfirmMe::new("restart"));
        invocation
            .message()
            .reply_text(&confirm.who_satisfies_message(invocation), ReplyOptions::threaded())
            .await?;
        let follower: Arc<dyn Follower> = confirm.clone();
        let ended = invocation
            .wait_for_transition(
                Some(follower),
                WaitOptions::default()
                    .timeout(self.timeout)
                    .check_delay(Duration::from_millis(20)),
            )
            .await?;
        Ok(ended)
    }
}

/// Follower whose transport always fails.
pub struct Broken;

#[async_trait]
impl Follower for Broken {
    async fn follow(&self, _invocation: &Invocation, _message: &Message) -> Result<bool> {
        Err(Error::Transport("reply failed".into()))
    }
}

/// `deploy`; waits until a followup cancels it, offering followups to a
/// broken follower first.
pub struct Deploy {
    what: HandlesWhat,
}

impl Deploy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            what: HandlesWhat::new(Channel::Targeted, MessageMatcher::slack(&[]))
                .trigger("deploy", false)
                .follower(|| Arc::new(Broken) as Arc<dyn Follower>)
                .follower(|| Arc::new(CancelMe) as Arc<dyn Follower>),
        })
    }
}

#[async_trait]
impl Handler for Deploy {
    fn name(&self) -> &str {
        "deploy"
    }

    fn handles_what(&self) -> &HandlesWhat {
        &self.what
    }

    async fn execute(&self, invocation: &Invocation, _args: Args) -> Result<Option<String>> {
        invocation
            .wait_for_transition(
                None,
                WaitOptions::default()
                    .timeout(Duration::from_secs(5))
                    .check_delay(Duration::from_millis(20)),
            )
            .await
    }
}

pub async fn dispatcher_with(handlers: Vec<Arc<dyn Handler>>, settings: DispatchSettings) -> Dispatcher {
    let bot = Arc::new(BotContext::new("testbot", json!({})));
    let registry = HandlerRegistry::build(&bot, &handlers).await.unwrap();
    Dispatcher::new(bot, Arc::new(registry), settings)
}

pub async fn dispatcher(handlers: Vec<Arc<dyn Handler>>) -> Dispatcher {
    dispatcher_with(handlers, DispatchSettings::default()).await
}
