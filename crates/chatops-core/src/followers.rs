//! Followers intercept followup messages addressed to a live invocation.

use crate::error::{Error, Result};
use crate::invocation::Invocation;
use crate::message::{Message, ReplyOptions};
use crate::trigger::clean_text;
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

/// Processor of followup messages for one invocation.
#[async_trait]
pub trait Follower: Send + Sync {
    /// Offer a followup message; `true` means it was consumed.
    async fn follow(&self, invocation: &Invocation, message: &Message) -> Result<bool>;
}

/// Whether the followup belongs to the invocation's handler and passes its authorizer.
pub async fn ensure_handles(invocation: &Invocation, message: &Message) -> Result<bool> {
    let handler = invocation.handler();
    if !handler
        .handles_what()
        .message_matcher
        .matches(message, handler.name(), false)
    {
        return Ok(false);
    }
    match handler.check_authorized(invocation.bot(), message, None).await {
        Ok(()) => Ok(true),
        Err(Error::NotAuthorized(_)) => Ok(false),
        Err(err) => Err(err),
    }
}

fn thread_reply(invocation: &Invocation, prefixed: bool) -> ReplyOptions {
    ReplyOptions {
        threaded: true,
        prefixed,
        thread_ts: invocation.message().body.ts.clone(),
    }
}

/// Replies with the invocation's current state.
#[derive(Debug, Default)]
pub struct ShowStatus;

const STATE_RESPONSES: &[&str] = &["status", "state"];

#[async_trait]
impl Follower for ShowStatus {
    async fn follow(&self, invocation: &Invocation, message: &Message) -> Result<bool> {
        if !ensure_handles(invocation, message).await? {
            return Ok(false);
        }
        let text = clean_text(&message.body.text);
        if !STATE_RESPONSES.contains(&text.as_str()) {
            return Ok(false);
        }
        let state = invocation.state().unwrap_or_default();
        message
            .reply_text(
                &format!("The handler is in `{}` state.", state),
                thread_reply(invocation, false),
            )
            .await?;
        Ok(true)
    }
}

/// Moves the invocation to `CANCELLED`.
#[derive(Debug, Default)]
pub struct CancelMe;

const CANCEL_RESPONSES: &[&str] = &["cancel", "stop"];

#[async_trait]
impl Follower for CancelMe {
    async fn follow(&self, invocation: &Invocation, message: &Message) -> Result<bool> {
        if !ensure_handles(invocation, message).await? {
            return Ok(false);
        }
        if CANCEL_RESPONSES.contains(&clean_text(&message.body.text).as_str()) {
            invocation.change_state("CANCELLED");
            return Ok(true);
        }
        Ok(false)
    }
}

type Confirmer = (Option<String>, Option<String>);

#[derive(Debug, Default)]
struct Confirmations {
    confirmed: HashSet<Confirmer>,
    forced: HashSet<Confirmer>,
}

/// Sign-off flow: collects confirmations from distinct users.
///
/// Final states are `CONFIRMED`, `CONFIRMED_FORCED` and `CONFIRMED_CANCELLED`.
pub struct ConfirmMe {
    confirms_needed: usize,
    confirms_what: String,
    confirm_self_ok: bool,
    check: Option<Arc<dyn Fn() -> String + Send + Sync>>,
    state: Mutex<Confirmations>,
}

const CONFIRM_CANCEL_RESPONSES: &[&str] = &["cancel", "stop", "no"];
const CHECK_RESPONSES: &[&str] = &["check"];
const GO_RESPONSES: &[&str] = &["signoff", "ok", "yes", "go", ":make-it-so:", ":hulk:"];
const JFDI_RESPONSES: &[&str] = &["jfdi", ":hulk-mad:"];

fn hotdog_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(:hotdog:\s*|:gdhotdog:\s*|:hotdogboy:\s*){7}$")
            .expect("static pattern compiles")
    })
}

impl ConfirmMe {
    pub fn new(confirms_what: impl Into<String>) -> Self {
        Self {
            confirms_needed: 1,
            confirms_what: confirms_what.into(),
            confirm_self_ok: false,
            check: None,
            state: Mutex::new(Confirmations::default()),
        }
    }

    pub fn confirms_needed(mut self, needed: usize) -> Self {
        self.confirms_needed = needed.max(1);
        self
    }

    pub fn confirm_self_ok(mut self, ok: bool) -> Self {
        self.confirm_self_ok = ok;
        self
    }

    /// Callback answering `check` responses.
    pub fn check(mut self, check: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.check = Some(Arc::new(check));
        self
    }

    pub fn confirmed_by(&self) -> Vec<Confirmer> {
        let mut all: Vec<Confirmer> = self.state.lock().confirmed.iter().cloned().collect();
        all.sort();
        all
    }

    pub fn forced_by(&self) -> Vec<Confirmer> {
        let mut all: Vec<Confirmer> = self.state.lock().forced.iter().cloned().collect();
        all.sort();
        all
    }

    /// Prompt telling users who may confirm.
    pub fn who_satisfies_message(&self, invocation: &Invocation) -> String {
        let mut buf = format!("Awaiting sign-off from {} members", self.confirms_needed);
        if let Some(authorizer) = &invocation.handler().handles_what().authorizer {
            buf.push_str(&format!(
                " that satisfy authorizer `{}`",
                authorizer.describe(invocation.bot())
            ));
        }
        buf.push_str(&format!(" to confirm `{}`", self.confirms_what));
        if self.confirm_self_ok {
            buf.push_str(" (self-confirms are ok)");
        } else {
            buf.push_str(" (self-confirms are not ok)");
        }
        buf.push('.');
        buf
    }

    fn is_jfdi(text: &str) -> bool {
        JFDI_RESPONSES.contains(&text) || hotdog_re().is_match(text)
    }

    fn ok_responses(&self) -> Vec<&'static str> {
        let mut ok: Vec<&'static str> = CONFIRM_CANCEL_RESPONSES.to_vec();
        ok.extend_from_slice(GO_RESPONSES);
        if self.check.is_some() {
            ok.extend_from_slice(CHECK_RESPONSES);
        }
        ok.sort_unstable();
        ok
    }
}

#[async_trait]
impl Follower for ConfirmMe {
    async fn follow(&self, invocation: &Invocation, message: &Message) -> Result<bool> {
        if !ensure_handles(invocation, message).await? {
            return Ok(false);
        }
        let text = clean_text(&message.body.text);
        if CONFIRM_CANCEL_RESPONSES.contains(&text.as_str()) {
            invocation.change_state("CONFIRMED_CANCELLED");
            return Ok(true);
        }
        let who = (message.body.user_name.clone(), message.body.user_id.clone());
        if Self::is_jfdi(&text) {
            self.state.lock().forced.insert(who);
            invocation.change_state("CONFIRMED_FORCED");
            return Ok(true);
        }

        let reply = if GO_RESPONSES.contains(&text.as_str()) {
            let rejected = {
                let mut state = self.state.lock();
                let self_confirm = state.confirmed.contains(&who)
                    || message.body.user_name == invocation.message().body.user_name;
                if self_confirm && !self.confirm_self_ok {
                    true
                } else {
                    state.confirmed.insert(who);
                    if state.confirmed.len() >= self.confirms_needed {
                        invocation.change_state("CONFIRMED");
                    }
                    false
                }
            };
            if rejected {
                Some(match &invocation.handler().handles_what().authorizer {
                    Some(authorizer) => format!(
                        "Please get another member that satisfies authorizer `{}` to signoff on this {}.",
                        authorizer.describe(invocation.bot()),
                        self.confirms_what
                    ),
                    None => format!("Please get another member to signoff on this {}.", self.confirms_what),
                })
            } else {
                None
            }
        } else if CHECK_RESPONSES.contains(&text.as_str()) && self.check.is_some() {
            self.check.as_ref().map(|check| check())
        } else {
            Some(format!(
                "Unexpected confirmation response, please respond with one of {}.",
                self.ok_responses().join(", ")
            ))
        };

        if let Some(reply) = reply {
            message.reply_text(&reply, thread_reply(invocation, true)).await?;
        }
        Ok(true)
    }
}

/// Requests that a running execution be stopped.
#[derive(Debug, Default)]
pub struct StopExecution;

const KILL_RESPONSES: &[&str] = &["kill", "destroy", "murder"];
const INT_RESPONSES: &[&str] = &["interrupt", "int", "stop", "cancel", "quit"];
const TERM_RESPONSES: &[&str] = &["term", "terminate"];
const EXECUTING_STATES: &[&str] = &[
    "EXECUTING",
    "EXECUTING_KILLED",
    "EXECUTING_TERM",
    "EXECUTING_INTERRUPT",
];

#[async_trait]
impl Follower for StopExecution {
    async fn follow(&self, invocation: &Invocation, message: &Message) -> Result<bool> {
        if !ensure_handles(invocation, message).await? {
            return Ok(false);
        }
        let executing = invocation
            .state()
            .map(|s| EXECUTING_STATES.contains(&s.as_str()))
            .unwrap_or(false);
        if !executing {
            return Ok(false);
        }
        let text = clean_text(&message.body.text);
        let (state, how) = if KILL_RESPONSES.contains(&text.as_str()) {
            ("EXECUTING_KILLED", "killed (via `SIGKILL`)")
        } else if INT_RESPONSES.contains(&text.as_str()) {
            ("EXECUTING_INTERRUPT", "interrupted (via `SIGINT`)")
        } else if TERM_RESPONSES.contains(&text.as_str()) {
            ("EXECUTING_TERM", "terminated (via `SIGTERM`)")
        } else {
            return Ok(false);
        };
        invocation.change_state(state);
        message
            .reply_text(
                &format!("Execution will hopefully be {} soon.", how),
                thread_reply(invocation, false),
            )
            .await?;
        Ok(true)
    }
}
