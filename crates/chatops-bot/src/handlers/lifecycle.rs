//! Restart and shutdown commands, both gated on a sign-off from another user.

use super::chat_messages;
use async_trait::async_trait;
use chatops_core::authorizers::message_from_channels;
use chatops_core::followers::ConfirmMe;
use chatops_core::{
    Args, Channel, Follower, Handler, HandlesWhat, Invocation, ReplyOptions, Result,
    ShutdownState, WaitOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// What the bot does once the request is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Restart,
    Shutdown,
}

impl Lifecycle {
    fn trigger(self) -> &'static str {
        match self {
            Lifecycle::Restart => "restart",
            Lifecycle::Shutdown => "shutdown",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Lifecycle::Restart => "Causes the bot to restart itself.",
            Lifecycle::Shutdown => "Causes the bot to turn itself off/shutdown.",
        }
    }

    fn ack(self) -> &'static str {
        match self {
            Lifecycle::Restart => "Restart acknowledged. Be back in a bit!",
            Lifecycle::Shutdown => "Shutdown acknowledged. Goodbye!",
        }
    }

    fn signal(self) -> ShutdownState {
        match self {
            Lifecycle::Restart => ShutdownState::Restarting,
            Lifecycle::Shutdown => ShutdownState::Dying,
        }
    }
}

pub struct LifecycleHandler {
    action: Lifecycle,
    what: HandlesWhat,
    wait: WaitOptions,
}

impl LifecycleHandler {
    /// When `admin_channel` is set, only requests from that channel are accepted.
    pub fn new(action: Lifecycle, admin_channel: Option<String>) -> Self {
        let mut what = HandlesWhat::new(Channel::Targeted, chat_messages()).trigger(action.trigger(), false);
        if let Some(channel) = admin_channel {
            what = what.authorizer(message_from_channels([channel]));
        }
        Self {
            action,
            what,
            wait: WaitOptions::default(),
        }
    }

    pub fn check_delay(mut self, delay: Duration) -> Self {
        self.wait = self.wait.check_delay(delay);
        self
    }

    /// Give up waiting for a sign-off after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.wait = self.wait.timeout(timeout);
        self
    }
}

#[async_trait]
impl Handler for LifecycleHandler {
    fn name(&self) -> &str {
        self.action.trigger()
    }

    fn title(&self) -> &str {
        self.action.title()
    }

    fn handles_what(&self) -> &HandlesWhat {
        &self.what
    }

    async fn execute(&self, invocation: &Invocation, _args: Args) -> Result<Option<String>> {
        let confirm = Arc::new(ConfirmMe::new(self.action.trigger()));
        invocation
            .message()
            .reply_text(&confirm.who_satisfies_message(invocation), ReplyOptions::threaded())
            .await?;

        let follower: Arc<dyn Follower> = confirm.clone();
        let ended = invocation
            .wait_for_transition(Some(follower), self.wait.clone())
            .await?;
        match ended.as_deref() {
            Some("CONFIRMED") | Some("CONFIRMED_FORCED") => {
                info!(
                    handler = %self.name(),
                    confirmed_by = ?confirm.confirmed_by(),
                    forced_by = ?confirm.forced_by(),
                    "Lifecycle request confirmed"
                );
                let shutdown = &invocation.bot().shutdown;
                if !shutdown.is_set() {
                    shutdown.set(self.action.signal())?;
                }
                Ok(Some(self.action.ack().to_string()))
            }
            _ => Ok(Some(format!("Ok, I will not {}.", self.action.trigger()))),
        }
    }
}
