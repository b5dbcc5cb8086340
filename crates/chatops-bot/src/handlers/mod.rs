//! Built-in handlers.

mod hello;
mod help;
mod lifecycle;
mod seen;
mod stats;

pub use hello::HelloHandler;
pub use help::{HelpHandler, RegistrySlot};
pub use lifecycle::{Lifecycle, LifecycleHandler};
pub use seen::{SeenBook, SeenHandler, SeenRecorder, Sighting};
pub use stats::StatsHandler;

use crate::config::Config;
use chatops_core::{Handler, HandlerProvider, MessageMatcher};
use std::sync::Arc;
use std::time::Duration;

/// Plain chat messages from any chat transport.
pub(crate) fn chat_messages() -> MessageMatcher {
    MessageMatcher::or([
        MessageMatcher::slack(&["message"]),
        MessageMatcher::telnet(&["message"]),
    ])
}

/// Provider of the built-in handlers.
pub struct Builtins {
    admin_channel: Option<String>,
    wait_check_delay: Duration,
    registry: RegistrySlot,
    seen: Arc<SeenBook>,
}

impl Builtins {
    pub fn new(config: &Config, registry: RegistrySlot) -> Self {
        Self {
            admin_channel: config.bot.admin_channel.clone(),
            wait_check_delay: config.dispatch.wait_check_delay,
            registry,
            seen: Arc::new(SeenBook::default()),
        }
    }

    pub fn seen(&self) -> &Arc<SeenBook> {
        &self.seen
    }
}

impl HandlerProvider for Builtins {
    fn handlers(&self) -> Vec<Arc<dyn Handler>> {
        let admin = self.admin_channel.clone();
        vec![
            Arc::new(HelloHandler::new()),
            Arc::new(HelpHandler::new(self.registry.clone())),
            Arc::new(StatsHandler::new()),
            Arc::new(
                LifecycleHandler::new(Lifecycle::Restart, admin.clone())
                    .check_delay(self.wait_check_delay),
            ),
            Arc::new(
                LifecycleHandler::new(Lifecycle::Shutdown, admin).check_delay(self.wait_check_delay),
            ),
            Arc::new(SeenRecorder::new(self.seen.clone())),
            Arc::new(SeenHandler::new(self.seen.clone())),
        ]
    }
}
