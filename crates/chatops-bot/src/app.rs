//! Wires configuration, handlers and the dispatcher into a running bot.

use crate::config::Config;
use crate::error::AppResult;
use crate::handlers::{Builtins, RegistrySlot, SeenBook};
use chatops_core::periodics::JobBook;
use chatops_core::{BotContext, Dispatcher, HandlerRegistry, Shutdown};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct App {
    pub bot: Arc<BotContext>,
    pub registry: Arc<HandlerRegistry>,
    pub dispatcher: Dispatcher,
    pub jobs: JobBook,
    pub seen: Arc<SeenBook>,
}

impl App {
    /// Build the bot from `config`, sharing `shutdown` across restarts.
    pub async fn build(mut config: Config, shutdown: Shutdown) -> AppResult<Self> {
        let tree = config.tree()?;
        let secrets = config.take_secrets();
        let bot = Arc::new(
            BotContext::new(config.bot.name.clone(), tree)
                .with_secrets(secrets)
                .with_shutdown(shutdown),
        );

        let slot = RegistrySlot::default();
        let builtins = Builtins::new(&config, slot.clone());
        let registry = Arc::new(HandlerRegistry::build(&bot, &builtins).await?);
        if slot.set(registry.clone()).is_err() {
            warn!("Handler registry slot was already filled");
        }

        let mut jobs = JobBook::new();
        registry.insert_periodics(&bot, &mut jobs)?;

        let settings = config.dispatch.settings(&config.bot.suggestable_kinds);
        let dispatcher = Dispatcher::new(bot.clone(), registry.clone(), settings);
        info!(
            bot = %bot.name,
            handlers = registry.len(),
            periodics = jobs.jobs().len(),
            "Bot ready"
        );

        Ok(Self {
            bot,
            registry,
            dispatcher,
            jobs,
            seen: builtins.seen().clone(),
        })
    }

    /// Refuse new work and wait up to `timeout` for active invocations to end.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.dispatcher.set_quiescing(true);
        let started = Instant::now();
        loop {
            let active = self.dispatcher.active();
            if active.is_empty() {
                return true;
            }
            if started.elapsed() >= timeout {
                warn!(active = active.len(), "Gave up waiting for active invocations");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
