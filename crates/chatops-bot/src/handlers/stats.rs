//! Stats command - per-handler run counts.

use super::chat_messages;
use async_trait::async_trait;
use chatops_core::{Args, Channel, Handler, HandlesWhat, Invocation, Result};
use chrono::Utc;

pub struct StatsHandler {
    what: HandlesWhat,
}

impl StatsHandler {
    pub fn new() -> Self {
        Self {
            what: HandlesWhat::new(Channel::Targeted, chat_messages()).trigger("stats", false),
        }
    }
}

impl Default for StatsHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for StatsHandler {
    fn name(&self) -> &str {
        "stats"
    }

    fn title(&self) -> &str {
        "Shows how often each handler ran and failed."
    }

    fn handles_what(&self) -> &HandlesWhat {
        &self.what
    }

    async fn execute(&self, invocation: &Invocation, _args: Args) -> Result<Option<String>> {
        let bot = invocation.bot();
        let up = (Utc::now() - bot.started_at).num_seconds().max(0);
        let mut lines = vec![format!("Up for {} seconds.", up)];
        for (name, stats) in bot.stats.snapshot() {
            lines.push(format!(
                "`{}`: ran {} times, failed {} times, total run time {:.3}s",
                name,
                stats.ran,
                stats.failed,
                stats.total_run_time.as_secs_f64()
            ));
        }
        Ok(Some(lines.join("\n")))
    }
}
