//! Periodic jobs: configured, internally synthesised runs of a handler.

use crate::args::Args;
use crate::bot::{extract, BotContext};
use crate::error::{Error, Result};
use crate::message::{Headers, Message, MessageBody, Replier};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;

fn default_kind() -> String {
    "slack/message".to_string()
}

/// One configured periodic run, as found in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PeriodicSpec {
    /// Cron expression.
    pub period: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub args: Args,
    /// Kind of the synthesised message; must satisfy the handler's matcher.
    #[serde(default = "default_kind")]
    pub kind: String,
}

/// A periodic job ready to hand to a scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodicJob {
    pub id: String,
    pub name: String,
    pub description: String,
    pub period: String,
    pub channel: String,
    pub handler: String,
    pub args: Args,
    pub kind: String,
}

impl PeriodicJob {
    /// Build the internal message that triggers this job's handler.
    pub fn message(&self, ts: impl Into<String>, replier: Arc<dyn Replier>) -> Message {
        let body = MessageBody {
            ts: Some(ts.into()),
            channel_name: Some(self.channel.clone()),
            user_name: Some(String::new()),
            ..MessageBody::default()
        };
        Message::new(&self.kind, body, replier).with_headers(Headers {
            validated: true,
            to_me: true,
            check_auth: false,
            explicit_args: Some(self.args.clone()),
            target_handler: Some(self.handler.clone()),
            internal: true,
        })
    }
}

/// Receives periodic jobs from handlers.
pub trait Scheduler: Send {
    fn add_job(&mut self, job: PeriodicJob) -> Result<()>;
}

/// Scheduler that records jobs without running them.
#[derive(Debug, Default)]
pub struct JobBook {
    jobs: Vec<PeriodicJob>,
}

impl JobBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> &[PeriodicJob] {
        &self.jobs
    }

    pub fn get(&self, id: &str) -> Option<&PeriodicJob> {
        self.jobs.iter().find(|j| j.id == id)
    }
}

impl Scheduler for JobBook {
    fn add_job(&mut self, job: PeriodicJob) -> Result<()> {
        if self.get(&job.id).is_some() {
            return Err(Error::Config(format!("Duplicate periodic job id '{}'", job.id)));
        }
        info!(job = %job.id, handler = %job.handler, period = %job.period, channel = %job.channel, "Periodic job added");
        self.jobs.push(job);
        Ok(())
    }
}

/// Hex SHA-256 of the pieces, truncated to `max_len` characters.
pub fn hash_pieces(pieces: &[&str], max_len: Option<usize>) -> String {
    let mut hasher = Sha256::new();
    for piece in pieces {
        hasher.update(piece.as_bytes());
    }
    let mut digest = hex::encode(hasher.finalize());
    if let Some(max_len) = max_len {
        digest.truncate(max_len);
    }
    digest
}

/// Build the periodic jobs listed at `path` for the handler `handler`.
///
/// A missing path yields no jobs.
pub fn jobs_from_config(bot: &BotContext, handler: &str, path: &str) -> Result<Vec<PeriodicJob>> {
    let Ok(raw) = extract(&bot.config, path) else {
        return Ok(Vec::new());
    };
    let specs: Vec<PeriodicSpec> = serde_json::from_value(raw.clone())
        .map_err(|e| Error::Config(format!("Invalid periodic configuration at '{}': {}", path, e)))?;

    let fallback_channel = ["bot.periodic_channel", "bot.admin_channel"]
        .iter()
        .find_map(|p| extract(&bot.config, p).ok().and_then(|v| v.as_str()))
        .map(str::to_string);

    let runs_what = format!("handler '{}'", handler);
    let mut jobs = Vec::with_capacity(specs.len());
    for (i, spec) in specs.into_iter().enumerate() {
        let channel = spec
            .channel
            .clone()
            .or_else(|| fallback_channel.clone())
            .ok_or_else(|| {
                Error::Config(format!(
                    "Periodic run {} of {} has no channel and no default channel is configured",
                    i, runs_what
                ))
            })?;
        let name = spec.name.clone().unwrap_or_else(|| format!("{}.run()", handler));
        let description = spec.description.clone().unwrap_or_else(|| {
            format!(
                "Periodic run of {}\n\nTo channel: {}\n\nWith period: {}",
                runs_what, channel, spec.period
            )
        });
        let index = i.to_string();
        let id = spec.id.clone().unwrap_or_else(|| {
            hash_pieces(&[&name, &description, &spec.period, &index], Some(8))
        });
        jobs.push(PeriodicJob {
            id,
            name,
            description,
            period: spec.period,
            channel,
            handler: handler.to_string(),
            args: spec.args,
            kind: spec.kind,
        });
    }
    Ok(jobs)
}
