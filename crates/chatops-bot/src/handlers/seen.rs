//! Tracks who has been talking, and answers `seen <user>`.

use super::chat_messages;
use async_trait::async_trait;
use chatops_core::schema::Schema;
use chatops_core::{
    Args, ArgsSpec, Channel, Handler, HandlesWhat, Invocation, Requirements, Result,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const ENABLED_PATH: &str = "handlers.seen.enabled";

/// Last sighting of a user.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub count: u64,
    pub last_seen: DateTime<Utc>,
    pub channel: Option<String>,
}

/// Shared between the recorder and the query handler.
#[derive(Debug, Default)]
pub struct SeenBook {
    users: Mutex<HashMap<String, Sighting>>,
}

impl SeenBook {
    pub fn record(&self, user: &str, channel: Option<&str>) {
        let mut users = self.users.lock();
        let now = Utc::now();
        let sighting = users.entry(user.to_string()).or_insert_with(|| Sighting {
            count: 0,
            last_seen: now,
            channel: None,
        });
        sighting.count += 1;
        sighting.last_seen = now;
        sighting.channel = channel.map(str::to_string);
    }

    pub fn get(&self, user: &str) -> Option<Sighting> {
        self.users.lock().get(user).cloned()
    }
}

fn seen_requirements() -> Requirements {
    Requirements {
        config_on_off: Some((ENABLED_PATH.into(), true)),
        ..Default::default()
    }
}

/// Passive broadcast listener counting messages per user.
pub struct SeenRecorder {
    what: HandlesWhat,
    book: Arc<SeenBook>,
}

impl SeenRecorder {
    pub fn new(book: Arc<SeenBook>) -> Self {
        Self {
            what: HandlesWhat::new(Channel::Broadcast, chat_messages()).passive(),
            book,
        }
    }
}

#[async_trait]
impl Handler for SeenRecorder {
    fn name(&self) -> &str {
        "seen.recorder"
    }

    fn handles_what(&self) -> &HandlesWhat {
        &self.what
    }

    fn requirements(&self) -> Requirements {
        seen_requirements()
    }

    async fn execute(&self, invocation: &Invocation, _args: Args) -> Result<Option<String>> {
        let body = &invocation.message().body;
        if let Some(user) = body.user_name.as_deref() {
            let channel = body.channel_name.as_deref().or(body.channel.as_deref());
            self.book.record(user, channel);
        }
        Ok(None)
    }
}

/// `seen <user>`.
pub struct SeenHandler {
    what: HandlesWhat,
    book: Arc<SeenBook>,
}

impl SeenHandler {
    pub fn new(book: Arc<SeenBook>) -> Self {
        Self {
            what: HandlesWhat::new(Channel::Targeted, chat_messages())
                .trigger("seen", true)
                .args(
                    ArgsSpec::new(["user"])
                        .help("user", "user name to look up")
                        .schema(Schema::new(json!({
                            "type": "object",
                            "properties": {"user": {"type": "string", "minLength": 1}},
                            "required": ["user"]
                        }))),
                ),
            book,
        }
    }
}

#[async_trait]
impl Handler for SeenHandler {
    fn name(&self) -> &str {
        "seen"
    }

    fn title(&self) -> &str {
        "Tells you when somebody was last seen talking."
    }

    fn handles_what(&self) -> &HandlesWhat {
        &self.what
    }

    fn requirements(&self) -> Requirements {
        seen_requirements()
    }

    async fn execute(&self, _invocation: &Invocation, args: Args) -> Result<Option<String>> {
        let user = args.get_str("user").unwrap_or_default();
        let reply = match self.book.get(user) {
            Some(sighting) => {
                let mut reply = format!(
                    "I have seen `{}` {} times, last at {}",
                    user,
                    sighting.count,
                    sighting.last_seen.format("%Y-%m-%d %H:%M:%S UTC")
                );
                if let Some(channel) = sighting.channel {
                    reply.push_str(&format!(" in `{}`", channel));
                }
                reply.push('.');
                reply
            }
            None => format!("I have not seen `{}`.", user),
        };
        Ok(Some(reply))
    }
}
