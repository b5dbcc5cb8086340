//! The contract every command or event handler implements.
//!
//! A handler declares what it handles ([`HandlesWhat`]) and what it needs
//! to be enabled ([`Requirements`]). The default trait methods implement
//! matching, argument extraction, validation, authorization and help text
//! from those declarations, so most handlers only provide `execute`.

use crate::args::{Args, ArgsSpec};
use crate::authorizers::Authorizer;
use crate::bot::{extract, truthy, BotContext, LookupError};
use crate::channel::Channel;
use crate::error::Result;
use crate::followers::Follower;
use crate::invocation::Invocation;
use crate::matchers::{ChannelMatcher, MessageMatcher};
use crate::message::Message;
use crate::periodics::{self, Scheduler};
use crate::trigger::Trigger;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// How a handler's arguments arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerMatch {
    /// Raw text following the trigger, to be tokenised.
    Text(String),
    /// Pre-built arguments from an internal message; trusted.
    Explicit(Args),
}

/// Creates a fresh follower for each invocation.
pub type FollowerFactory = Arc<dyn Fn() -> Arc<dyn Follower> + Send + Sync>;

/// Declaration of the messages a handler accepts.
#[derive(Clone)]
pub struct HandlesWhat {
    pub channel_matcher: ChannelMatcher,
    pub message_matcher: MessageMatcher,
    pub triggers: Vec<Trigger>,
    pub args: Option<ArgsSpec>,
    pub authorizer: Option<Authorizer>,
    pub followers: Vec<FollowerFactory>,
    /// Only accept messages directed at the bot.
    pub only_to_me: bool,
}

impl HandlesWhat {
    pub fn new(channel_matcher: impl Into<ChannelMatcher>, message_matcher: MessageMatcher) -> Self {
        Self {
            channel_matcher: channel_matcher.into(),
            message_matcher,
            triggers: Vec::new(),
            args: None,
            authorizer: None,
            followers: Vec::new(),
            only_to_me: true,
        }
    }

    pub fn trigger(mut self, text: &str, takes_args: bool) -> Self {
        self.triggers.push(Trigger::new(text, takes_args));
        self
    }

    pub fn args(mut self, args: ArgsSpec) -> Self {
        self.args = Some(args);
        self
    }

    pub fn authorizer(mut self, authorizer: Authorizer) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn follower(mut self, factory: impl Fn() -> Arc<dyn Follower> + Send + Sync + 'static) -> Self {
        self.followers.push(Arc::new(factory));
        self
    }

    /// Accept messages whether or not they were directed at the bot.
    pub fn passive(mut self) -> Self {
        self.only_to_me = false;
        self
    }
}

impl fmt::Debug for HandlesWhat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlesWhat")
            .field("channel_matcher", &self.channel_matcher)
            .field("message_matcher", &self.message_matcher)
            .field("triggers", &self.triggers)
            .field("args", &self.args)
            .field("authorizer", &self.authorizer.is_some())
            .field("followers", &self.followers.len())
            .field("only_to_me", &self.only_to_me)
            .finish()
    }
}

/// Capabilities a handler needs before it is enabled.
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    /// Dotted config path scoping the handler's configuration.
    pub config_section: Option<String>,
    /// Secret section the handler reads.
    pub secret_section: Option<String>,
    /// Path (inside the config section) of an on/off switch, and its default.
    pub config_on_off: Option<(String, bool)>,
    /// Paths that must exist inside the config section.
    pub required_configurations: Vec<String>,
    /// Keys that must exist inside the secret section.
    pub required_secrets: Vec<String>,
    /// Named clients that must be registered.
    pub required_clients: Vec<String>,
    /// Config path listing periodic runs of this handler.
    pub periodic_config_path: Option<String>,
}

/// Check a handler's requirements against the bot, logging the first failure.
pub fn check_requirements(name: &str, requirements: &Requirements, bot: &BotContext) -> bool {
    let config = match &requirements.config_section {
        Some(section) => match extract(&bot.config, section) {
            Ok(config) => config,
            Err(_) => {
                warn!(handler = %name, section = %section, "Handler disabled, missing required configuration section");
                return false;
            }
        },
        None => &bot.config,
    };

    let secrets = match &requirements.secret_section {
        Some(section) => match bot.secrets.section(section) {
            Some(secrets) => Some(secrets),
            None => {
                warn!(handler = %name, section = %section, "Handler disabled, missing required secret section");
                return false;
            }
        },
        None => None,
    };

    if let Some((path, default)) = &requirements.config_on_off {
        let on = match extract(config, path) {
            Ok(value) => truthy(value),
            Err(_) => *default,
        };
        if !on {
            warn!(handler = %name, path = %path, "Handler disabled, forced off by configuration");
            return false;
        }
    }

    let mut required_configurations = requirements.required_configurations.clone();
    required_configurations.sort();
    for path in &required_configurations {
        match extract(config, path) {
            Ok(_) => {}
            Err(LookupError::NotAMapping(_)) => {
                warn!(handler = %name, path = %path, "Handler disabled, wrong type of configuration");
                return false;
            }
            Err(_) => {
                warn!(handler = %name, path = %path, "Handler disabled, missing required configuration");
                return false;
            }
        }
    }

    let mut required_secrets = requirements.required_secrets.clone();
    required_secrets.sort();
    for key in &required_secrets {
        let present = match secrets {
            Some(section) => section.contains_key(key),
            None => bot.secrets.get(key).is_some(),
        };
        if !present {
            warn!(handler = %name, path = %key, "Handler disabled, missing required secret");
            return false;
        }
    }

    let mut required_clients = requirements.required_clients.clone();
    required_clients.sort();
    for client in &required_clients {
        if !bot.clients.contains(client) {
            warn!(handler = %name, client = %client, "Handler disabled, missing required client");
            return false;
        }
    }

    true
}

/// Match a message against a handler's declaration.
pub fn match_declaration(
    name: &str,
    what: &HandlesWhat,
    message: &Message,
    channel: Channel,
) -> Option<HandlerMatch> {
    if !what.channel_matcher.matches(channel) {
        return None;
    }
    if !what.message_matcher.matches(message, name, what.only_to_me) {
        return None;
    }
    if let Some(args) = &message.headers.explicit_args {
        return Some(HandlerMatch::Explicit(args.clone()));
    }
    if what.triggers.is_empty() {
        return Some(HandlerMatch::Text(String::new()));
    }
    let text = message.body.match_text();
    what.triggers
        .iter()
        .find_map(|trigger| trigger.matches(text))
        .map(HandlerMatch::Text)
}

/// A pluggable command or event handler.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Unique handler name, also used as the explicit target header value.
    fn name(&self) -> &str;

    /// One line summary shown in help.
    fn title(&self) -> &str {
        "???"
    }

    fn handles_what(&self) -> &HandlesWhat;

    fn requirements(&self) -> Requirements {
        Requirements::default()
    }

    fn is_enabled(&self, bot: &BotContext) -> bool {
        check_requirements(self.name(), &self.requirements(), bot)
    }

    /// One-time setup after the registry enables the handler.
    async fn setup(&self, _bot: &BotContext) -> Result<()> {
        Ok(())
    }

    /// Hand periodic runs configured for this handler to the scheduler.
    fn insert_periodics(&self, bot: &BotContext, scheduler: &mut dyn Scheduler) -> Result<()> {
        let Some(path) = self.requirements().periodic_config_path else {
            return Ok(());
        };
        for job in periodics::jobs_from_config(bot, self.name(), &path)? {
            scheduler.add_job(job)?;
        }
        Ok(())
    }

    fn handles(&self, _bot: &BotContext, message: &Message, channel: Channel) -> Option<HandlerMatch> {
        match_declaration(self.name(), self.handles_what(), message, channel)
    }

    /// Turn a match into arguments; the flag says they are trusted.
    fn extract_arguments(&self, matched: &HandlerMatch) -> std::result::Result<(Args, bool), String> {
        match matched {
            HandlerMatch::Explicit(args) => {
                let mut args = args.clone();
                if let Some(spec) = &self.handles_what().args {
                    spec.apply_defaults(&mut args);
                }
                Ok((args, true))
            }
            HandlerMatch::Text(raw) => {
                // Without declared arguments any trailing text is ignored.
                let args = match &self.handles_what().args {
                    Some(spec) => spec.extract(raw)?,
                    None => Args::new(),
                };
                Ok((args, false))
            }
        }
    }

    fn validate_arguments(&self, args: &Args) -> std::result::Result<(), String> {
        match self.handles_what().args.as_ref().and_then(|a| a.schema.as_ref()) {
            Some(schema) => schema.validate(args),
            None => Ok(()),
        }
    }

    /// Run the declared authorizer unless the message disables auth checks.
    async fn check_authorized(&self, bot: &BotContext, message: &Message, args: Option<&Args>) -> Result<()> {
        if !message.headers.check_auth {
            return Ok(());
        }
        match &self.handles_what().authorizer {
            Some(authorizer) => authorizer.check(bot, message, args).await,
            None => Ok(()),
        }
    }

    fn manipulate_arguments(&self, _args: &mut Args) -> std::result::Result<(), String> {
        Ok(())
    }

    fn has_help(&self) -> bool {
        !self.handles_what().triggers.is_empty()
    }

    /// Title and help lines.
    fn help(&self, bot: &BotContext) -> (String, Vec<String>) {
        describe(self.title(), self.handles_what(), bot)
    }

    /// The handler's actual work.
    async fn execute(&self, invocation: &Invocation, args: Args) -> Result<Option<String>>;
}

fn describe(title: &str, what: &HandlesWhat, bot: &BotContext) -> (String, Vec<String>) {
    const INDENT: &str = "    ";
    let mut how_to = Vec::new();

    match what.triggers.as_slice() {
        [] => {}
        [only] => how_to.push(format!("_Trigger:_ *{}*", only.text())),
        many => {
            how_to.push("_Triggers:_".to_string());
            for trigger in many {
                how_to.push(format!("{}• *{}*", INDENT, trigger.text()));
            }
        }
    }

    if let Some(spec) = &what.args {
        if !spec.order.is_empty() {
            how_to.push("_Arguments:_".to_string());
            for arg in &spec.order {
                match spec.defaults.get(arg) {
                    Some(default) => {
                        let shown = match default {
                            Value::Null => String::new(),
                            Value::String(s) if s.is_empty() => String::new(),
                            Value::String(s) => format!("`{}`", s),
                            other => format!("`{}`", other),
                        };
                        how_to.push(format!("{}`{}` (default={}) ", INDENT, arg, shown));
                    }
                    None => how_to.push(format!("{}`{}` (required) ", INDENT, arg)),
                }
            }
        }

        let arg_help: Vec<String> = spec
            .order
            .iter()
            .filter_map(|arg| {
                let first = spec.help.get(arg)?.lines().next()?.trim();
                (!first.is_empty()).then(|| format!("{}`{}`: {}", INDENT, arg, first))
            })
            .collect();
        if !arg_help.is_empty() {
            how_to.push("_Argument help:_".to_string());
            how_to.extend(arg_help);
        }
    }

    if let Some(authorizer) = &what.authorizer {
        how_to.push(format!("_Authorizer:_ `{}`", authorizer.describe(bot)));
    }

    (title.to_string(), how_to)
}
