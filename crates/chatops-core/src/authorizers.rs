//! Composable authorization policies.
//!
//! An [`Authorizer`] either passes or fails with [`Error::NotAuthorized`].
//! Policies combine with `&` (every check must pass) and `|` (the first
//! passing check wins, otherwise every reason is reported).

use crate::args::Args;
use crate::bot::{extract, BotContext};
use crate::error::{Error, Result};
use crate::message::Message;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::sync::Arc;

/// A single authorization check.
#[async_trait]
pub trait Authorize: Send + Sync {
    async fn authorize(&self, bot: &BotContext, message: &Message, args: Option<&Args>)
        -> Result<()>;

    /// Human readable rendering of the policy, computed without running it.
    fn describe(&self, bot: &BotContext) -> String;
}

/// Shareable, composable authorization policy.
#[derive(Clone)]
pub struct Authorizer(Arc<dyn Authorize>);

impl Authorizer {
    pub fn new(check: impl Authorize + 'static) -> Self {
        Self(Arc::new(check))
    }

    pub async fn check(&self, bot: &BotContext, message: &Message, args: Option<&Args>) -> Result<()> {
        self.0.authorize(bot, message, args).await
    }

    pub fn describe(&self, bot: &BotContext) -> String {
        self.0.describe(bot)
    }
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Authorizer").finish()
    }
}

impl BitAnd for Authorizer {
    type Output = Authorizer;

    fn bitand(self, rhs: Authorizer) -> Authorizer {
        all_must_pass([self, rhs])
    }
}

impl BitOr for Authorizer {
    type Output = Authorizer;

    fn bitor(self, rhs: Authorizer) -> Authorizer {
        any_must_pass([self, rhs])
    }
}

fn quote_join(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("'{}'", i))
        .collect::<Vec<_>>()
        .join(", ")
}

struct NoAuth;

#[async_trait]
impl Authorize for NoAuth {
    async fn authorize(&self, _bot: &BotContext, _message: &Message, _args: Option<&Args>) -> Result<()> {
        Ok(())
    }

    fn describe(&self, _bot: &BotContext) -> String {
        "no_auth()".into()
    }
}

/// Lets every message through.
pub fn no_auth() -> Authorizer {
    Authorizer::new(NoAuth)
}

/// Extracts the allowed values for an argument from the message.
pub type AllowedExtractor = Arc<dyn Fn(&Message) -> Vec<String> + Send + Sync>;

struct ArgsKeyIsEmptyOrAllowed {
    key: String,
    extractor_name: String,
    extractor: AllowedExtractor,
}

#[async_trait]
impl Authorize for ArgsKeyIsEmptyOrAllowed {
    async fn authorize(&self, _bot: &BotContext, message: &Message, args: Option<&Args>) -> Result<()> {
        let args = args.ok_or_else(|| {
            Error::not_authorized(
                "Message lacks a (non-empty) 'args' keyword argument, \
                 unable to auth against unknown arguments",
            )
        })?;
        let value = match args.get(&self.key) {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::String(s)) if s.is_empty() => return Ok(()),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        if (self.extractor)(message).contains(&value) {
            Ok(())
        } else {
            Err(Error::not_authorized(format!(
                "Action can not be triggered please check that the argument '{0}' \
                 value is allowed or that argument '{0}' is empty",
                self.key
            )))
        }
    }

    fn describe(&self, _bot: &BotContext) -> String {
        format!("args_key_is_empty_or_allowed('{}', {})", self.key, self.extractor_name)
    }
}

/// Denies when argument `key` is non-empty and not among the values the
/// extractor pulls from the message.
pub fn args_key_is_empty_or_allowed(
    key: &str,
    extractor_name: &str,
    extractor: impl Fn(&Message) -> Vec<String> + Send + Sync + 'static,
) -> Authorizer {
    Authorizer::new(ArgsKeyIsEmptyOrAllowed {
        key: key.to_string(),
        extractor_name: extractor_name.to_string(),
        extractor: Arc::new(extractor),
    })
}

struct UserInGroups {
    config_keys: Vec<String>,
}

impl UserInGroups {
    fn allowed_groups(&self, bot: &BotContext) -> Result<Vec<String>> {
        let mut groups = Vec::new();
        for key in &self.config_keys {
            match extract(&bot.config, key) {
                Ok(Value::String(group)) => groups.push(group.clone()),
                Ok(Value::Array(items)) => {
                    for item in items {
                        let group = item.as_str().ok_or_else(|| {
                            Error::Config(format!(
                                "Unexpected group configuration value {} under '{}'",
                                item, key
                            ))
                        })?;
                        groups.push(group.to_string());
                    }
                }
                Ok(other) => {
                    return Err(Error::Config(format!(
                        "Unexpected group configuration value {} under '{}'",
                        other, key
                    )))
                }
                Err(_) => {}
            }
        }
        Ok(groups)
    }
}

#[async_trait]
impl Authorize for UserInGroups {
    async fn authorize(&self, bot: &BotContext, message: &Message, _args: Option<&Args>) -> Result<()> {
        let directory = bot.clients.group_directory().ok_or_else(|| {
            Error::Unavailable(
                "Group directory client not found; required to perform authorization checks"
                    .into(),
            )
        })?;
        let user_name = match message.body.user_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(Error::not_authorized(
                    "Message lacks a (non-empty) user name, unable to auth against unknown users",
                ))
            }
        };
        let groups = self.allowed_groups(bot)?;
        if directory.is_allowed(user_name, &groups).await? {
            Ok(())
        } else {
            Err(Error::not_authorized(
                "Action can not be triggered please check that the sender is in the \
                 correct group(s)",
            ))
        }
    }

    fn describe(&self, bot: &BotContext) -> String {
        let groups = self.allowed_groups(bot).unwrap_or_default();
        format!("user_in_groups({})", quote_join(&groups))
    }
}

/// Denies senders not in any group configured under `config_keys`.
///
/// Each key is a dotted config path holding a group name or a list of them.
pub fn user_in_groups<I, S>(config_keys: I) -> Authorizer
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Authorizer::new(UserInGroups {
        config_keys: config_keys.into_iter().map(Into::into).collect(),
    })
}

struct MessageFromChannels {
    channels: Vec<String>,
}

#[async_trait]
impl Authorize for MessageFromChannels {
    async fn authorize(&self, _bot: &BotContext, message: &Message, _args: Option<&Args>) -> Result<()> {
        let channel_name = match message.body.channel_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(Error::not_authorized(
                    "Message lacks a (non-empty) channel name, unable to trigger against \
                     unknown channels",
                ))
            }
        };
        if self.channels.iter().any(|c| c == channel_name) {
            Ok(())
        } else {
            Err(Error::not_authorized(format!(
                "Action can not be triggered in provided channel '{}', please make sure \
                 that the sender is in the correct channel(s)",
                channel_name
            )))
        }
    }

    fn describe(&self, _bot: &BotContext) -> String {
        format!("message_from_channels({})", quote_join(&self.channels))
    }
}

/// Denies messages not sent from one of the named channels.
pub fn message_from_channels<I, S>(channels: I) -> Authorizer
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Authorizer::new(MessageFromChannels {
        channels: channels.into_iter().map(Into::into).collect(),
    })
}

struct AnyMustPass(Vec<Authorizer>);

#[async_trait]
impl Authorize for AnyMustPass {
    async fn authorize(&self, bot: &BotContext, message: &Message, args: Option<&Args>) -> Result<()> {
        let mut reasons = Vec::new();
        for authorizer in &self.0 {
            match authorizer.check(bot, message, args).await {
                Ok(()) => return Ok(()),
                Err(Error::NotAuthorized(reason)) => reasons.push(reason),
                Err(other) => return Err(other),
            }
        }
        if reasons.is_empty() {
            return Ok(());
        }
        let what = reasons
            .iter()
            .map(|r| format!("({})", r))
            .collect::<Vec<_>>()
            .join(" or ");
        Err(Error::NotAuthorized(what))
    }

    fn describe(&self, bot: &BotContext) -> String {
        let inner: Vec<String> = self.0.iter().map(|a| a.describe(bot)).collect();
        format!("any_must_pass({})", inner.join(", "))
    }
}

/// Passes when any policy passes.
pub fn any_must_pass(authorizers: impl IntoIterator<Item = Authorizer>) -> Authorizer {
    Authorizer::new(AnyMustPass(authorizers.into_iter().collect()))
}

struct AllMustPass(Vec<Authorizer>);

#[async_trait]
impl Authorize for AllMustPass {
    async fn authorize(&self, bot: &BotContext, message: &Message, args: Option<&Args>) -> Result<()> {
        for authorizer in &self.0 {
            authorizer.check(bot, message, args).await?;
        }
        Ok(())
    }

    fn describe(&self, bot: &BotContext) -> String {
        let inner: Vec<String> = self.0.iter().map(|a| a.describe(bot)).collect();
        format!("all_must_pass({})", inner.join(", "))
    }
}

/// Passes only when every policy passes; the first denial is returned.
pub fn all_must_pass(authorizers: impl IntoIterator<Item = Authorizer>) -> Authorizer {
    Authorizer::new(AllMustPass(authorizers.into_iter().collect()))
}
