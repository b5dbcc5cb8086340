//! Message envelope handed to handlers, and the reply contract transports implement.

use crate::args::Args;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Routing and trust flags attached to a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Headers {
    /// The transport already validated the message.
    pub validated: bool,
    /// The message was directed at the bot.
    pub to_me: bool,
    /// Authorizers should run (cleared for internal messages).
    pub check_auth: bool,
    /// Pre-built arguments bypassing trigger text.
    pub explicit_args: Option<Args>,
    /// Only the handler with this name may match.
    pub target_handler: Option<String>,
    /// The message was synthesised inside the bot.
    pub internal: bool,
}

impl Default for Headers {
    fn default() -> Self {
        Self {
            validated: false,
            to_me: false,
            check_auth: true,
            explicit_args: None,
            target_handler: None,
            internal: false,
        }
    }
}

/// Transport payload of a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub text: String,
    /// Text with links stripped, preferred for trigger matching when present.
    #[serde(default)]
    pub text_no_links: Option<String>,
    /// Transport timestamp identifying the message.
    #[serde(default)]
    pub ts: Option<String>,
    /// Timestamp of the message this one replies to.
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Text used for trigger matching.
    pub fn match_text(&self) -> &str {
        self.text_no_links.as_deref().unwrap_or(&self.text)
    }
}

/// How a reply should be posted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyOptions {
    /// Post in the message's thread.
    pub threaded: bool,
    /// Prefix the reply with a mention of the sender.
    pub prefixed: bool,
    /// Explicit thread to post into.
    pub thread_ts: Option<String>,
}

impl ReplyOptions {
    pub fn threaded() -> Self {
        Self {
            threaded: true,
            ..Default::default()
        }
    }

    pub fn in_thread(thread_ts: impl Into<String>) -> Self {
        Self {
            threaded: true,
            thread_ts: Some(thread_ts.into()),
            ..Default::default()
        }
    }

    pub fn prefixed(mut self) -> Self {
        self.prefixed = true;
        self
    }
}

/// Rich reply attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mrkdwn_in: Vec<String>,
}

/// Progress indicator created by a transport.
#[async_trait]
pub trait ProgressBar: Send {
    async fn update(&mut self, done: u64) -> Result<()>;
}

/// Reply operations supplied by a transport.
#[async_trait]
pub trait Replier: Send + Sync {
    async fn reply_text(&self, body: &MessageBody, text: &str, options: &ReplyOptions) -> Result<()>;

    async fn reply_attachments(
        &self,
        body: &MessageBody,
        text: Option<&str>,
        attachments: &[Attachment],
        options: &ReplyOptions,
    ) -> Result<()>;

    async fn progress_bar(&self, _body: &MessageBody, _total: u64) -> Result<Box<dyn ProgressBar>> {
        Err(Error::Unavailable(
            "progress bars are not supported by this transport".into(),
        ))
    }
}

/// Replier that drops everything, for internally synthesised messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReplier;

#[async_trait]
impl Replier for NullReplier {
    async fn reply_text(&self, _body: &MessageBody, text: &str, _options: &ReplyOptions) -> Result<()> {
        debug!(len = text.len(), "Dropping reply to internal message");
        Ok(())
    }

    async fn reply_attachments(
        &self,
        _body: &MessageBody,
        _text: Option<&str>,
        attachments: &[Attachment],
        _options: &ReplyOptions,
    ) -> Result<()> {
        debug!(count = attachments.len(), "Dropping attachments to internal message");
        Ok(())
    }
}

/// Inbound message: kind and sub-kind, headers, body and reply operations.
#[derive(Clone)]
pub struct Message {
    pub kind: String,
    pub sub_kind: String,
    pub headers: Headers,
    pub body: MessageBody,
    replier: Arc<dyn Replier>,
}

impl Message {
    /// Create a message from a raw `kind/sub_kind` string.
    pub fn new(raw_kind: &str, body: MessageBody, replier: Arc<dyn Replier>) -> Self {
        let (kind, sub_kind) = match raw_kind.split_once('/') {
            Some((kind, sub_kind)) => (kind, sub_kind),
            None => (raw_kind, ""),
        };
        Self {
            kind: kind.to_string(),
            sub_kind: sub_kind.to_string(),
            headers: Headers::default(),
            body,
            replier,
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn raw_kind(&self) -> String {
        format!("{}/{}", self.kind, self.sub_kind)
    }

    pub fn replier(&self) -> &Arc<dyn Replier> {
        &self.replier
    }

    /// Return a copy with the message text rewritten through user aliases.
    ///
    /// An alias applies when it equals the leading word(s) of the text.
    pub fn rewrite(&self, aliases: &[(String, String)]) -> Message {
        let mut rewritten = self.clone();
        for (alias, replacement) in aliases {
            if let Some(rest) = strip_word_prefix(&self.body.text, alias) {
                rewritten.body.text = format!("{}{}", replacement, rest);
                rewritten.body.text_no_links = None;
                break;
            }
        }
        rewritten
    }

    pub async fn reply_text(&self, text: &str, options: ReplyOptions) -> Result<()> {
        self.replier.reply_text(&self.body, text, &options).await
    }

    pub async fn reply_attachments(
        &self,
        text: Option<&str>,
        attachments: &[Attachment],
        options: ReplyOptions,
    ) -> Result<()> {
        self.replier
            .reply_attachments(&self.body, text, attachments, &options)
            .await
    }

    pub async fn progress_bar(&self, total: u64) -> Result<Box<dyn ProgressBar>> {
        self.replier.progress_bar(&self.body, total).await
    }
}

fn strip_word_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let trimmed = text.trim_start();
    let rest = trimmed.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind)
            .field("sub_kind", &self.sub_kind)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish()
    }
}
