//! Channel and message predicates used by handlers to declare what they handle.

use crate::channel::Channel;
use crate::message::Message;

/// Predicate over the dispatch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMatcher {
    Nothing,
    Anything,
    Only(Channel),
    OneOf(Vec<Channel>),
}

impl ChannelMatcher {
    pub fn matches(&self, channel: Channel) -> bool {
        match self {
            ChannelMatcher::Nothing => false,
            ChannelMatcher::Anything => true,
            ChannelMatcher::Only(wanted) => *wanted == channel,
            ChannelMatcher::OneOf(wanted) => wanted.contains(&channel),
        }
    }
}

impl From<Channel> for ChannelMatcher {
    fn from(channel: Channel) -> Self {
        ChannelMatcher::Only(channel)
    }
}

/// Predicate over a message's kind, sub-kind and routing headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageMatcher {
    Nothing,
    Anything,
    Kind {
        kind: String,
        sub_components: Vec<String>,
    },
    Or(Vec<MessageMatcher>),
}

impl MessageMatcher {
    /// Match `kind` messages whose sub-kind starts with `sub_components`.
    pub fn kind(kind: &str, sub_components: &[&str]) -> Self {
        MessageMatcher::Kind {
            kind: kind.to_string(),
            sub_components: sub_components.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn slack(sub_components: &[&str]) -> Self {
        Self::kind("slack", sub_components)
    }

    pub fn telnet(sub_components: &[&str]) -> Self {
        Self::kind("telnet", sub_components)
    }

    pub fn jira(sub_components: &[&str]) -> Self {
        Self::kind("jira", sub_components)
    }

    pub fn github(sub_components: &[&str]) -> Self {
        Self::kind("github", sub_components)
    }

    pub fn or(matchers: impl IntoIterator<Item = MessageMatcher>) -> Self {
        MessageMatcher::Or(matchers.into_iter().collect())
    }

    /// Test `message` on behalf of the handler named `handler_name`.
    ///
    /// With `only_to_me` set, messages not directed at the bot are
    /// rejected. A target handler header naming a different handler
    /// always rejects.
    pub fn matches(&self, message: &Message, handler_name: &str, only_to_me: bool) -> bool {
        match self {
            MessageMatcher::Nothing => false,
            MessageMatcher::Anything => true,
            MessageMatcher::Kind {
                kind,
                sub_components,
            } => {
                if &message.kind != kind {
                    return false;
                }
                let mut message_components = message
                    .sub_kind
                    .split(['/', '.'])
                    .filter(|c| !c.is_empty());
                for wanted in sub_components {
                    match message_components.next() {
                        Some(got) if got == wanted => {}
                        _ => return false,
                    }
                }
                if only_to_me && !message.headers.to_me {
                    return false;
                }
                match &message.headers.target_handler {
                    Some(target) => target == handler_name,
                    None => true,
                }
            }
            MessageMatcher::Or(matchers) => matchers
                .iter()
                .any(|m| m.matches(message, handler_name, only_to_me)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Headers, MessageBody, NullReplier};
    use std::sync::Arc;

    fn message(raw_kind: &str, to_me: bool) -> Message {
        Message::new(raw_kind, MessageBody::text("hi"), Arc::new(NullReplier)).with_headers(
            Headers {
                to_me,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_channel_matchers() {
        assert!(ChannelMatcher::from(Channel::Targeted).matches(Channel::Targeted));
        assert!(!ChannelMatcher::Only(Channel::Targeted).matches(Channel::Broadcast));
        assert!(ChannelMatcher::OneOf(vec![Channel::Broadcast, Channel::Followup])
            .matches(Channel::Followup));
        assert!(ChannelMatcher::Anything.matches(Channel::Broadcast));
        assert!(!ChannelMatcher::Nothing.matches(Channel::Broadcast));
    }

    #[test]
    fn test_kind_and_sub_components() {
        let matcher = MessageMatcher::jira(&["issue", "created"]);
        assert!(matcher.matches(&message("jira/issue/created", true), "h", true));
        assert!(matcher.matches(&message("jira/issue.created", true), "h", true));
        assert!(matcher.matches(&message("jira/issue/created/extra", true), "h", true));
        assert!(!matcher.matches(&message("jira/issue/updated", true), "h", true));
        assert!(!matcher.matches(&message("jira/issue", true), "h", true));
        assert!(!matcher.matches(&message("slack/issue/created", true), "h", true));
    }

    #[test]
    fn test_only_to_me() {
        let matcher = MessageMatcher::slack(&[]);
        let m = message("slack/message", false);
        assert!(!matcher.matches(&m, "h", true));
        assert!(matcher.matches(&m, "h", false));
    }

    #[test]
    fn test_target_handler_header() {
        let matcher = MessageMatcher::slack(&[]);
        let mut m = message("slack/message", true);
        m.headers.target_handler = Some("jenkins.watch".into());
        assert!(matcher.matches(&m, "jenkins.watch", true));
        assert!(!matcher.matches(&m, "hello", true));
    }

    #[test]
    fn test_or() {
        let matcher = MessageMatcher::or([MessageMatcher::slack(&[]), MessageMatcher::telnet(&[])]);
        assert!(matcher.matches(&message("telnet/message", true), "h", true));
        assert!(!matcher.matches(&message("jira/issue", true), "h", true));
        assert!(!MessageMatcher::Nothing.matches(&message("slack/message", true), "h", true));
        assert!(MessageMatcher::Anything.matches(&message("jira/x", false), "h", true));
    }
}
