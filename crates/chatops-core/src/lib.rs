//! Dispatch core for a chat-operations bot.
//!
//! Messages arrive classified by [`Channel`]; the [`Dispatcher`] walks the
//! [`HandlerRegistry`] in trigger-specificity order and runs matching
//! handlers through the [`Invocation`] state machine.

pub mod args;
pub mod authorizers;
pub mod bot;
pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod followers;
pub mod handler;
pub mod invocation;
pub mod matchers;
pub mod message;
pub mod periodics;
pub mod registry;
pub mod schema;
pub mod shutdown;
pub mod stats;
pub mod suggest;
pub mod trigger;

pub use args::{Args, ArgsSpec};
pub use authorizers::Authorizer;
pub use bot::{BotContext, Clients, GroupDirectory, Secrets};
pub use channel::Channel;
pub use dispatcher::{DispatchSettings, Dispatcher};
pub use error::{Error, ErrorKind, Result};
pub use followers::Follower;
pub use handler::{Handler, HandlerMatch, HandlesWhat, Requirements};
pub use invocation::{Invocation, InvocationRecord, Transition, WaitOptions};
pub use matchers::{ChannelMatcher, MessageMatcher};
pub use message::{Attachment, Headers, Message, MessageBody, Replier, ReplyOptions};
pub use registry::{HandlerProvider, HandlerRegistry};
pub use shutdown::{Shutdown, ShutdownState};
pub use stats::{HandlerStats, StatsStore};
pub use trigger::Trigger;
