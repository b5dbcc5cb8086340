//! Routing channels a message can be dispatched on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel a message is dispatched on.
///
/// The channel travels with each dispatch call, never with the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Every matching handler runs; a failing handler does not stop the others.
    Broadcast,
    /// Only a still-active handler started from the same thread may receive it.
    Followup,
    /// The first matching handler runs and its outcome is returned.
    Targeted,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Broadcast, Channel::Followup, Channel::Targeted];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Broadcast => "broadcast",
            Channel::Followup => "followup",
            Channel::Targeted => "targeted",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
