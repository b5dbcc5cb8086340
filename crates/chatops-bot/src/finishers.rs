//! Turns dispatch outcomes into replies.

use chatops_core::{Attachment, Error, Message, ReplyOptions, Result};
use tracing::{debug, error, warn};

/// Longest diagnostic shown in a failure attachment.
pub const MAX_ISSUE_SIZE: usize = 4000;
/// Longest diagnostic used as the attachment fallback.
pub const MAX_FALLBACK_SIZE: usize = 200;

const FAILURE_COLOR: &str = "#FF0000";

/// Cut `issue` to the attachment and fallback limits, marking cuts with `...`.
pub fn chop(issue: &str) -> (String, String) {
    (chop_to(issue, MAX_ISSUE_SIZE), chop_to(issue, MAX_FALLBACK_SIZE))
}

fn chop_to(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn mention(message: &Message) -> String {
    let who = message
        .body
        .user_id
        .as_deref()
        .or(message.body.user_name.as_deref())
        .unwrap_or("unknown");
    format!("<@{}>", who)
}

/// Reply inside the thread the message belongs to, or start one.
fn in_context(message: &Message, threaded: bool) -> ReplyOptions {
    match &message.body.thread_ts {
        Some(ts) => ReplyOptions::in_thread(ts.clone()),
        None if threaded => ReplyOptions::threaded(),
        None => ReplyOptions::default(),
    }
}

/// Reply to `message` according to how its targeted dispatch ended.
pub async fn notify(message: &Message, outcome: Result<Option<String>>) {
    let sent = match outcome {
        Ok(Some(text)) if !text.is_empty() => message.reply_text(&text, ReplyOptions::threaded()).await,
        Ok(_) => Ok(()),
        Err(Error::NoFollowupHandlerFound) | Err(Error::Dying) => {
            debug!(kind = %message.raw_kind(), "Dropping unclaimed outcome");
            Ok(())
        }
        Err(Error::NoHandlerFound { suggestion }) => {
            let mut text = format!("Sorry {} but I don't know how to do that.", mention(message));
            if !suggestion.is_empty() {
                text.push_str(&format!(" Perhaps you meant `{}`?", suggestion));
            }
            message.reply_text(&text, in_context(message, false)).await
        }
        Err(Error::HandlerReportedIssues { handler, issues }) => {
            warn!(handler = %handler, issues = %issues, "Handler reported issues");
            let mut lines = Vec::new();
            if issues.is_empty() {
                lines.push("You seem to have gotten something wrong.".to_string());
            } else {
                lines.push("You seem to have gotten something wrong:".to_string());
                lines.push("```".to_string());
                lines.push(issues);
                lines.push("```".to_string());
            }
            message
                .reply_text(&lines.join("\n"), in_context(message, true))
                .await
        }
        Err(Error::NotAuthorized(reason)) => {
            warn!(kind = %message.raw_kind(), reason = %reason, "Message was not authorized");
            let text = format!("Sorry {}: {}", mention(message), reason);
            message.reply_text(&text, in_context(message, true)).await
        }
        Err(err) => {
            error!(kind = %message.raw_kind(), error = %err, "Processing message failed");
            notify_failure(message, &err).await
        }
    };
    if let Err(err) = sent {
        error!(error = %err, "Failed sending outcome reply");
    }
}

async fn notify_failure(message: &Message, err: &Error) -> Result<()> {
    let issue = format!("{:?}: {}", err.kind(), err);
    let (small, smaller) = chop(&issue);
    let attachment = Attachment {
        fallback: Some(smaller),
        text: Some(format!("```\n{}\n```", small)),
        color: Some(FAILURE_COLOR.to_string()),
        footer: Some("I broke.".to_string()),
        mrkdwn_in: vec!["text".to_string()],
        ..Default::default()
    };
    let text = format!("Oopsies, I had a problem handling `{}`.", message.body.text);
    let thread_ts = message.body.thread_ts.clone().or_else(|| message.body.ts.clone());
    let options = match thread_ts {
        Some(ts) => ReplyOptions::in_thread(ts),
        None => ReplyOptions::threaded(),
    };
    message.reply_attachments(Some(&text), &[attachment], options).await
}
