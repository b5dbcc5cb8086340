//! Help command - shows what the bot can do.

use super::chat_messages;
use async_trait::async_trait;
use chatops_core::{
    Args, ArgsSpec, Attachment, Channel, Error, Handler, HandlerRegistry, HandlesWhat, Invocation,
    ReplyOptions, Result,
};
use std::sync::{Arc, OnceLock};

/// Filled with the registry once it is built; help needs the final handler list.
pub type RegistrySlot = Arc<OnceLock<Arc<HandlerRegistry>>>;

pub struct HelpHandler {
    what: HandlesWhat,
    registry: RegistrySlot,
}

impl HelpHandler {
    pub fn new(registry: RegistrySlot) -> Self {
        Self {
            what: HandlesWhat::new(Channel::Targeted, chat_messages())
                .trigger("help", true)
                .args(
                    ArgsSpec::new(["trigger"])
                        .default_value("trigger", "")
                        .help("trigger", "optional target trigger to get help on"),
                ),
            registry,
        }
    }
}

fn help_attachment(handler: &dyn Handler, invocation: &Invocation) -> Attachment {
    let (title, how_to) = handler.help(invocation.bot());
    Attachment {
        pretext: Some(format!("• {}", title)),
        text: Some(how_to.join("\n")),
        mrkdwn_in: vec!["pretext".into(), "text".into()],
        ..Default::default()
    }
}

#[async_trait]
impl Handler for HelpHandler {
    fn name(&self) -> &str {
        "help"
    }

    fn title(&self) -> &str {
        "Shows you what this bot can do."
    }

    fn handles_what(&self) -> &HandlesWhat {
        &self.what
    }

    async fn execute(&self, invocation: &Invocation, args: Args) -> Result<Option<String>> {
        let registry = self
            .registry
            .get()
            .ok_or_else(|| Error::Unavailable("handler registry is not ready".into()))?;
        let wanted = args.get_str("trigger").unwrap_or_default().trim();

        let documented = registry.handlers().iter().filter(|h| h.has_help());
        let attachments: Vec<Attachment> = if wanted.is_empty() {
            documented
                .map(|h| help_attachment(h.as_ref(), invocation))
                .collect()
        } else {
            let target = documented
                .into_iter()
                .find(|h| h.handles_what().triggers.iter().any(|t| t.matches(wanted).is_some()));
            match target {
                Some(handler) => vec![help_attachment(handler.as_ref(), invocation)],
                None => {
                    return Ok(Some(format!(
                        "Sorry I do not know of any trigger `{}` (pick another?)",
                        wanted
                    )))
                }
            }
        };

        if !attachments.is_empty() {
            let options = match &invocation.message().body.ts {
                Some(ts) => ReplyOptions::in_thread(ts.clone()),
                None => ReplyOptions::threaded(),
            };
            invocation
                .message()
                .reply_attachments(None, &attachments, options)
                .await?;
        }
        Ok(None)
    }
}
