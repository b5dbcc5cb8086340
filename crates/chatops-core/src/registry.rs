//! Handler registry: enablement, conflict checks and specificity ordering.

use crate::bot::BotContext;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::periodics::Scheduler;
use crate::trigger::Trigger;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Source of handlers, resolved once at startup.
pub trait HandlerProvider: Send + Sync {
    fn handlers(&self) -> Vec<Arc<dyn Handler>>;
}

impl HandlerProvider for Vec<Arc<dyn Handler>> {
    fn handlers(&self) -> Vec<Arc<dyn Handler>> {
        self.clone()
    }
}

/// Fail when two handlers declare an equal trigger or share a name.
pub fn check_conflicts(handlers: &[Arc<dyn Handler>]) -> Result<()> {
    let mut names = HashSet::new();
    let mut owners: HashMap<&Trigger, &str> = HashMap::new();
    for handler in handlers {
        if !names.insert(handler.name()) {
            return Err(Error::DuplicateHandler(handler.name().to_string()));
        }
        for trigger in &handler.handles_what().triggers {
            if let Some(existing) = owners.insert(trigger, handler.name()) {
                return Err(Error::DuplicateTrigger {
                    trigger: trigger.text().to_string(),
                    existing: existing.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Order handlers so that longer triggers are tried before their prefixes.
///
/// Handlers without triggers follow, in their original order.
pub fn sort_handlers(handlers: &[Arc<dyn Handler>]) -> Result<Vec<Arc<dyn Handler>>> {
    check_conflicts(handlers)?;

    let mut triggers: Vec<(&Trigger, usize)> = Vec::new();
    let mut untriggered = Vec::new();
    for (i, handler) in handlers.iter().enumerate() {
        let declared = &handler.handles_what().triggers;
        if declared.is_empty() {
            untriggered.push(i);
        }
        triggers.extend(declared.iter().map(|t| (t, i)));
    }
    triggers.sort_by(|a, b| {
        a.0.text()
            .cmp(b.0.text())
            .then(a.0.takes_args().cmp(&b.0.takes_args()))
    });

    let mut ordered: Vec<(&Trigger, usize)> = Vec::with_capacity(triggers.len());
    for entry in triggers {
        let mut idx = ordered.len();
        while idx > 0 && entry.0.text().starts_with(ordered[idx - 1].0.text()) {
            idx -= 1;
        }
        ordered.insert(idx, entry);
    }

    let mut seen = HashSet::new();
    let mut sorted = Vec::with_capacity(handlers.len());
    for (_, i) in ordered {
        if seen.insert(i) {
            sorted.push(handlers[i].clone());
        }
    }
    sorted.extend(untriggered.into_iter().map(|i| handlers[i].clone()));
    Ok(sorted)
}

/// The enabled handlers, in dispatch order. Read-only after build.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Check conflicts, drop disabled handlers, sort, run setup and
    /// allocate each handler's stats.
    pub async fn build(bot: &BotContext, provider: &dyn HandlerProvider) -> Result<Self> {
        let provided = provider.handlers();
        check_conflicts(&provided)?;

        let enabled: Vec<Arc<dyn Handler>> = provided
            .into_iter()
            .filter(|h| h.is_enabled(bot))
            .collect();
        let handlers = sort_handlers(&enabled)?;

        for handler in &handlers {
            handler.setup(bot).await?;
            bot.stats.register(handler.name());
            debug!(handler = %handler.name(), "Handler registered");
        }
        info!(count = handlers.len(), "Handler registry built");
        Ok(Self { handlers })
    }

    pub fn handlers(&self) -> &[Arc<dyn Handler>] {
        &self.handlers
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.iter().find(|h| h.name() == name)
    }

    /// Handler owning a trigger with the given text.
    pub fn find_by_trigger(&self, text: &str) -> Option<&Arc<dyn Handler>> {
        let text = crate::trigger::clean_text(text);
        self.handlers
            .iter()
            .find(|h| h.handles_what().triggers.iter().any(|t| t.text() == text))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn insert_periodics(&self, bot: &BotContext, scheduler: &mut dyn Scheduler) -> Result<()> {
        for handler in &self.handlers {
            handler.insert_periodics(bot, scheduler)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Args;
    use crate::channel::Channel;
    use crate::handler::{HandlesWhat, Requirements};
    use crate::invocation::Invocation;
    use crate::matchers::MessageMatcher;
    use async_trait::async_trait;
    use serde_json::json;

    struct Fake {
        name: String,
        what: HandlesWhat,
        requirements: Requirements,
    }

    #[async_trait]
    impl Handler for Fake {
        fn name(&self) -> &str {
            &self.name
        }

        fn handles_what(&self) -> &HandlesWhat {
            &self.what
        }

        fn requirements(&self) -> Requirements {
            self.requirements.clone()
        }

        async fn execute(&self, _: &Invocation, _: Args) -> crate::Result<Option<String>> {
            Ok(None)
        }
    }

    fn fake(name: &str, triggers: &[(&str, bool)]) -> Arc<dyn Handler> {
        let mut what = HandlesWhat::new(Channel::Targeted, MessageMatcher::slack(&[]));
        for (text, takes_args) in triggers {
            what = what.trigger(text, *takes_args);
        }
        Arc::new(Fake {
            name: name.to_string(),
            what,
            requirements: Requirements::default(),
        })
    }

    fn names(handlers: &[Arc<dyn Handler>]) -> Vec<&str> {
        handlers.iter().map(|h| h.name()).collect()
    }

    #[test]
    fn test_longer_triggers_first() {
        let handlers = vec![
            fake("passive", &[]),
            fake("jenkins", &[("jenkins", true)]),
            fake("watch", &[("jenkins watch", true)]),
            fake("list", &[("jenkins list", false)]),
            fake("watch_all", &[("jenkins watch all", true)]),
            fake("hello", &[("hello", false)]),
        ];
        let sorted = sort_handlers(&handlers).unwrap();
        assert_eq!(
            names(&sorted),
            vec!["hello", "list", "watch_all", "watch", "jenkins", "passive"]
        );
    }

    #[test]
    fn test_takes_args_distinguishes_triggers() {
        let handlers = vec![
            fake("a", &[("status", false)]),
            fake("b", &[("status", true)]),
        ];
        assert!(sort_handlers(&handlers).is_ok());
    }

    #[test]
    fn test_duplicate_trigger_is_fatal() {
        let handlers = vec![
            fake("a", &[("jenkins watch", true)]),
            fake("b", &[("Jenkins   Watch", true)]),
        ];
        match sort_handlers(&handlers) {
            Err(Error::DuplicateTrigger { trigger, existing }) => {
                assert_eq!(trigger, "jenkins watch");
                assert_eq!(existing, "a");
            }
            other => panic!("unexpected: {:?}", other.map(|h| h.len())),
        }
    }

    #[test]
    fn test_duplicate_name_is_fatal() {
        let handlers = vec![fake("a", &[("x", false)]), fake("a", &[("y", false)])];
        assert!(matches!(
            sort_handlers(&handlers),
            Err(Error::DuplicateHandler(_))
        ));
    }

    #[tokio::test]
    async fn test_build_filters_disabled_and_registers_stats() {
        let disabled: Arc<dyn Handler> = Arc::new(Fake {
            name: "needs_jira".into(),
            what: HandlesWhat::new(Channel::Targeted, MessageMatcher::slack(&[])).trigger("jira", true),
            requirements: Requirements {
                required_clients: vec!["jira".into()],
                ..Default::default()
            },
        });
        let provided: Vec<Arc<dyn Handler>> = vec![fake("hello", &[("hello", false)]), disabled];
        let bot = BotContext::new("bot", json!({}));
        let registry = HandlerRegistry::build(&bot, &provided).await.unwrap();

        assert_eq!(names(registry.handlers()), vec!["hello"]);
        assert!(registry.find("needs_jira").is_none());
        assert!(registry.find_by_trigger("HELLO").is_some());
        assert!(bot.stats.get("hello").is_some());
        assert!(bot.stats.get("needs_jira").is_none());
    }

    #[tokio::test]
    async fn test_build_checks_disabled_handlers_for_conflicts() {
        let disabled: Arc<dyn Handler> = Arc::new(Fake {
            name: "other".into(),
            what: HandlesWhat::new(Channel::Targeted, MessageMatcher::slack(&[])).trigger("hello", false),
            requirements: Requirements {
                required_clients: vec!["missing".into()],
                ..Default::default()
            },
        });
        let provided: Vec<Arc<dyn Handler>> = vec![fake("hello", &[("hello", false)]), disabled];
        let bot = BotContext::new("bot", json!({}));
        assert!(HandlerRegistry::build(&bot, &provided).await.is_err());
    }
}
