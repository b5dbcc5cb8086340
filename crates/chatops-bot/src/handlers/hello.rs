//! Hello command - greets whoever asks.

use super::chat_messages;
use async_trait::async_trait;
use chatops_core::{Args, Channel, Handler, HandlesWhat, Invocation, Requirements, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

const HELLOS: &[&str] = &[
    "Hallo",
    "Bonjour",
    "Guten tag",
    "Shalóm",
    "Konnichiwa",
    "Namastē",
    "Hola",
    "Nǐ hǎo",
];

pub struct HelloHandler {
    what: HandlesWhat,
    next: AtomicUsize,
}

impl HelloHandler {
    pub fn new() -> Self {
        Self {
            what: HandlesWhat::new(Channel::Targeted, chat_messages())
                .trigger("hello", false)
                .trigger("hi", false)
                .trigger("howdy", false),
            next: AtomicUsize::new(0),
        }
    }
}

impl Default for HelloHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for HelloHandler {
    fn name(&self) -> &str {
        "hello"
    }

    fn title(&self) -> &str {
        "Welcomes you to the future!"
    }

    fn handles_what(&self) -> &HandlesWhat {
        &self.what
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            periodic_config_path: Some("handlers.hello.periodics".into()),
            ..Default::default()
        }
    }

    async fn execute(&self, _invocation: &Invocation, _args: Args) -> Result<Option<String>> {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % HELLOS.len();
        Ok(Some(HELLOS[i].to_string()))
    }
}
