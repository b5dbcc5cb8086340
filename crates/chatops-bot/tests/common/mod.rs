//! Common test utilities for integration tests.

#![allow(dead_code)]

use chatops_bot::console::{Console, ConsoleOutput};
use chatops_bot::{App, Config};
use chatops_core::Shutdown;
use std::time::Duration;
use tokio::sync::mpsc;

/// A built bot plus a console whose output is captured.
pub struct Harness {
    pub app: App,
    pub console: Console,
    pub output: mpsc::UnboundedReceiver<ConsoleOutput>,
}

impl Harness {
    pub async fn new(toml: &str) -> Self {
        let config = Config::from_toml(toml).unwrap();
        let settings = config.console.clone();
        let app = App::build(config, Shutdown::new()).await.unwrap();
        let (tx, output) = mpsc::unbounded_channel();
        Self {
            app,
            console: Console::new(settings, tx),
            output,
        }
    }

    /// Dispatch a line and wait until its outcome was reported.
    pub async fn say(&mut self, line: &str) {
        if let Some(handle) = self.console.handle_line(&self.app.dispatcher, line) {
            handle.await.unwrap();
        }
    }

    /// Dispatch a line without waiting for it.
    pub fn say_later(&mut self, line: &str) -> Option<tokio::task::JoinHandle<()>> {
        self.console.handle_line(&self.app.dispatcher, line)
    }

    /// Printed lines so far.
    pub fn lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(output) = self.output.try_recv() {
            if let ConsoleOutput::Line(line) = output {
                lines.push(line);
            }
        }
        lines
    }

    /// Wait for an active invocation to reach `state`.
    pub async fn wait_for_state(&self, state: &str) {
        for _ in 0..200 {
            if self
                .app
                .dispatcher
                .active()
                .iter()
                .any(|r| r.state.as_deref() == Some(state))
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no active invocation reached {}", state);
    }
}
