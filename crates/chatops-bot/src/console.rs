//! Line-oriented console transport.
//!
//! Every input line becomes a `telnet/message` directed at the bot. Lines
//! starting with `>` reply to the previous command and are dispatched as
//! followups; anything else is dispatched broadcast and targeted.

use crate::config::ConsoleConfig;
use crate::finishers;
use async_trait::async_trait;
use chatops_core::{
    Attachment, Channel, Dispatcher, Error, Headers, Message, MessageBody, Replier, ReplyOptions,
    Result, ShutdownState,
};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

pub const CONSOLE_KIND: &str = "telnet/message";

/// Something to print on the console.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleOutput {
    Line(String),
    Prompt(String),
}

/// Replier writing to the console output channel.
#[derive(Debug, Clone)]
pub struct ConsoleReplier {
    out: mpsc::UnboundedSender<ConsoleOutput>,
}

impl ConsoleReplier {
    pub fn new(out: mpsc::UnboundedSender<ConsoleOutput>) -> Self {
        Self { out }
    }

    fn send(&self, line: String) -> Result<()> {
        self.out
            .send(ConsoleOutput::Line(line))
            .map_err(|_| Error::Transport("console output closed".into()))
    }
}

fn decorate(body: &MessageBody, text: &str, options: &ReplyOptions) -> String {
    let mut line = String::new();
    if options.threaded {
        let ts = options
            .thread_ts
            .as_deref()
            .or(body.thread_ts.as_deref())
            .or(body.ts.as_deref());
        if let Some(ts) = ts {
            line.push_str(&format!("[{}] ", ts));
        }
    }
    if options.prefixed {
        if let Some(user) = &body.user_name {
            line.push_str(&format!("@{}: ", user));
        }
    }
    line.push_str(text);
    line
}

#[async_trait]
impl Replier for ConsoleReplier {
    async fn reply_text(&self, body: &MessageBody, text: &str, options: &ReplyOptions) -> Result<()> {
        self.send(decorate(body, text, options))
    }

    async fn reply_attachments(
        &self,
        body: &MessageBody,
        text: Option<&str>,
        attachments: &[Attachment],
        options: &ReplyOptions,
    ) -> Result<()> {
        let mut lines: Vec<String> = text.map(str::to_string).into_iter().collect();
        for attachment in attachments {
            lines.extend(attachment.pretext.clone());
            lines.extend(attachment.text.clone());
            lines.extend(attachment.footer.clone());
        }
        self.send(decorate(body, &lines.join("\n"), options))
    }
}

/// Lines read from `reader`, ending at EOF or the first read error.
pub fn lines<R>(reader: R) -> impl Stream<Item = io::Result<String>>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async_stream::stream! {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => yield Ok(line),
                Ok(None) => break,
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    }
}

/// Print console output to stdout until every sender is gone.
pub fn spawn_printer(mut rx: mpsc::UnboundedReceiver<ConsoleOutput>) -> JoinHandle<()> {
    tokio::spawn(async move {
        use std::io::Write;
        while let Some(output) = rx.recv().await {
            let mut stdout = io::stdout().lock();
            let written = match output {
                ConsoleOutput::Line(line) => writeln!(stdout, "{}", line),
                ConsoleOutput::Prompt(prompt) => write!(stdout, "{}", prompt),
            };
            if let Err(e) = written.and_then(|_| stdout.flush()) {
                error!("Console write error: {}", e);
                break;
            }
        }
    })
}

/// Turns console lines into dispatched messages.
pub struct Console {
    settings: ConsoleConfig,
    replier: Arc<ConsoleReplier>,
    counter: u64,
    last_command: Option<String>,
}

impl Console {
    pub fn new(settings: ConsoleConfig, out: mpsc::UnboundedSender<ConsoleOutput>) -> Self {
        Self {
            settings,
            replier: Arc::new(ConsoleReplier::new(out)),
            counter: 0,
            last_command: None,
        }
    }

    fn message(&mut self, text: &str, thread_ts: Option<String>) -> Message {
        self.counter += 1;
        let body = MessageBody {
            ts: Some(self.counter.to_string()),
            thread_ts,
            channel: Some(self.settings.channel_name.clone()),
            channel_name: Some(self.settings.channel_name.clone()),
            user_id: Some(self.settings.user_name.clone()),
            user_name: Some(self.settings.user_name.clone()),
            ..MessageBody::text(text)
        };
        Message::new(CONSOLE_KIND, body, self.replier.clone()).with_headers(Headers {
            to_me: true,
            ..Default::default()
        })
    }

    fn prompt(&self) {
        if self
            .replier
            .out
            .send(ConsoleOutput::Prompt(self.settings.prompt.clone()))
            .is_err()
        {
            warn!("Console output closed, prompt dropped");
        }
    }

    /// Dispatch one line; the handle finishes once every outcome was reported.
    pub fn handle_line(&mut self, dispatcher: &Dispatcher, line: &str) -> Option<JoinHandle<()>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(reply) = line.strip_prefix('>') {
            let Some(thread_ts) = self.last_command.clone() else {
                if let Err(e) = self.replier.send("Nothing to follow up on.".into()) {
                    warn!(error = %e, "Failed to print console reply");
                }
                return None;
            };
            let message = self.message(reply.trim(), Some(thread_ts));
            let followup = dispatcher.submit(message.clone(), Channel::Followup);
            return Some(tokio::spawn(async move {
                finishers::notify(&message, joined(followup).await).await;
            }));
        }

        let message = self.message(line, None);
        self.last_command = message.body.ts.clone();
        debug!(ts = ?message.body.ts, "Console command");
        let broadcast = dispatcher.submit(message.clone(), Channel::Broadcast);
        let targeted = dispatcher.submit(message.clone(), Channel::Targeted);
        Some(tokio::spawn(async move {
            finishers::notify(&message, joined(targeted).await).await;
            match joined(broadcast).await {
                Ok(_) | Err(Error::Dying) => {}
                Err(e) => warn!(error = %e, "Broadcast dispatch failed"),
            }
        }))
    }

    /// Feed lines until input ends or the shutdown signal is set.
    ///
    /// Returns the shutdown value to act on; end of input means `Dying`.
    pub async fn run<S>(&mut self, dispatcher: &Dispatcher, lines: &mut S) -> io::Result<ShutdownState>
    where
        S: Stream<Item = io::Result<String>> + Unpin,
    {
        let shutdown = dispatcher.bot().shutdown.clone();
        self.prompt();
        loop {
            tokio::select! {
                line = lines.next() => match line {
                    Some(Ok(line)) => {
                        self.handle_line(dispatcher, &line);
                        self.prompt();
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        info!("Console input closed");
                        return Ok(ShutdownState::Dying);
                    }
                },
                state = shutdown.wait_set() => return Ok(state),
            }
        }
    }
}

async fn joined(handle: JoinHandle<Result<Option<String>>>) -> Result<Option<String>> {
    handle
        .await
        .unwrap_or_else(|e| Err(anyhow::anyhow!("dispatch task failed: {}", e).into()))
}
