//! End-to-end tests driving the bot through its console transport.

mod common;

use chatops_bot::console::{Console, ConsoleOutput};
use chatops_core::message::NullReplier;
use chatops_core::{Channel, ShutdownState};
use common::Harness;
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_hello_is_answered() {
    let mut h = Harness::new("").await;
    h.say("hello").await;
    let lines = h.lines();
    assert!(lines.iter().any(|l| l == "[1] Hallo"), "got {:?}", lines);

    h.say("howdy").await;
    assert!(h.lines().iter().any(|l| l.ends_with("Bonjour")));
}

#[tokio::test]
async fn test_unknown_command_gets_suggestion() {
    let mut h = Harness::new("").await;
    h.say("stat").await;
    assert_eq!(
        h.lines(),
        vec!["Sorry <@operator> but I don't know how to do that. Perhaps you meant `stats`?"]
    );
}

#[tokio::test]
async fn test_seen_tracks_broadcast_traffic() {
    let mut h = Harness::new("").await;
    h.say("hello").await;
    h.say("seen operator").await;
    h.say("seen nobody").await;

    let lines = h.lines();
    assert!(lines.iter().any(|l| l.contains("I have seen `operator` ")));
    assert!(lines.iter().any(|l| l.ends_with("I have not seen `nobody`.")));
    assert!(h.app.seen.get("operator").unwrap().count >= 2);
}

#[tokio::test]
async fn test_seen_can_be_switched_off() {
    let h = Harness::new("[handlers.seen]\nenabled = false\n").await;
    assert!(h.app.registry.find("seen").is_none());
    assert!(h.app.registry.find("seen.recorder").is_none());
    assert!(h.app.registry.find("hello").is_some());
}

#[tokio::test]
async fn test_missing_argument_is_reported() {
    let mut h = Harness::new("").await;
    h.say("seen").await;
    let lines = h.lines();
    assert!(
        lines
            .iter()
            .any(|l| l.contains("You seem to have gotten something wrong:\n```")),
        "got {:?}",
        lines
    );
}

#[tokio::test]
async fn test_stats_after_runs() {
    let mut h = Harness::new("").await;
    h.say("hello").await;
    h.say("stats").await;
    let lines = h.lines();
    assert!(lines
        .iter()
        .any(|l| l.contains("`hello`: ran 1 times, failed 0 times")));
}

#[tokio::test]
async fn test_help_lists_and_details() {
    let mut h = Harness::new("").await;
    h.say("help hello").await;
    let lines = h.lines();
    assert!(lines
        .iter()
        .any(|l| l.contains("• Welcomes you to the future!") && l.contains("_Triggers:_")));

    h.say("help").await;
    let lines = h.lines();
    assert!(lines.iter().any(|l| l.contains("• Shows you what this bot can do.")));
    assert!(!lines.iter().any(|l| l.contains("seen.recorder")));

    h.say("help nope").await;
    assert!(h
        .lines()
        .iter()
        .any(|l| l.ends_with("Sorry I do not know of any trigger `nope` (pick another?)")));
}

#[tokio::test]
async fn test_restart_needs_sign_off() {
    let mut h = Harness::new("[dispatch]\nwait_check_delay = \"20ms\"\n").await;
    let restart = h.say_later("restart").unwrap();
    h.wait_for_state("SUSPENDED").await;
    assert!(h.lines().iter().any(|l| l.contains(
        "Awaiting sign-off from 1 members to confirm `restart` (self-confirms are not ok)."
    )));

    h.say("> yes").await;
    assert!(h
        .lines()
        .iter()
        .any(|l| l.ends_with("Please get another member to signoff on this restart.")));
    assert!(!h.app.bot.shutdown.is_set());

    h.say("> jfdi").await;
    restart.await.unwrap();
    assert!(h
        .lines()
        .iter()
        .any(|l| l.ends_with("Restart acknowledged. Be back in a bit!")));
    assert_eq!(h.app.bot.shutdown.value(), ShutdownState::Restarting);
}

#[tokio::test]
async fn test_shutdown_can_be_cancelled() {
    let mut h = Harness::new("").await;
    let shutdown = h.say_later("shutdown").unwrap();
    h.wait_for_state("SUSPENDED").await;
    h.say("> no").await;
    shutdown.await.unwrap();
    assert!(h.lines().iter().any(|l| l.ends_with("Ok, I will not shutdown.")));
    assert!(!h.app.bot.shutdown.is_set());
}

#[tokio::test]
async fn test_admin_channel_gates_lifecycle() {
    let mut h = Harness::new("[bot]\nadmin_channel = \"ops\"\n").await;
    h.say("restart").await;
    let lines = h.lines();
    assert!(
        lines
            .iter()
            .any(|l| l.starts_with("[1] Sorry <@operator>: Action can not be triggered in provided channel 'console'")),
        "got {:?}",
        lines
    );
    assert!(!h.app.bot.shutdown.is_set());
}

#[tokio::test]
async fn test_followup_without_command() {
    let mut h = Harness::new("").await;
    assert!(h.say_later("> yes").is_none());
    assert_eq!(h.lines(), vec!["Nothing to follow up on."]);
}

#[tokio::test]
async fn test_periodic_jobs_are_booked_and_runnable() {
    let h = Harness::new(
        r#"
        [bot]
        periodic_channel = "ops"

        [[handlers.hello.periodics]]
        period = "0 * * * *"
        "#,
    )
    .await;

    let jobs = h.app.jobs.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].handler, "hello");
    assert_eq!(jobs[0].channel, "ops");

    let message = jobs[0].message("p1", Arc::new(NullReplier));
    let out = h
        .app
        .dispatcher
        .submit(message, Channel::Targeted)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out.as_deref(), Some("Hallo"));
}

#[tokio::test]
async fn test_console_run_ends_with_input() {
    let h = Harness::new("").await;
    let (tx, _rx) = mpsc::unbounded_channel::<ConsoleOutput>();
    let mut console = Console::new(Default::default(), tx);
    let mut input = tokio_stream::iter(vec![Ok("hello".to_string())]);
    let state = console.run(&h.app.dispatcher, &mut input).await.unwrap();
    assert_eq!(state, ShutdownState::Dying);
}

#[tokio::test]
async fn test_console_survives_closed_output() {
    let h = Harness::new("").await;
    let (tx, rx) = mpsc::unbounded_channel::<ConsoleOutput>();
    drop(rx);
    let mut console = Console::new(Default::default(), tx);
    assert!(console.handle_line(&h.app.dispatcher, "> yes").is_none());

    let mut input = tokio_stream::iter(vec![Ok("> yes".to_string())]);
    let state = console.run(&h.app.dispatcher, &mut input).await.unwrap();
    assert_eq!(state, ShutdownState::Dying);
}

#[tokio::test]
async fn test_console_run_stops_on_shutdown() {
    let h = Harness::new("").await;
    let (tx, _rx) = mpsc::unbounded_channel::<ConsoleOutput>();
    let mut console = Console::new(Default::default(), tx);
    tokio_test::assert_ok!(h.app.bot.shutdown.set(ShutdownState::Restarting));
    let mut input = tokio_stream::pending::<std::io::Result<String>>();
    let state = console.run(&h.app.dispatcher, &mut input).await.unwrap();
    assert_eq!(state, ShutdownState::Restarting);
    assert!(h.app.drain(std::time::Duration::from_secs(1)).await);
}
