// tests/process_runner.rs
#![cfg(unix)]

mod common;
use crate::common::{init_tracing, runner, with_timeout};

use std::error::Error;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use mqtt_executor::config::CommandConfig;
use mqtt_executor::exec::RunOutcome;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn successful_command_returns_trimmed_output() -> TestResult {
    init_tracing();
    let (registry, runner) = runner();

    let outcome = runner
        .run(&CommandConfig::new("echo", &["  hello  "]), &CancellationToken::new())
        .await;

    assert_eq!(outcome, RunOutcome::Success("hello".to_string()));
    assert_eq!(registry.open_executions(), 0);
    Ok(())
}

#[tokio::test]
async fn true_produces_empty_output() -> TestResult {
    let (_registry, runner) = runner();

    let outcome = runner
        .run(&CommandConfig::new("true", &[]), &CancellationToken::new())
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.output(), "");
    Ok(())
}

#[tokio::test]
async fn stdout_and_stderr_are_combined() -> TestResult {
    let (_registry, runner) = runner();

    let command = CommandConfig::new("sh", &["-c", "echo out; echo err >&2"]);
    let outcome = runner.run(&command, &CancellationToken::new()).await;

    assert!(outcome.is_success());
    assert!(outcome.output().contains("out"));
    assert!(outcome.output().contains("err"));
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_is_a_failure_with_output() -> TestResult {
    let (_registry, runner) = runner();

    let command = CommandConfig::new("sh", &["-c", "echo broken; exit 3"]);
    let outcome = runner.run(&command, &CancellationToken::new()).await;

    assert_eq!(
        outcome,
        RunOutcome::Failed {
            output: "broken".to_string(),
            reason: "exit status 3".to_string(),
        }
    );
    Ok(())
}

#[tokio::test]
async fn missing_program_is_a_launch_failure() -> TestResult {
    let (registry, runner) = runner();

    let command = CommandConfig::new("/definitely/not/a/program", &[]);
    let outcome = runner.run(&command, &CancellationToken::new()).await;

    match outcome {
        RunOutcome::Failed { output, reason } => {
            assert!(output.is_empty());
            assert!(reason.starts_with("failed to launch"), "reason: {reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(registry.open_executions(), 0);
    Ok(())
}

#[tokio::test]
async fn cancelling_scope_kills_the_process() -> TestResult {
    init_tracing();
    let (registry, runner) = runner();
    let scope = CancellationToken::new();

    let canceller = {
        let scope = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            scope.cancel();
        })
    };

    let started = Instant::now();
    let outcome = with_timeout(runner.run(&CommandConfig::new("sleep", &["30"]), &scope)).await;
    canceller.await?;

    assert!(outcome.is_cancelled(), "got {outcome:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(registry.open_executions(), 0);
    Ok(())
}

#[tokio::test]
async fn cancelled_before_start_never_launches() -> TestResult {
    let (_registry, runner) = runner();
    let scope = CancellationToken::new();
    scope.cancel();

    // Would fail with a launch error if it were actually started.
    let command = CommandConfig::new("/definitely/not/a/program", &[]);
    let outcome = runner.run(&command, &scope).await;

    assert_eq!(outcome, RunOutcome::Cancelled(String::new()));
    Ok(())
}

#[tokio::test]
async fn closed_registry_refuses_as_cancelled() -> TestResult {
    let (registry, runner) = runner();
    registry.close_all(Duration::from_secs(1)).await?;

    let outcome = runner
        .run(&CommandConfig::new("echo", &["late"]), &CancellationToken::new())
        .await;

    assert!(outcome.is_cancelled());
    Ok(())
}

#[tokio::test]
async fn registry_drain_interrupts_running_command() -> TestResult {
    init_tracing();
    let (registry, runner) = runner();

    let run = tokio::spawn(async move {
        runner
            .run(&CommandConfig::new("sleep", &["30"]), &CancellationToken::new())
            .await
    });

    common::wait_until("command registered", || registry.open_executions() == 1).await;
    registry.close_all(Duration::from_secs(5)).await?;

    let outcome = run.await?;
    assert!(outcome.is_cancelled(), "got {outcome:?}");
    Ok(())
}
