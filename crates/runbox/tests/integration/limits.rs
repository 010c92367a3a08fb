use std::sync::Arc;
use std::time::{Duration, Instant};

use runbox::{ExecutionRequest, RunError, TIMEOUT_EXIT_CODE, TRUNCATION_MARKER};
use tokio_util::sync::CancellationToken;

use super::{ad_hoc_runner, fixture_source};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_infinite_loop_times_out() {
    let (_, runner) = ad_hoc_runner();
    let request = ExecutionRequest::new("python", fixture_source("infinite_loop.py"))
        .with_time_limit(Duration::from_secs(1));

    let started = Instant::now();
    let result = runner
        .run(&request, &CancellationToken::new())
        .await
        .expect("Timeouts are results, not errors");
    let elapsed = started.elapsed();

    assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
    assert!(result.timed_out);
    assert!(result.stderr.ends_with("Execution timed out."));
    assert!(result.time_used >= Duration::from_secs(1));
    // Container creation and removal are included in the bound
    assert!(elapsed < Duration::from_secs(5), "run took {elapsed:?}");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_large_output_truncated() {
    let (_, runner) = ad_hoc_runner();
    let request = ExecutionRequest::new("python", fixture_source("large_output.py"));

    let result = runner
        .run(&request, &CancellationToken::new())
        .await
        .expect("Execution failed");

    assert_eq!(result.stdout.len(), 10 * 1024 + TRUNCATION_MARKER.len());
    assert!(result.stdout.ends_with(TRUNCATION_MARKER));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_small_output_unchanged() {
    let (_, runner) = ad_hoc_runner();
    let request = ExecutionRequest::new("python", fixture_source("small_output.py"));

    let result = runner
        .run(&request, &CancellationToken::new())
        .await
        .expect("Execution failed");

    assert_eq!(result.stdout, "x".repeat(1024));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_network_is_disabled() {
    let (_, runner) = ad_hoc_runner();
    let request = ExecutionRequest::new("python", fixture_source("network.py"));

    let result = runner
        .run(&request, &CancellationToken::new())
        .await
        .expect("Execution failed");

    assert_eq!(result.stdout, "unreachable\n");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_cancel_mid_run() {
    let (_, runner) = ad_hoc_runner();
    let runner = Arc::new(runner);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let runner = Arc::clone(&runner);
        let cancel = cancel.clone();
        async move {
            let request = ExecutionRequest::new("python", fixture_source("infinite_loop.py"))
                .with_time_limit(Duration::from_secs(30));
            runner.run(&request, &cancel).await
        }
    });

    tokio::time::sleep(Duration::from_secs(3)).await;
    let cancelled_at = Instant::now();
    cancel.cancel();
    let result = handle.await.expect("Run task panicked");

    assert!(matches!(result, Err(RunError::Cancelled)));
    assert!(cancelled_at.elapsed() < Duration::from_secs(10));
}
