use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use runbox::{Config, ExecutionRequest, PoolManager, Runner};
use tokio_util::sync::CancellationToken;

use super::{fixture_source, test_engine};

fn python_only(pool_size: usize) -> Config {
    let mut config = Config::default();
    config.languages.retain(|id, _| id == "python");
    config.pool.size = pool_size;
    config
}

async fn wait_until_full(pools: &PoolManager<runbox::DockerEngine>) {
    let pool = pools.pool("python").expect("python pool missing");
    for _ in 0..600 {
        if pool.is_full() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("warm pool never filled");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_pool_fills_and_shuts_down() {
    let engine = test_engine();
    let pools = PoolManager::start(Arc::clone(&engine), &python_only(2));

    wait_until_full(&pools).await;
    assert_eq!(pools.pool("python").unwrap().len(), 2);

    pools.shutdown().await;
    assert!(pools.pool("python").unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_concurrent_runs_with_warm_pool() {
    let engine = test_engine();
    let runner = Runner::new(engine, python_only(3));
    wait_until_full(runner.pools()).await;

    let request = ExecutionRequest::new("python", fixture_source("hello.py"));
    let cancel = CancellationToken::new();
    let results = join_all((0..3).map(|_| runner.run(&request, &cancel))).await;

    for result in results {
        let result = result.expect("Execution failed");
        assert_eq!(result.stdout, "OK\n");
    }
    assert!(runner.pools().pool("python").unwrap().len() <= 3);

    runner.shutdown().await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_memory_override_runs_ad_hoc() {
    let engine = test_engine();
    let runner = Runner::new(engine, python_only(1));
    wait_until_full(runner.pools()).await;

    let request = ExecutionRequest::new("python", fixture_source("hello.py"))
        .with_memory_limit(64 * 1024 * 1024);
    let result = runner
        .run(&request, &CancellationToken::new())
        .await
        .expect("Execution failed");

    assert_eq!(result.stdout, "OK\n");
    assert_eq!(runner.pools().pool("python").unwrap().len(), 1);

    runner.shutdown().await;
}
