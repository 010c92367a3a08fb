//! Integration tests for runbox
//!
//! These tests require a running Docker daemon and pull the language images
//! on first use. Run with: cargo test -p runbox --features integration-tests
//!
//! Tests that need Docker are marked `#[ignore]`. To include them:
//!    cargo test -p runbox --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use std::fs;
use std::sync::Arc;

use runbox::{Config, DockerEngine, Runner};

mod config_loading;
mod limits;
mod pool_lifecycle;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Docker engine from the environment
pub(crate) fn test_engine() -> Arc<DockerEngine> {
    Arc::new(DockerEngine::connect(None).expect("Failed to connect to docker"))
}

/// Runner with warm pools disabled, so every run creates its own container
pub(crate) fn ad_hoc_runner() -> (Arc<DockerEngine>, Runner) {
    let mut config = Config::default();
    config.pool.size = 0;
    let engine = test_engine();
    let runner = Runner::new(Arc::clone(&engine), config);
    (engine, runner)
}
