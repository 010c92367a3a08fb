//! A library for sandboxed code execution.
//!
//! Runbox runs untrusted source code inside hardened, network-less Docker
//! containers and reports its output, exit code and wall-clock time. A small
//! pool of pre-started containers per language hides container start-up
//! latency from most requests.
//!
//! # Features
//!
//! - **Hardened containers**: memory, CPU and process ceilings, no network, no capabilities.
//! - **Warm pools**: per-language background tasks keep idle containers ready.
//! - **Multi-language**: compiled and interpreted languages from one TOML registry.
//! - **Bounded runs**: wall-clock deadlines, capped output and caller cancellation.
//!
//! # Example
//!
//! ```no_run
//! use runbox::{Config, ExecutionRequest, Runner};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runner = Runner::connect(Config::default())?;
//! let request = ExecutionRequest::new("python", "print('OK')");
//! let result = runner.run(&request, &CancellationToken::new()).await?;
//! assert_eq!(result.stdout, "OK\n");
//! runner.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, LanguageProfile};
pub use runner::{RunError, Runner, TIMEOUT_NOTICE, TRUNCATION_MARKER};
pub use sandbox::{ContainerEngine, DockerEngine, PoolManager, SandboxError};
pub use service::{ExecutionService, Executor};
pub use types::{ExecutionRequest, ExecutionResult, TIMEOUT_EXIT_CODE};

pub mod config;
pub mod runner;
pub mod sandbox;
pub mod service;
pub mod types;
