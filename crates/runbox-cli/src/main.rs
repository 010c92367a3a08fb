//! Runbox CLI
//!
//! A command-line tool for running code in hardened Docker containers.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::stream::{self, StreamExt};
use runbox::{Config, DockerEngine, EXAMPLE_CONFIG, ExecutionRequest, ExecutionResult, Runner};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

/// How long `bench` waits for the warm pool before starting anyway
const WARM_UP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "runbox")]
#[command(about = "A tool for running untrusted code in hardened containers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: runbox.toml)
        #[arg(short, long, default_value = "runbox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a program once in a fresh container
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., python, cpp)
        #[arg(short, long)]
        language: String,

        /// File fed to the program's stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Time limit in seconds
        #[arg(short, long)]
        time_limit: Option<f64>,

        /// Memory limit in bytes
        #[arg(short, long)]
        memory_limit: Option<u64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a program repeatedly through the warm pools
    Bench {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., python, cpp)
        #[arg(short, long)]
        language: String,

        /// Number of runs
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Runs in flight at once
        #[arg(short = 'j', long, default_value = "3")]
        concurrency: usize,
    },

    /// List available languages
    Languages,

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            language,
            input,
            time_limit,
            memory_limit,
            json,
        } => {
            let request =
                build_request(&source, language, input.as_deref(), time_limit, memory_limit)
                    .await?;
            run_once(config, request, json).await
        }
        Commands::Bench {
            source,
            language,
            count,
            concurrency,
        } => {
            let request = build_request(&source, language, None, None, None).await?;
            run_bench(config, request, count, concurrency).await
        }
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => show_config(&config),
    }
}

/// Load the configuration file, falling back to the built-in languages
fn load_config(path: Option<&Path>) -> Config {
    if let Some(path) = path {
        info!(path = %path.display(), "loading configuration");
    }
    Config::load_or_default(path)
}

async fn build_request(
    source: &Path,
    language: String,
    input: Option<&Path>,
    time_limit: Option<f64>,
    memory_limit: Option<u64>,
) -> Result<ExecutionRequest> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;
    let mut request = ExecutionRequest::new(language, code);

    if let Some(path) = input {
        let stdin = tokio::fs::read_to_string(path)
            .await
            .context("failed to read input file")?;
        request = request.with_stdin(stdin);
    }
    if let Some(secs) = time_limit {
        let limit = Duration::try_from_secs_f64(secs).context("invalid time limit")?;
        request = request.with_time_limit(limit);
    }
    if let Some(bytes) = memory_limit {
        request = request.with_memory_limit(bytes);
    }

    Ok(request)
}

/// Connect to the daemon, check it answers, and start the runner
async fn connect(config: Config) -> Result<Runner> {
    let engine = DockerEngine::connect(config.docker_host.as_deref())
        .context("failed to connect to docker")?;
    engine.ping().await.context("docker daemon is not responding")?;
    Ok(Runner::new(Arc::new(engine), config))
}

/// Cancel the token on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            token.cancel();
        }
    });
    cancel
}

async fn run_once(mut config: Config, request: ExecutionRequest, json: bool) -> Result<()> {
    // A single run gains nothing from warm containers
    config.pool.size = 0;
    let runner = connect(config).await?;

    info!(language = %request.language, "running program");
    let cancel = cancel_on_ctrl_c();
    let result = runner
        .run(&request, &cancel)
        .await
        .context("execution failed")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("failed to serialize result")?
        );
    } else {
        print_result(&result)?;
    }

    if result.is_success() {
        Ok(())
    } else {
        std::process::exit(result.exit_code);
    }
}

fn print_result(result: &ExecutionResult) -> Result<()> {
    print!("{}", result.stdout);
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }
    // process::exit skips stdout's buffer
    std::io::stdout().flush().context("failed to flush stdout")?;

    // Log execution info via tracing (stderr), keeping stdout clean for piping
    info!(
        exit_code = result.exit_code,
        time = format_args!("{:.3}s", result.time_used.as_secs_f64()),
        timed_out = result.timed_out,
        "execution result"
    );
    Ok(())
}

async fn run_bench(
    config: Config,
    request: ExecutionRequest,
    count: usize,
    concurrency: usize,
) -> Result<()> {
    config
        .profile_for(&request.language)
        .context("unknown language")?;
    let runner = connect(config).await?;

    wait_for_warm_pool(&runner, &request.language).await;

    let cancel = cancel_on_ctrl_c();
    let started = Instant::now();
    let outcomes: Vec<_> = stream::iter(0..count)
        .map(|i| {
            let runner = &runner;
            let request = &request;
            let cancel = &cancel;
            async move {
                let begin = Instant::now();
                let result = runner.run(request, cancel).await;
                (i, begin.elapsed(), result)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    let total = started.elapsed();

    runner.shutdown().await;

    let mut latencies = Vec::with_capacity(outcomes.len());
    let mut failures = 0;
    for (i, latency, result) in outcomes {
        match result {
            Ok(result) => {
                println!(
                    "run {i:>4}: {:>8.1} ms  exit {}",
                    latency.as_secs_f64() * 1000.0,
                    result.exit_code
                );
                latencies.push(latency);
            }
            Err(error) => {
                println!("run {i:>4}: error: {error}");
                failures += 1;
            }
        }
    }

    latencies.sort();
    if let (Some(min), Some(max)) = (latencies.first(), latencies.last()) {
        let mean = latencies.iter().sum::<Duration>() / latencies.len() as u32;
        println!();
        println!(
            "{} runs in {:.2}s, {} failed",
            latencies.len() + failures,
            total.as_secs_f64(),
            failures
        );
        println!(
            "latency min {:.1} ms, mean {:.1} ms, max {:.1} ms",
            min.as_secs_f64() * 1000.0,
            mean.as_secs_f64() * 1000.0,
            max.as_secs_f64() * 1000.0
        );
    }

    Ok(())
}

async fn wait_for_warm_pool(runner: &Runner, language: &str) {
    let Some(pool) = runner.pools().pool(language) else {
        return;
    };

    info!(language, "waiting for warm containers");
    let deadline = Instant::now() + WARM_UP_TIMEOUT;
    while !pool.is_full() {
        if Instant::now() >= deadline {
            warn!(idle = pool.len(), "warm pool not full, starting anyway");
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    let mut languages: Vec<_> = config.languages.iter().collect();
    languages.sort_by_key(|(id, _)| *id);

    for (id, profile) in languages {
        let lang_type = if profile.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<15} {} ({})", id, profile.image, lang_type);
    }
}

fn show_config(config: &Config) -> Result<()> {
    println!(
        "Docker host: {}",
        config.docker_host.as_deref().unwrap_or("(local default)")
    );
    println!("Warm pool size: {}", config.pool.size);
    println!("Max output: {} bytes per stream", config.max_output);
    println!("Fallback time limit: {}s", config.fallback_time_limit);
    println!();
    println!("Languages configured: {}", config.languages.len());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config.languages).context("failed to serialize languages")?
    );
    Ok(())
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
