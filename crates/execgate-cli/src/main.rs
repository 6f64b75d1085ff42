//! Execgate CLI
//!
//! A command-line tool for running code through the admission pipeline into
//! docker sandboxes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use execgate::{
    Config, EXAMPLE_CONFIG, ExecuteError, ExecutionRequest, ExecutionResult, ExecutionService,
    Identity,
};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "execgate")]
#[command(about = "A tool for admitting and running sandboxed code executions")]
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
        /// Output path (default: execgate.toml)
        #[arg(short, long, default_value = "execgate.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run one or more programs concurrently
    Run {
        /// Source files to run
        #[arg(value_name = "FILE", required = true)]
        sources: Vec<PathBuf>,

        /// Language code (e.g., python, cpp)
        #[arg(short, long)]
        language: String,

        /// Input file fed to every program
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Identity to submit as (anonymous if omitted)
        #[arg(short, long)]
        user: Option<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available languages
    Languages,

    /// Show effective configuration
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

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            sources,
            language,
            input,
            user,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let identity = user.map_or(Identity::Anonymous, Identity::User);
            run_programs(config, &sources, &language, input.as_deref(), identity, json).await
        }
        Commands::Languages => {
            list_languages(&load_config(cli.config.as_deref())?);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&load_config(cli.config.as_deref())?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")
    } else {
        debug!("using default configuration with environment overrides");
        Config::from_env().context("failed to load configuration")
    }
}

async fn run_programs(
    config: Config,
    sources: &[PathBuf],
    language: &str,
    input: Option<&Path>,
    identity: Identity,
    json: bool,
) -> Result<()> {
    let stdin = if let Some(input_path) = input {
        Some(
            tokio::fs::read_to_string(input_path)
                .await
                .context("failed to read input file")?,
        )
    } else {
        None
    };

    let mut requests = Vec::with_capacity(sources.len());
    for source in sources {
        let code = tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("failed to read source file '{}'", source.display()))?;
        let mut request = ExecutionRequest::new(language, code);
        if let Some(stdin) = &stdin {
            request = request.with_stdin(stdin.clone());
        }
        requests.push((source.clone(), request));
    }

    info!(count = requests.len(), language, "submitting programs");

    let service = Arc::new(ExecutionService::new(config));
    let handles: Vec<_> = requests
        .into_iter()
        .map(|(path, request)| {
            let service = Arc::clone(&service);
            let identity = identity.clone();
            tokio::spawn(async move {
                let outcome = service.execute(&identity, &request).await;
                (path, outcome)
            })
        })
        .collect();

    let mut all_succeeded = true;
    for handle in handles {
        let (path, outcome) = handle.await.context("submission task failed")?;
        all_succeeded &= outcome.as_ref().is_ok_and(ExecutionResult::is_success);
        if json {
            print_json(&path, &outcome)?;
        } else {
            print_human(&path, &outcome);
        }
    }

    if all_succeeded {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn print_human(path: &Path, outcome: &Result<ExecutionResult, ExecuteError>) {
    println!("== {} ==", path.display());
    match outcome {
        Ok(result) => {
            println!("status: {} ({} ms)", result.status, result.exec_time_ms);
            if !result.stdout.is_empty() {
                println!("{}", result.stdout.trim_end());
            }
            if !result.stderr.is_empty() {
                eprintln!("{}", result.stderr.trim_end());
            }
        }
        Err(e) => {
            println!("rejected: {e}");
            if let Some(secs) = e.retry_after_secs() {
                println!("retry after: {secs}s");
            }
        }
    }
}

fn print_json(path: &Path, outcome: &Result<ExecutionResult, ExecuteError>) -> Result<()> {
    let value = match outcome {
        Ok(result) => serde_json::json!({
            "file": path.display().to_string(),
            "result": result,
        }),
        Err(e) => serde_json::json!({
            "file": path.display().to_string(),
            "error": e.to_string(),
            "retry_after": e.retry_after_secs(),
        }),
    };
    println!(
        "{}",
        serde_json::to_string(&value).context("failed to encode result")?
    );
    Ok(())
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for (code, lang) in config.enabled_languages() {
        let lang_type = if lang.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<15} {} ({}) [{}]", code, lang.name, lang_type, lang.image);
    }
}

fn show_config(config: &Config) {
    let sandbox = &config.sandbox;
    println!("Sandbox limits:");
    println!("  Run timeout: {}s", sandbox.timeout_seconds);
    println!("  Overall timeout: {}s", sandbox.overall_timeout_seconds);
    println!("  Memory: {}", sandbox.memory);
    println!("  CPUs: {}", sandbox.cpus);
    println!("  PIDs limit: {}", sandbox.pids_limit);
    println!("  Tmpfs size: {} MB", sandbox.tmpfs_size_mb);
    println!("  User: {}", sandbox.user);
    println!();

    let concurrency = &config.concurrency;
    println!("Admission:");
    println!("  Max concurrent: {}", concurrency.max_concurrent);
    println!("  Queue capacity: {}", concurrency.queue_capacity);
    println!("  Submit timeout: {} ms", concurrency.submit_timeout_ms);
    println!("  Permit timeout: {} ms", concurrency.permit_timeout_ms);
    println!(
        "  Per-identity in flight: {}",
        concurrency.per_identity_max_in_flight
    );
    println!();
    println!("Docker binary: {}", config.docker_binary().display());
    println!();
    println!(
        "Languages enabled: {} of {}",
        config.enabled_languages().len(),
        config.languages.len()
    );
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
