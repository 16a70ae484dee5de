//! Llama Wool Farm - Save Sync Server
//!
//! Input (stdin): JSON requests, one per line
//! Output (stdout): JSON responses, one per line
//! Logs go to stderr; filter with `RUST_LOG`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wool_core::save::SCHEMA_VERSION;
use wool_server::protocol::{Command, Response};
use wool_server::{FileStore, MemoryStore, Result, SaveStore, ServerConfig, SyncService};

#[derive(Parser)]
#[command(name = "wool_server")]
#[command(about = "Save sync server for Llama Wool Farm")]
struct Cli {
    /// RON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing on stderr (stdout is for protocol)
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    let catalog = config.load_catalog(now_ms())?;
    let store: Box<dyn SaveStore> = match &config.save_dir {
        Some(dir) => Box::new(FileStore::open(dir)?),
        None => Box::new(MemoryStore::new()),
    };
    let service = SyncService::new(store, catalog, &config);

    tracing::info!(
        policy = ?config.default_policy,
        save_dir = ?config.save_dir,
        "Starting Llama Wool Farm sync server"
    );

    let mut stdout = tokio::io::stdout();
    send(
        &mut stdout,
        &Response::Ready {
            version: SCHEMA_VERSION.to_string(),
        },
    )
    .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match serde_json::from_str::<Command>(line) {
            Ok(command) => command,
            Err(e) => {
                let response = Response::Error {
                    message: e.to_string(),
                    cmd: None,
                };
                send(&mut stdout, &response).await?;
                continue;
            }
        };

        let name = command.name();
        let response = match handle(&service, command, now_ms()).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                send(&mut stdout, &Response::Bye).await?;
                break;
            }
            Err(e) => {
                tracing::warn!(cmd = name, error = %e, "Request failed");
                Response::Error {
                    message: e.to_string(),
                    cmd: Some(name.to_string()),
                }
            }
        };
        send(&mut stdout, &response).await?;
    }

    tracing::info!("Shutting down");
    Ok(())
}

/// Run one command. `None` means quit.
async fn handle<S: SaveStore>(
    service: &SyncService<S>,
    command: Command,
    now: i64,
) -> Result<Option<Response>> {
    let response = match command {
        Command::Sync { request } => Response::Synced(service.sync(request, now).await?),
        Command::Load { player_id } => Response::Save {
            record: service.load(&player_id, now).await?,
        },
        Command::Offline { player_id, claim } => {
            Response::Offline(service.offline_progress(&player_id, now, claim).await?)
        }
        Command::Quit => return Ok(None),
    };
    Ok(Some(response))
}

async fn send(stdout: &mut tokio::io::Stdout, response: &Response) -> Result<()> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    stdout.write_all(&line).await?;
    stdout.flush().await?;
    Ok(())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
