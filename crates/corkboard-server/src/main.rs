//! Corkboard demo host
//!
//! Wires an in-memory kernel, runs a scripted board session through the
//! mutation coordinator and prints the chat attachments the subscribers
//! would receive.
//!
//! ## Usage
//!
//! ```bash
//! corkboard-server [--config <file>]
//! CORKBOARD_CONFIG=corkboard.toml corkboard-server
//! RUST_LOG=corkboard_kernel=debug corkboard-server
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};
use corkboard_kernel::{CorkboardConfig, Kernel, KernelChannels};
use corkboard_notify::Attachment;
use corkboard_types::{
    Block, BlockPatch, Board, BoardsAndBlocks, DeleteBoardsAndBlocks, PatchBoardsAndBlocks,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_ENV: &str = "CORKBOARD_CONFIG";
const DEFAULT_SERVER_ROOT: &str = "http://localhost:8065/boards";

fn print_usage() {
    eprintln!(
        r#"corkboard-server - scripted corkboard session

USAGE:
    corkboard-server [OPTIONS]

OPTIONS:
    --config <FILE>    TOML configuration (default: ${env}, then built-in defaults)
    --help, -h         Show this help

LOGGING:
    Set RUST_LOG to adjust verbosity (default: info).
"#,
        env = CONFIG_ENV
    );
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config_path = match parse_args(&args) {
        Ok(Some(path)) => path,
        Ok(None) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match run(config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "session failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(None)` when help was requested.
fn parse_args(args: &[String]) -> anyhow::Result<Option<Option<PathBuf>>> {
    let mut config = env::var_os(CONFIG_ENV).map(PathBuf::from);
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(None),
            "--config" => {
                let path = iter.next().context("--config requires a file")?;
                config = Some(PathBuf::from(path));
            }
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(Some(config))
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<CorkboardConfig> {
    let mut config = match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            CorkboardConfig::load(&path)?
        }
        None => CorkboardConfig::default(),
    };
    if config.server_root.is_empty() {
        config.server_root = DEFAULT_SERVER_ROOT.to_string();
    }
    Ok(config)
}

async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let (kernel, mut channels) = Kernel::current(config);

    let mut board_events = kernel.flows().subscribe(">");
    script(&kernel).await?;

    for msg in board_events.drain() {
        tracing::info!(
            subject = %msg.subject,
            team_id = msg.payload.team_id(),
            board_id = msg.payload.board_id(),
            "board event"
        );
    }

    let delivered = kernel.notifier().flush_due(i64::MAX);
    tracing::info!(
        delivered,
        metrics = ?kernel.metrics().snapshot(),
        panicked = kernel.coordinator().dispatcher().panicked_jobs(),
        "session complete"
    );

    print_outbound(&mut channels)
}

/// Alice builds a board; bob watches the card while alice edits it.
async fn script(kernel: &Kernel) -> anyhow::Result<()> {
    let coordinator = kernel.coordinator();

    let board = Board::new("team-demo", "Release 1.0");
    let card = Block::card(board.id.clone(), "Write changelog").with_property("Status", "Todo");
    let comment = Block::comment(&card, "Start from the\nmerged PR list");
    let created = coordinator.create_boards_and_blocks(
        &BoardsAndBlocks::new(vec![board], vec![card, comment]),
        "alice",
        true,
    )?;
    kernel.drain().await;

    let (Some(card), Some(comment)) = (created.blocks.first(), created.blocks.get(1)) else {
        bail!("store returned {} blocks, expected 2", created.blocks.len());
    };
    kernel.notifier().subscribe(card.id.clone(), "bob");

    let patch = PatchBoardsAndBlocks::default().patch_block(
        card.id.clone(),
        BlockPatch::default()
            .with_title("Write the 1.0 changelog")
            .with_property("Status", "In Progress"),
    );
    coordinator.patch_boards_and_blocks(&patch, "alice")?;

    let del = DeleteBoardsAndBlocks::new(vec![], vec![comment.id.clone()]);
    coordinator.delete_boards_and_blocks(&del, "carol")?;

    kernel.drain().await;
    Ok(())
}

fn print_outbound(channels: &mut KernelChannels) -> anyhow::Result<()> {
    while let Ok(payload) = channels.webhooks.try_recv() {
        tracing::debug!(block_id = %payload.block_id, board_id = %payload.board_id, "webhook queued");
    }

    while let Ok(delivery) = channels.deliveries.try_recv() {
        println!(
            "== card {} -> {}",
            delivery.card_id,
            delivery.recipients.join(", ")
        );
        for attachment in &delivery.attachments {
            print_attachment(attachment)?;
        }
    }
    Ok(())
}

fn print_attachment(attachment: &Attachment) -> anyhow::Result<()> {
    print!("{}", attachment.pretext);
    for field in &attachment.fields {
        println!("  {}: {}", field.title, field.value);
    }
    let json = serde_json::to_string(attachment).context("serializing attachment")?;
    tracing::debug!(%json, "attachment");
    Ok(())
}
