mod chat;
mod config;
mod display;

use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use finman_ai::json::recover_object;
use finman_core::{IdentityKey, normalize};
use finman_store::DuckEntryStore;
use tracing::Level;

use chat::ChatArgs;
use config::StoreOpts;

#[derive(Parser, Debug)]
#[command(name = "finman", version, about = "Chat-driven expense tracker")]
struct Cli {
    #[command(flatten)]
    store: StoreOpts,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log expenses by chatting from the terminal
    Chat(ChatArgs),

    /// Show saved records for a phone number
    History {
        #[arg(long)]
        phone: String,
    },

    /// Normalize a raw extraction object and print the entry as JSON
    Normalize { json: String },
}

fn open_store(opts: &StoreOpts) -> anyhow::Result<DuckEntryStore> {
    match &opts.db {
        Some(path) => DuckEntryStore::open_persistent(path)
            .with_context(|| format!("opening {}", path.display())),
        None => DuckEntryStore::open().context("opening in-memory store"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        return Err(e).context("loading .env");
    }
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("finman v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Chat(args) => {
            let store = open_store(&cli.store)?;
            chat::run(Arc::new(store), &args).await
        }
        Command::History { phone } => {
            let identity = IdentityKey::from_phone(&phone)
                .ok_or_else(|| anyhow!("not a valid 10-digit phone number: {phone}"))?;
            let store = open_store(&cli.store)?;
            let batches = store.records_for(&identity)?;
            display::print_history(&batches)
        }
        Command::Normalize { json } => {
            let Some(raw) = recover_object(&json) else {
                bail!("no JSON object found in input");
            };
            let entry = normalize(&raw);
            println!("{}", serde_json::to_string_pretty(&entry)?);
            Ok(())
        }
    }
}
