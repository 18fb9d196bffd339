//! Terminal chat: each stdin line is one conversation turn.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Args;
use finman_ai::{HttpExtractor, ImageRef};
use finman_core::IdentityKey;
use finman_resolve::{ConversationId, Dispatcher, Inbound, MemorySessionStore, Resolver};
use finman_store::EntryStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::config::{LlmOpts, ResolveOpts};

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Phone number to file entries under
    #[arg(long)]
    pub phone: String,

    /// Conversation handle, for running several chats against one store
    #[arg(long, default_value = "terminal")]
    pub conversation: String,

    #[command(flatten)]
    pub llm: LlmOpts,

    #[command(flatten)]
    pub resolve: ResolveOpts,
}

#[derive(Debug, PartialEq)]
enum Line {
    Text(String),
    Image { path: PathBuf, caption: String },
    Cancel,
    Quit,
    Blank,
}

fn parse_line(line: &str) -> Line {
    let line = line.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    match line {
        "/quit" | "/exit" => return Line::Quit,
        "/cancel" => return Line::Cancel,
        _ => {}
    }
    if let Some(rest) = line.strip_prefix("/image ") {
        let rest = rest.trim_start();
        let (path, caption) = rest.split_once(' ').unwrap_or((rest, ""));
        return Line::Image {
            path: PathBuf::from(path),
            caption: caption.trim().to_string(),
        };
    }
    Line::Text(line.to_string())
}

fn media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

async fn load_image(path: &Path) -> anyhow::Result<ImageRef> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading image {}", path.display()))?;
    Ok(ImageRef::new(media_type(path), bytes))
}

pub async fn run(store: Arc<dyn EntryStore>, args: &ChatArgs) -> anyhow::Result<()> {
    let identity = IdentityKey::from_phone(&args.phone)
        .ok_or_else(|| anyhow!("not a valid 10-digit phone number: {}", args.phone))?;
    let config = args.resolve.resolver_config()?;
    let extractor = HttpExtractor::new(args.llm.extractor_config()?)?;

    let sessions = Arc::new(MemorySessionStore::new(args.resolve.session_ttl()));
    let conv = ConversationId::new(args.conversation.clone());
    sessions.bind_identity(&conv, identity.clone())?;
    info!(conversation = %conv, identity = %identity, "session started");

    let resolver = Resolver::new(
        Arc::new(extractor),
        store,
        sessions.clone(),
        sessions,
        config,
    );
    let dispatcher = Dispatcher::new(Arc::new(resolver));

    println!("Logged in as {identity}. Describe an expense, or:");
    println!("  /image <path> [caption]   send a receipt photo");
    println!("  /cancel                   discard the entry in progress");
    println!("  /quit                     leave");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let inbound = match parse_line(&line) {
            Line::Quit => break,
            Line::Blank => continue,
            Line::Cancel => Inbound::Cancel,
            Line::Text(text) => Inbound::text(text),
            Line::Image { path, caption } => match load_image(&path).await {
                Ok(image) => Inbound::image(image, caption),
                Err(e) => {
                    eprintln!("{e:#}");
                    continue;
                }
            },
        };
        let outcome = dispatcher.dispatch(conv.clone(), inbound).await;
        println!("{}\n", outcome.reply);
    }
    Ok(())
}
