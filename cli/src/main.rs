use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use parley_core::transport::{
    ConfirmedMessage, ConversationKey, MissingProfileResolver, Profile, ProfileResolver,
};
use parley_core::{AppState, ConversationViewState, MessageDeliveryState, SyncApp};
use parley_memory_transport::MemoryTransport;
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "parley")]
#[command(about = "Drive the Parley conversation sync engine against an in-memory network")]
struct Cli {
    /// Data directory (parley_config.json is read from here)
    #[arg(long, default_value = ".parley", env = "PARLEY_DATA_DIR")]
    state_dir: PathBuf,

    /// How long to wait for each step before giving up
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the default parley_config.json
    Config,

    /// Seed a conversation, page through it, send messages and print the result
    Demo {
        /// Peer address
        #[arg(long, default_value = "0x1234567890abcdef1234567890abcdef12345678")]
        peer: String,

        /// Local account address
        #[arg(long, default_value = "0x00000000000000000000000000000000000000aa")]
        me: String,

        /// Peer display name served by the profile directory
        #[arg(long)]
        peer_name: Option<String>,

        /// Number of confirmed messages already on the network
        #[arg(long, default_value_t = 45)]
        history: usize,

        /// Older pages to request after the initial load
        #[arg(long, default_value_t = 1)]
        pages: usize,

        /// Messages to send (repeatable)
        #[arg(long = "send")]
        sends: Vec<String>,

        /// Make the first N sends fail
        #[arg(long, default_value_t = 0)]
        fail_sends: usize,

        /// Retry failed messages once
        #[arg(long)]
        retry: bool,
    },
}

fn print(v: serde_json::Value) {
    match serde_json::to_string_pretty(&v) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("json encode failed: {e}"),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.cmd {
        Command::Config => {
            println!("{}", parley_core::default_config_json());
            Ok(())
        }
        Command::Demo {
            peer,
            me,
            peer_name,
            history,
            pages,
            sends,
            fail_sends,
            retry,
        } => {
            std::fs::create_dir_all(&cli.state_dir)
                .with_context(|| format!("create state dir {}", cli.state_dir.display()))?;
            let opts = DemoOptions {
                peer,
                me,
                peer_name: peer_name.as_deref(),
                history: *history,
                pages: *pages,
                sends,
                fail_sends: *fail_sends,
                retry: *retry,
            };
            cmd_demo(&cli, opts)
        }
    }
}

struct DemoOptions<'a> {
    peer: &'a str,
    me: &'a str,
    peer_name: Option<&'a str>,
    history: usize,
    pages: usize,
    sends: &'a [String],
    fail_sends: usize,
    retry: bool,
}

fn wait_for(
    app: &SyncApp,
    what: &str,
    timeout: Duration,
    mut f: impl FnMut(&AppState) -> bool,
) -> anyhow::Result<AppState> {
    let start = Instant::now();
    loop {
        let state = app.state();
        if f(&state) {
            return Ok(state);
        }
        if start.elapsed() >= timeout {
            bail!("timed out waiting for {what}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn view(state: &AppState) -> anyhow::Result<&ConversationViewState> {
    state
        .current_conversation
        .as_ref()
        .ok_or_else(|| anyhow!("no open conversation"))
}

fn cmd_demo(cli: &Cli, opts: DemoOptions<'_>) -> anyhow::Result<()> {
    let timeout = Duration::from_millis(cli.timeout_ms);
    let key = ConversationKey::from_parts(opts.peer, "demo");

    let network = MemoryTransport::new().with_local_address(opts.me);
    let seeded: Vec<ConfirmedMessage> = (1..=opts.history)
        .map(|i| ConfirmedMessage {
            id: format!("seed-{i}"),
            sender: if i % 3 == 0 { opts.me } else { opts.peer }.to_string(),
            content: format!("message #{i}"),
            sent_at: 1_700_000_000_000 + (i as i64) * 60_000,
        })
        .collect();
    network.seed_history(&key, seeded);
    // Without a name there is no profile directory; the header falls back to the address.
    let profiles: Arc<dyn ProfileResolver> = match opts.peer_name {
        Some(name) => {
            network.insert_profile(Profile {
                address: opts.peer.to_string(),
                handle: None,
                display_name: Some(name.to_string()),
                avatar_url: None,
            });
            Arc::new(network.clone())
        }
        None => Arc::new(MissingProfileResolver),
    };
    network.fail_next_sends(opts.fail_sends);

    let data_dir = cli.state_dir.to_string_lossy().into_owned();
    let app = SyncApp::new(data_dir, Arc::new(network.clone()), profiles);

    app.open_conversation(key.clone());
    wait_for(&app, "initial page", timeout, |s| {
        s.current_conversation
            .as_ref()
            .is_some_and(|c| c.key == key && !c.loading)
    })?;
    tracing::info!(%key, "conversation loaded");

    for page in 0..opts.pages {
        let before = app.rendered_messages(&key).len();
        if !app.has_more(&key) {
            tracing::info!(page, "no older history");
            break;
        }
        app.request_older_page(key.clone());
        wait_for(&app, "older page", timeout, |s| {
            s.current_conversation
                .as_ref()
                .is_some_and(|c| !c.loading && (c.messages.len() > before || !c.has_more))
        })?;
    }

    let mut sent = Vec::new();
    for content in opts.sends {
        if let Some(id) = app.send(key.clone(), content.as_str()) {
            sent.push(id);
        }
    }
    let settled = |s: &AppState| {
        s.current_conversation.as_ref().is_some_and(|c| {
            sent.iter().all(|id| {
                c.messages.iter().any(|m| {
                    &m.id == id
                        && !matches!(
                            m.delivery,
                            MessageDeliveryState::Pending | MessageDeliveryState::Sent
                        )
                })
            })
        })
    };
    let mut state = wait_for(&app, "sends to settle", timeout, settled)?;

    if opts.retry {
        let failed: Vec<String> = view(&state)?
            .messages
            .iter()
            .filter(|m| matches!(m.delivery, MessageDeliveryState::Failed { .. }))
            .map(|m| m.id.clone())
            .collect();
        if !failed.is_empty() {
            let rev = state.rev;
            for id in &failed {
                app.retry(key.clone(), id.clone());
            }
            tracing::info!(count = failed.len(), "retrying failed sends");
            // Each retry bumps the revision once it leaves the Failed state.
            state = wait_for(&app, "retries to settle", timeout, |s| {
                s.rev >= rev + failed.len() as u64 && settled(s)
            })?;
        }
    }

    let view = view(&state)?;
    print(json!({
        "conversation": view.key,
        "title": view.title,
        "has_more": view.has_more,
        "stream_interrupted": view.stream_interrupted,
        "fetches": network.fetch_log().len(),
        "messages": view.messages,
    }));
    Ok(())
}
