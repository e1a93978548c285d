use anyhow::{Context, Result};
use clap::Parser;
use scene_mirror::{
    spawn_push_worker, start_push_reporter, timeout_from_secs, CatalogClient,
    CommandIngressServer, EditLoop, HeadlessScene, IngressContext, LocalEdit, MirrorConfig,
};
use std::{
    future::Future,
    io::BufRead,
    path::PathBuf,
    pin::Pin,
    sync::Arc,
    thread,
    time::Duration,
};
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mirror")]
#[command(about = "Mirror a remote model catalog into a local scene", long_about = None)]
struct Args {
    /// Catalog base URL
    #[arg(long)]
    catalog_url: Option<String>,

    /// Scene to mirror
    #[arg(long)]
    scene_id: Option<String>,

    /// Address for the command ingress listener
    #[arg(long)]
    bind: Option<String>,

    /// Distance moved per movement command
    #[arg(long)]
    move_speed: Option<f32>,

    /// Ticks per second
    #[arg(long)]
    tick_hz: Option<u32>,

    /// Pending push-backs kept before new ones are dropped
    #[arg(long)]
    push_queue: Option<usize>,

    /// Threads answering movement commands
    #[arg(long)]
    workers: Option<usize>,

    /// Timeout for each catalog request, in seconds
    #[arg(long)]
    request_timeout_secs: Option<f64>,

    /// Directory for downloaded assets
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Seconds between push statistics reports (0 disables)
    #[arg(long, default_value = "60")]
    stats_secs: u64,

    /// Do not read edit commands from stdin
    #[arg(long)]
    no_console: bool,
}

impl Args {
    /// Command line values win over the environment.
    fn apply(&self, config: &mut MirrorConfig) -> Result<()> {
        if let Some(url) = &self.catalog_url {
            config.catalog_url = url.clone();
        }
        if let Some(scene_id) = &self.scene_id {
            config.scene_id = scene_id.clone();
        }
        if let Some(bind) = &self.bind {
            config.bind_address = bind.clone();
        }
        if let Some(speed) = self.move_speed {
            config.move_speed = speed;
        }
        if let Some(tick_hz) = self.tick_hz {
            config.tick_hz = tick_hz;
        }
        if let Some(push_queue) = self.push_queue {
            config.push_queue = push_queue;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Some(timeout_from_secs(secs)?);
        }
        if let Some(dir) = &self.download_dir {
            config.download_dir = Some(dir.clone());
        }
        config.validate()?;
        Ok(())
    }
}

/// A line typed into the console.
#[derive(Debug, PartialEq)]
enum ConsoleCommand {
    Edit(LocalEdit),
    Select(String),
    Refresh,
    List,
}

fn parse_console(line: &str) -> Option<ConsoleCommand> {
    let line = line.trim();
    let mut chars = line.chars();
    if let (Some(key), None) = (chars.next(), chars.next()) {
        return LocalEdit::from_key(key).map(ConsoleCommand::Edit);
    }

    match line.split_once(char::is_whitespace) {
        Some(("select", id)) if !id.trim().is_empty() => {
            Some(ConsoleCommand::Select(id.trim().to_string()))
        }
        _ if line == "refresh" => Some(ConsoleCommand::Refresh),
        _ if line == "list" => Some(ConsoleCommand::List),
        _ => None,
    }
}

fn handle_console(edit_loop: &mut EditLoop<HeadlessScene>, line: &str) {
    match parse_console(line) {
        Some(ConsoleCommand::Edit(edit)) => edit_loop.queue_edit(edit),
        Some(ConsoleCommand::Select(id)) => {
            if !edit_loop.select_id(&id) {
                tracing::warn!("No tracked model with id {}", id);
            }
        }
        Some(ConsoleCommand::Refresh) => {
            let seq = edit_loop.request_refresh();
            tracing::info!(seq, "refresh queued from console");
        }
        Some(ConsoleCommand::List) => {
            let selected = edit_loop.selected().map(str::to_string);
            for entry in edit_loop.mirror().entries() {
                let marker = if selected.as_deref() == Some(entry.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                tracing::info!(
                    "{} {} ({}) at {:?}",
                    marker,
                    entry.id,
                    entry.name,
                    entry.transform.position
                );
            }
        }
        None if line.trim().is_empty() => {}
        None => tracing::warn!(
            "Unknown command {:?} (a/d/w/s move, q/e rotate, z/x scale, select <id>, refresh, list)",
            line.trim()
        ),
    }
}

/// Forwards stdin lines to the owning task from a plain thread.
fn spawn_console() -> mpsc::Receiver<String> {
    let (sender, receiver) = mpsc::channel(16);
    let spawned = thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if sender.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("Console unavailable: {}", e);
    }
    receiver
}

/// Runs one tick unless `shutdown` resolves first.
///
/// A hung catalog request must not block shutdown. Dropping the tick is
/// safe: the scene is only replaced after every await has completed.
async fn tick_or_shutdown<F>(
    edit_loop: &mut EditLoop<HeadlessScene>,
    shutdown: &mut Pin<&mut F>,
) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        _ = edit_loop.tick() => None,
        result = shutdown.as_mut() => Some(result),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = MirrorConfig::from_env().context("invalid environment configuration")?;
    args.apply(&mut config)?;

    tracing::info!("Scene mirror v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Catalog: {} (scene {})", config.catalog_url, config.scene_id);

    let context = IngressContext::new();
    let mut server = CommandIngressServer::new(&config.bind_address, context.clone(), config.workers);
    server
        .start()
        .context("command ingress failed to start")?;

    let client = Arc::new(
        CatalogClient::new(&config.catalog_url, &config.scene_id)
            .with_request_timeout(config.request_timeout)
            .with_download_dir(config.download_dir.clone()),
    );
    let (pushes, push_worker) = spawn_push_worker(client.clone(), config.push_queue);
    let stats = pushes.stats();
    let reporter = (args.stats_secs > 0).then(|| {
        tokio::spawn(start_push_reporter(
            stats.clone(),
            Duration::from_secs(args.stats_secs),
        ))
    });

    let mut edit_loop = EditLoop::new(
        HeadlessScene::new(),
        client,
        context,
        pushes,
        config.move_speed,
    );
    // Initial load goes through the same queue as notifications.
    edit_loop.request_refresh();

    let mut console = if args.no_console {
        mpsc::channel(1).1
    } else {
        spawn_console()
    };

    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let interrupted = tokio::select! {
            _ = ticker.tick() => tick_or_shutdown(&mut edit_loop, &mut shutdown).await,
            Some(line) = console.recv() => {
                handle_console(&mut edit_loop, &line);
                None
            }
            result = &mut shutdown => Some(result),
        };

        if let Some(result) = interrupted {
            if let Err(e) = result {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
            tracing::info!("Shutting down");
            break;
        }
    }

    server.stop();
    drop(edit_loop);
    if let Some(reporter) = reporter {
        reporter.abort();
    }
    push_worker.abort();
    stats.print_stats();

    Ok(())
}
