use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use triangle_slideshow::config::Configuration;
use triangle_slideshow::events::{PlaybackCommand, PresentationEvent, Visibility};
use triangle_slideshow::integrity;
use triangle_slideshow::manifest::load_manifest;
use triangle_slideshow::render::surface::HeadlessSurface;
use triangle_slideshow::source::AnySource;
use triangle_slideshow::store::SlideStore;
use triangle_slideshow::tasks::scheduler;

#[derive(Debug, Parser)]
#[command(
    name = "triangle-slideshow",
    version,
    about = "Triangle-mesh slide show playback engine"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Load every slide and transition, print an integrity report and exit
    #[arg(long)]
    check: bool,
    /// Override the configured data root (directory or http(s) URL)
    #[arg(long = "data-root", value_name = "ROOT")]
    data_root: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing (RUST_LOG controls level, default = info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let Args {
        config,
        check,
        data_root,
    } = Args::parse();

    let mut cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?;
    if let Some(root) = data_root {
        cfg.data_root = root;
    }
    let cfg = cfg.validated().context("invalid configuration values")?;
    tracing::info!(
        "Loaded configuration from {}:\n{:#?}",
        config.display(),
        cfg
    );

    let source = Arc::new(AnySource::from_data_root(&cfg.data_root)?);

    if check {
        return run_check(source).await;
    }

    let (command_tx, command_rx) = mpsc::channel::<PlaybackCommand>(16); // External -> Scheduler
    let (event_tx, mut event_rx) = mpsc::channel::<PresentationEvent>(cfg.event_buffer); // Scheduler -> log

    let cancel = CancellationToken::new();

    // Ctrl-D/Ctrl-C stop playback
    if io::stdin().is_terminal() {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let mut sink = Vec::new();
            match io::stdin().read_to_end(&mut sink) {
                Ok(_) => tracing::info!("stdin closed; initiating shutdown"),
                Err(err) => tracing::warn!("stdin watcher failed: {err}"),
            }
            cancel.cancel();
        });
    } else {
        tracing::debug!("stdin is not a terminal; skipping shutdown watcher");
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        let control = command_tx.clone();
        tokio::spawn(async move {
            let (mut sigusr1, mut sigusr2) = match (
                signal(SignalKind::user_defined1()),
                signal(SignalKind::user_defined2()),
            ) {
                (Ok(a), Ok(b)) => (a, b),
                (Err(err), _) | (_, Err(err)) => {
                    tracing::warn!("failed to register SIGUSR handlers: {err}");
                    return;
                }
            };
            let mut visible = true;
            loop {
                let command = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = sigusr1.recv() => {
                        if received.is_none() {
                            break;
                        }
                        tracing::info!("SIGUSR1 received; toggling pause");
                        PlaybackCommand::TogglePause
                    }
                    received = sigusr2.recv() => {
                        if received.is_none() {
                            break;
                        }
                        visible = !visible;
                        tracing::info!(visible, "SIGUSR2 received; toggling visibility");
                        PlaybackCommand::Visibility(if visible {
                            Visibility::Visible
                        } else {
                            Visibility::Hidden
                        })
                    }
                };
                if let Err(err) = control.send(command).await {
                    tracing::warn!("failed to forward playback command: {err}");
                    break;
                }
            }
        });
    }

    let mut tasks = JoinSet::new();

    // Presentation event log
    tasks.spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                PresentationEvent::Status(status) => tracing::info!(?status, "presentation status"),
                PresentationEvent::CaptionChanged(caption) => tracing::info!(
                    index = caption.index,
                    name = %caption.name,
                    source_image = caption.source_image.as_deref(),
                    "now showing"
                ),
                other => tracing::debug!(?other, "presentation event"),
            }
        }
        Ok::<(), anyhow::Error>(())
    });

    // Scheduler
    tasks.spawn({
        let cfg = cfg.clone();
        let cancel = cancel.clone();
        async move {
            let result = scheduler::run(
                cfg,
                source,
                HeadlessSurface::new(),
                command_rx,
                event_tx,
                cancel.clone(),
            )
            .await
            .context("scheduler task failed");
            // Nothing else to do once playback ends
            cancel.cancel();
            result
        }
    });
    drop(command_tx);

    let mut failed = false;
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("task error: {e:?}");
                failed = true;
            }
            Err(e) => {
                tracing::error!("join error: {e}");
                failed = true;
            }
        }
    }
    if failed {
        bail!("playback ended with errors");
    }
    Ok(())
}

async fn run_check(source: Arc<AnySource>) -> Result<()> {
    let manifest = load_manifest(source.as_ref())
        .await
        .context("failed to load manifest")?;
    let store = SlideStore::new(source.clone(), manifest);
    let mut report = integrity::check_store(&store).await;

    if let AnySource::Dir(dir) = source.as_ref() {
        let orphans = integrity::unreferenced_files(dir.root(), store.manifest())?;
        report.add_unreferenced(&orphans);
    }

    println!("{report}");
    if report.has_errors() {
        bail!("integrity check found errors");
    }
    Ok(())
}
