use std::{
    path::{Path, PathBuf},
    sync::mpsc as std_mpsc,
};

use anyhow::{Context, Result};
use clap::Parser;
use futures::{stream::BoxStream, StreamExt};
use rollcall_capture::{DirectorySource, FrameSource, SyntheticSource};
use rollcall_kiosk::{Kiosk, KioskHandle};
use rollcall_network::{local_pair, ChannelTransport, EventHub, WsChannel};
use rollcall_ops::{init_tracing, LogTarget};
use rollcall_types::{
    config::{KioskConfig, SourceKind},
    events::KioskEvent,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

mod demo;
mod ui;

const EVENT_HUB_CAPACITY: usize = 256;

#[derive(Debug, Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance kiosk client")]
struct Args {
    /// Kiosk configuration file.
    #[arg(long, env = "ROLLCALL_CONFIG", default_value = "configs/kiosk.toml")]
    config: PathBuf,
    /// Recognition service WebSocket URL, overriding the config file.
    #[arg(long)]
    url: Option<String>,
    /// Answer requests with the in-process demo service.
    #[arg(long)]
    demo: bool,
    /// Skip the terminal dashboard and log to stderr.
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(&args.config);
    if let Some(url) = &args.url {
        config.channel.url = url.clone();
    }

    let target = if args.headless {
        LogTarget::Stderr
    } else {
        LogTarget::File
    };
    if let Some(path) = init_tracing(&config.ops, target)? {
        eprintln!("Logging to {}", path.display());
    }

    let source = build_source(&config).context("failed to prepare frame source")?;
    let transport: Box<dyn ChannelTransport> = if args.demo {
        let (channel, service) = local_pair(config.channel.outbound_capacity);
        tokio::spawn(demo::serve(service));
        Box::new(channel)
    } else {
        Box::new(WsChannel::spawn(&config.channel))
    };

    let summary = format!(
        "{} | every {} ms | {:?}",
        if args.demo { "demo service" } else { config.channel.url.as_str() },
        config.capture.interval_ms,
        config.capture.annotation_policy,
    );
    let max_rows = config.attendance.max_rows;
    let (mut kiosk, handle) = Kiosk::new(config, source, transport, EventHub::new(EVENT_HUB_CAPACITY));
    let events = handle.events();
    let kiosk_task = tokio::spawn(async move {
        kiosk.boot().await?;
        kiosk.run().await
    });

    if args.headless {
        run_headless(events).await?;
    } else {
        run_dashboard(&handle, events, summary, max_rows).await?;
    }

    handle.shutdown().await.ok();
    match kiosk_task.await {
        Ok(Ok(())) => info!("Kiosk exited cleanly"),
        Ok(Err(err)) => error!(error = %err, "Kiosk stopped with an error"),
        Err(err) => error!(error = %err, "Kiosk task panicked"),
    }
    Ok(())
}

fn build_source(config: &KioskConfig) -> Result<Box<dyn FrameSource>> {
    Ok(match config.source.kind {
        SourceKind::Synthetic => Box::new(SyntheticSource::new(config.source.clone())),
        SourceKind::Directory => Box::new(DirectorySource::new(config.source.clone())?),
    })
}

async fn run_headless(mut events: BoxStream<'static, KioskEvent>) -> Result<()> {
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                info!("Interrupted; shutting down");
                return Ok(());
            }
            event = events.next() => {
                let Some(event) = event else {
                    return Ok(());
                };
                info!("{}", ui::describe(&event));
            }
        }
    }
}

/// The dashboard owns the terminal on a blocking thread; kiosk events reach
/// it over a std channel and its actions come back over a tokio one.
async fn run_dashboard(
    handle: &KioskHandle,
    mut events: BoxStream<'static, KioskEvent>,
    summary: String,
    max_rows: Option<usize>,
) -> Result<()> {
    let (ui_tx, ui_rx) = std_mpsc::channel();
    let (action_tx, mut action_rx) = mpsc::unbounded_channel();

    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if ui_tx.send(ui::UiMessage::Event(event)).is_err() {
                return;
            }
        }
        let _ = ui_tx.send(ui::UiMessage::Shutdown);
    });
    let mut dashboard = tokio::task::spawn_blocking(move || ui::run(ui_rx, action_tx, summary, max_rows));

    let outcome = loop {
        tokio::select! {
            finished = &mut dashboard => break finished,
            Some(action) = action_rx.recv() => match action {
                ui::UiAction::Register(identity) => {
                    let handle = handle.clone();
                    tokio::spawn(async move {
                        match handle.register(identity).await {
                            Ok(outcome) => info!(?outcome, "Registration finished"),
                            Err(err) => warn!(error = %err, "Registration refused"),
                        }
                    });
                }
                ui::UiAction::IdentityInput(text) => {
                    handle.set_identity_input(text).await.ok();
                }
                ui::UiAction::DisplayScale(scale) => {
                    handle.set_display_scale(scale).await.ok();
                }
            },
        }
    };
    forwarder.abort();
    outcome.context("dashboard thread panicked")?
}

fn load_config(path: &Path) -> KioskConfig {
    match KioskConfig::from_file(path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                default_config()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            default_config()
        }
    }
}

fn default_config() -> KioskConfig {
    let config = KioskConfig::default();
    debug_assert!(config.validate().is_ok());
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_default_to_bundled_config() {
        let args = Args::try_parse_from(["rollcall"]).expect("parse");
        assert!(!args.demo);
        assert!(!args.headless);
        assert!(args.url.is_none());
        if std::env::var_os("ROLLCALL_CONFIG").is_none() {
            assert_eq!(args.config, PathBuf::from("configs/kiosk.toml"));
        }
    }

    #[test]
    fn url_flag_is_accepted() {
        let args = Args::try_parse_from(["rollcall", "--url", "ws://10.0.0.2:5000/ws", "--demo"])
            .expect("parse");
        assert_eq!(args.url.as_deref(), Some("ws://10.0.0.2:5000/ws"));
        assert!(args.demo);
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let config = load_config(Path::new("does/not/exist.toml"));
        assert_eq!(config.capture.interval_ms, 400);
    }
}
