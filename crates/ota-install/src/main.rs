//! `ota-serve`: host one install session for a local package and exit once
//! the device has downloaded it.

mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use ota_install::{AppMetadata, DisplayImages, InstallSession, SessionConfig, SessionEvent, Status};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

enum Outcome {
    Finished(Status),
    Interrupted,
    Closed,
}

#[actix_web::main]
async fn main() -> Result<ExitCode> {
    let args = cli::Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,ota_install=info")
        }))
        .init();

    let mut cfg = match args.config.as_ref() {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    args.apply_overrides(&mut cfg);

    anyhow::ensure!(
        args.package.is_file(),
        "package not found: {}",
        args.package.display()
    );
    let images = match args.icon.as_ref() {
        Some(path) => DisplayImages::load(path)?,
        None => DisplayImages::placeholder(),
    };
    let metadata = AppMetadata::new(&args.bundle_id, &args.bundle_version, &args.name);

    let mut session = InstallSession::start(cfg, args.package.clone(), metadata, images)
        .context("start install session")?;
    let mut events = session
        .take_events()
        .context("session events already taken")?;

    tracing::info!(
        url = %session.endpoints().redirect_url(),
        "open this URL on the device"
    );
    println!("{}", session.endpoints().redirect_url());

    let (interrupt_tx, mut interrupt_rx) = mpsc::unbounded_channel::<()>();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })
    .context("install ctrl-c handler")?;

    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Status(status)) => {
                    tracing::info!(status = status.label(), "session status");
                    if status.is_terminal() {
                        break Outcome::Finished(status);
                    }
                }
                Some(SessionEvent::ClientDisconnected { path }) => {
                    tracing::warn!(path = %path, "client disconnected before response finished");
                }
                None => break Outcome::Closed,
            },
            _ = interrupt_rx.recv() => break Outcome::Interrupted,
        }
    };

    session.shutdown().await;

    let code = match outcome {
        Outcome::Finished(Status::Completed(Ok(bytes))) => {
            tracing::info!(bytes, "package delivered");
            ExitCode::SUCCESS
        }
        Outcome::Finished(Status::Completed(Err(err))) => {
            tracing::error!(error = %err, "package transfer failed");
            ExitCode::FAILURE
        }
        Outcome::Finished(Status::Broken(fault)) => {
            tracing::error!(error = %fault, "install server failed");
            ExitCode::FAILURE
        }
        Outcome::Finished(other) => {
            tracing::warn!(status = other.label(), "session ended early");
            ExitCode::FAILURE
        }
        Outcome::Interrupted => {
            tracing::info!("interrupted");
            ExitCode::SUCCESS
        }
        Outcome::Closed => {
            tracing::warn!("session event channel closed");
            ExitCode::FAILURE
        }
    };
    Ok(code)
}
