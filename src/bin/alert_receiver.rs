//! alert_receiver - reference webhook endpoint
//!
//! This service:
//! 1. Accepts `POST /alert` and stores each alert as a JSON file
//! 2. Answers `GET /health`
//! 3. Does NOT forward alerts anywhere

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use vision_alert::{ReceiverConfig, ReceiverServer};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Listen address.
    #[arg(long, env = "ALERT_RECEIVER_ADDR", default_value = "0.0.0.0:8000")]
    addr: String,
    /// Directory where received alerts are written.
    #[arg(long, env = "ALERT_RECEIVER_LOG_DIR", default_value = "alert_logs")]
    log_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let handle = ReceiverServer::new(ReceiverConfig {
        addr: args.addr,
        log_dir: args.log_dir.clone(),
    })
    .spawn()?;
    log::info!(
        "alert_receiver running. POST {} -> {}",
        handle.alert_url(),
        args.log_dir.display()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("alert_receiver waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!(
        "shutdown signal received, stopping receiver ({} alerts stored)...",
        handle.received()
    );
    handle.stop()?;

    Ok(())
}
