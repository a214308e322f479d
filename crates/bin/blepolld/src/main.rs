//! # blepolld — blepoll daemon
//!
//! Composition root that wires a radio backend to the request gate and
//! speaks JSON lines.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialise logging to stderr
//! - Open the radio backend (btleplug or the virtual demo radio)
//! - Spawn the request gate
//! - Read requests from stdin, optionally inject periodic requests
//! - Write readings to stdout as JSON lines
//! - Close the gate on Ctrl-C
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;
mod io;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::time::Interval;
use tracing_subscriber::EnvFilter;

use blepoll_adapter_btleplug::BtleplugRadio;
use blepoll_adapter_virtual::VirtualRadio;
use blepoll_app::outbound::ChannelSink;
use blepoll_app::ports::Radio;
use blepoll_app::services::request_gate::{GateConfig, RequestGate};
use blepoll_domain::request::Request;

use crate::config::{Backend, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .with_writer(std::io::stderr)
        .init();

    let gate = config.gate()?;
    let poll = config.poll_interval();
    match config.radio.backend {
        Backend::Btleplug => {
            let radio = BtleplugRadio::first_adapter().await?;
            serve(Arc::new(radio), gate, poll).await
        }
        Backend::Virtual => {
            tracing::info!("using the virtual demo radio");
            serve(Arc::new(VirtualRadio::demo()), gate, poll).await
        }
    }
}

async fn serve<R: Radio>(
    radio: Arc<R>,
    gate_config: GateConfig,
    poll: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (sink, mut outbound) = ChannelSink::new();
    let (gate, gate_task) = RequestGate::spawn(radio, sink, gate_config);

    let mut requests = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut stdout = tokio::io::stdout();
    let mut ticker = poll.map(tokio::time::interval);
    tracing::info!(?poll, "blepolld ready");

    loop {
        tokio::select! {
            line = requests.next_line(), if stdin_open => match line? {
                Some(line) => match io::parse_request(&line) {
                    Ok(request) => {
                        gate.request(request);
                    }
                    Err(err) => tracing::warn!(%err, "ignoring malformed request"),
                },
                None => {
                    tracing::debug!("stdin closed");
                    stdin_open = false;
                }
            },
            () = tick(ticker.as_mut()) => {
                gate.request(Request::default());
            }
            Some(message) = outbound.recv() => io::emit(&mut stdout, message).await?,
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("shutting down");
                break;
            }
        }
    }

    gate.close().await;
    gate_task.await?;
    while let Ok(message) = outbound.try_recv() {
        io::emit(&mut stdout, message).await?;
    }
    Ok(())
}

async fn tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
