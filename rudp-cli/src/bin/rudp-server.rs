//! Reliable UDP HTTP server
//!
//! Accepts one connection at a time, answers HTTP-style requests until the
//! client closes, then waits for the next handshake.

use anyhow::Context;
use clap::Parser;
use rudp::{Delivery, Endpoint, Transport, TransportError};
use rudp_cli::{init_logging, respond, summarize, CommonArgs, EngineKind, Request};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "rudp-server")]
#[command(about = "HTTP-style server over reliable UDP", long_about = None)]
struct Args {
    /// Listen address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// ARQ engine
    #[arg(short, long, value_enum)]
    engine: Option<EngineKind>,

    #[command(flatten)]
    common: CommonArgs,
}

/// Answer requests until end of stream
fn serve(transport: &mut dyn Transport) -> rudp::Result<()> {
    loop {
        let data = match transport.receive()? {
            Delivery::Data(data) => data,
            Delivery::EndOfStream => return Ok(()),
        };

        let request = match Request::parse(&data) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, len = data.len(), "Dropping unparseable request");
                continue;
            }
        };
        tracing::info!(method = %request.method, path = %request.path, "Request");

        let response = respond(&request);
        transport.send(&response.to_bytes())?;
        tracing::info!(status = response.status, "Response sent");
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.common.verbose);

    let config = args.common.load().context("Failed to load configuration")?;
    let bind = args.bind.unwrap_or(config.server.bind);
    let engine = args.engine.unwrap_or(config.server.engine);

    let mut endpoint = Endpoint::bind(bind, config.transport.clone())
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!(
        "HTTP server listening on {} ({:?}, loss={}, corrupt={})",
        endpoint.local_addr()?,
        engine,
        config.transport.loss_probability,
        config.transport.corruption_probability
    );

    loop {
        let peer = endpoint.accept().context("Handshake failed")?;
        let mut transport = engine.open(endpoint)?;

        match serve(transport.as_mut()) {
            Ok(()) => tracing::info!(%peer, "Client closed the connection"),
            Err(e @ TransportError::RetriesExhausted { .. }) => {
                tracing::warn!(%peer, error = %e, "Abandoning connection")
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(
            "Session: {}",
            summarize(&transport.stats(), &transport.endpoint().channel_stats())
        );

        endpoint = transport.into_endpoint();
    }
}
