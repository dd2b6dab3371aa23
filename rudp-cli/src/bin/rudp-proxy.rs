//! TCP to reliable UDP bridge
//!
//! For each TCP connection: read one request, relay it over a fresh reliable
//! UDP connection, write the single response back and close both sides.

use anyhow::Context;
use clap::Parser;
use rudp::{Delivery, Endpoint};
use rudp_cli::{format_bytes, init_logging, CommonArgs, Config, EngineKind};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

#[derive(Parser, Debug)]
#[command(name = "rudp-proxy")]
#[command(about = "Relay TCP requests to a reliable UDP server", long_about = None)]
struct Args {
    /// TCP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Reliable UDP server address
    #[arg(short, long)]
    server: Option<SocketAddr>,

    /// ARQ engine
    #[arg(short, long, value_enum)]
    engine: Option<EngineKind>,

    #[command(flatten)]
    common: CommonArgs,
}

/// Relay one TCP request and its response
fn relay(
    mut stream: TcpStream,
    config: &Config,
    server: SocketAddr,
    engine: EngineKind,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; config.proxy.buffer_size];
    let n = stream.read(&mut buf).context("TCP read failed")?;
    if n == 0 {
        tracing::debug!("TCP client sent nothing");
        return Ok(());
    }
    tracing::info!("Relaying {} request", format_bytes(n as u64));

    let mut endpoint = Endpoint::bind(config.proxy.bind, config.transport.clone())?;
    endpoint
        .connect(server)
        .with_context(|| format!("Failed to connect to {}", server))?;
    let mut transport = engine.open(endpoint)?;

    transport.send(&buf[..n])?;
    let response = match transport.receive()? {
        Delivery::Data(data) => data,
        Delivery::EndOfStream => anyhow::bail!("Server closed before responding"),
    };
    stream.write_all(&response).context("TCP write failed")?;
    tracing::info!("Returned {} response", format_bytes(response.len() as u64));

    transport.close()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.common.verbose);

    let config = args.common.load().context("Failed to load configuration")?;
    let listen = args.listen.unwrap_or(config.proxy.listen);
    let server = args.server.unwrap_or(config.proxy.server);
    let engine = args.engine.unwrap_or(config.proxy.engine);

    let listener =
        TcpListener::bind(listen).with_context(|| format!("Failed to listen on {}", listen))?;
    tracing::info!("Proxy listening on TCP {} -> UDP {}", listen, server);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Accept failed");
                continue;
            }
        };
        let peer = stream.peer_addr().ok();
        if let Err(e) = relay(stream, &config, server, engine) {
            tracing::error!(?peer, error = %e, "Relay failed");
        }
    }
    Ok(())
}
