//! Reliable UDP HTTP client
//!
//! Connects to the server, issues a GET and a POST, prints each response and
//! closes the connection.

use anyhow::Context;
use clap::Parser;
use rudp::{Delivery, Endpoint, Transport};
use rudp_cli::{format_bytes, init_logging, summarize, CommonArgs, EngineKind, Request, Response};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "rudp-client")]
#[command(about = "HTTP-style client over reliable UDP", long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long)]
    server: Option<SocketAddr>,

    /// Local bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// ARQ engine
    #[arg(short, long, value_enum)]
    engine: Option<EngineKind>,

    /// Path for the GET request
    #[arg(long, default_value = "/index.html")]
    get: String,

    /// Path for the POST request
    #[arg(long, default_value = "/submit")]
    post: String,

    /// Body of the POST request
    #[arg(long, default_value = "name=Project")]
    body: String,

    #[command(flatten)]
    common: CommonArgs,
}

/// Send one request and wait for its response
fn exchange(transport: &mut dyn Transport, request: &Request) -> anyhow::Result<Response> {
    transport
        .send(&request.to_bytes())
        .with_context(|| format!("{} {} not delivered", request.method, request.path))?;

    match transport.receive()? {
        Delivery::Data(data) => {
            tracing::debug!("Response of {}", format_bytes(data.len() as u64));
            Ok(Response::parse(&data)?)
        }
        Delivery::EndOfStream => anyhow::bail!("Server closed the connection"),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.common.verbose);

    let config = args.common.load().context("Failed to load configuration")?;
    let server = args.server.unwrap_or(config.client.server);
    let bind = args.bind.unwrap_or(config.client.bind);
    let engine = args.engine.unwrap_or(config.client.engine);

    let mut endpoint = Endpoint::bind(bind, config.transport.clone())
        .with_context(|| format!("Failed to bind {}", bind))?;
    endpoint
        .connect(server)
        .with_context(|| format!("Failed to connect to {}", server))?;
    let mut transport = engine.open(endpoint)?;

    for request in [Request::get(&args.get), Request::post(&args.post, &args.body)] {
        let response = exchange(transport.as_mut(), &request)?;
        println!("Received:\n{}", String::from_utf8_lossy(&response.to_bytes()));
    }

    transport.close().context("Teardown failed")?;
    tracing::info!(
        "Session: {}",
        summarize(&transport.stats(), &transport.endpoint().channel_stats())
    );
    Ok(())
}
