use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use clap::Parser;
use onc_rpc::TestService;
use onc_rpc_core::{
    config::{MAX_FRAGMENT_SIZE, MAX_RECORD_SIZE},
    rpcbind::{self, Registry},
    RpcProgram, Server, ServerConfig, TransportConfig,
};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Serves the test program over TCP")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:0")]
    bind: SocketAddr,
    /// Register with the rpcbind service at this address.
    #[arg(long)]
    rpcbind: Option<SocketAddr>,
    /// Also run an in-process rpcbind on this address and register with it.
    #[arg(long, conflicts_with = "rpcbind")]
    embedded_rpcbind: Option<SocketAddr>,
    #[arg(long, default_value_t = MAX_RECORD_SIZE)]
    max_record_size: usize,
    #[arg(long, default_value_t = MAX_FRAGMENT_SIZE)]
    max_fragment_size: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .without_time()
        .init();
    let args = Args::parse();

    let transport = TransportConfig {
        max_record_size: args.max_record_size,
        max_fragment_size: args.max_fragment_size,
        read_timeout: None,
        ..TransportConfig::default()
    };
    let config = ServerConfig {
        bind_addr: args.bind,
        transport: transport.clone(),
    };
    let server = Server::bind(config, Arc::new(TestService)).context("failed to bind")?;
    let addr = server.local_addr()?;

    // kept alive until the test server exits
    let embedded = match args.embedded_rpcbind {
        Some(bind_addr) => {
            let config = ServerConfig {
                bind_addr,
                transport: transport.clone(),
            };
            let registry =
                Server::bind(config, Arc::new(Registry::new())).context("failed to bind rpcbind")?;
            Some(registry.spawn()?)
        }
        None => None,
    };
    let rpcbind_addr = embedded.as_ref().map(|(addr, _)| *addr).or(args.rpcbind);
    if let Some(rpcbind_addr) = rpcbind_addr {
        let registered = rpcbind::register(
            rpcbind_addr,
            TestService.program(),
            TestService.version(),
            addr,
            TransportConfig::default(),
        )
        .context("rpcbind registration failed")?;
        info!(%rpcbind_addr, registered, "registered with rpcbind");
    }

    info!(%addr, "serving test program");
    server.serve()?;
    Ok(())
}
