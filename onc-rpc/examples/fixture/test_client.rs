use std::net::{IpAddr, SocketAddr};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use onc_rpc::{MyStruct, ResultUnion, ResultUnionOther, TestClient};
use onc_rpc_core::{config::MAX_RECORD_SIZE, TransportConfig};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Calls the test program")]
struct Args {
    /// Server address; mutually exclusive with --host.
    #[arg(long, required_unless_present = "host")]
    server: Option<SocketAddr>,
    /// Host whose rpcbind knows where the server listens.
    #[arg(long, conflicts_with = "server")]
    host: Option<IpAddr>,
    #[command(subcommand)]
    call: Call,
}

#[derive(Subcommand, Debug)]
enum Call {
    Ping,
    Add { a: i32, b: i32 },
    MulFields { x: i32, y: i32 },
    Combine { x: i32, y: i32 },
    UnionTest { discriminant: i32 },
    /// Sends a union; `value` is read as a float when the discriminant is 20.
    UnionParam {
        #[arg(allow_negative_numbers = true)]
        discriminant: i32,
        #[arg(allow_negative_numbers = true)]
        value: Option<f32>,
    },
    /// Fetches `len` generated bytes without decoding the union around them.
    FillData { len: u32 },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .without_time()
        .init();
    let args = Args::parse();

    let mut client = match (args.server, args.host) {
        (Some(addr), _) => TestClient::connect(addr, TransportConfig::default()),
        (None, Some(host)) => TestClient::connect_via_rpcbind(host, TransportConfig::default()),
        (None, None) => bail!("either --server or --host is required"),
    }
    .context("failed to connect")?;

    match args.call {
        Call::Ping => {
            client.ping()?;
            println!("ok");
        }
        Call::Add { a, b } => println!("{}", client.add(a, b)?),
        Call::MulFields { x, y } => println!("{}", client.struct_mul_fields(&MyStruct { x, y })?),
        Call::Combine { x, y } => {
            let combined = client.struct_combine(x, y)?;
            println!("x={} y={}", combined.x, combined.y);
        }
        Call::UnionTest { discriminant } => {
            let result = client.union_test(discriminant)?;
            println!("{} {:?}", result.discriminant(), result.payload());
        }
        Call::UnionParam {
            discriminant,
            value,
        } => {
            let value = value.unwrap_or_default();
            let arg = match ResultUnionOther::new(discriminant) {
                Some(other) => ResultUnion::Other(other),
                None if discriminant == 20 => ResultUnion::FloatRes(value),
                None => ResultUnion::IntRes(value as i32),
            };
            info!(?arg, "sending union");
            println!("{}", client.union_param(&arg)?);
        }
        Call::FillData { len } => {
            let mut buf = vec![0; MAX_RECORD_SIZE];
            let raw = client.fill_data_raw(len, &mut buf)?;
            println!("{} {:02x?}", raw.discriminant, &buf[..raw.len]);
        }
    }

    onc_rpc::deinitialize(client)?;
    Ok(())
}
