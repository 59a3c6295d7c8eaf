use std::{
    io::Write,
    net::{SocketAddr, TcpStream},
    sync::Arc,
    thread,
    time::Duration,
};

use bytes::BytesMut;
use onc_rpc_core::{
    call_procedure,
    config::LOCAL_HOST,
    record,
    messages::{AcceptStat, RpcMessage},
    rpcbind::{self, Registry},
    xdr, ClientStub, DispatchError, Error, RpcProgram, Server, ServerConfig, ServerHandle,
    TcpTransport, TransportConfig,
};
use tracing_subscriber::EnvFilter;

struct Concat;

impl RpcProgram for Concat {
    fn program(&self) -> u32 {
        0x2000_00aa
    }

    fn version(&self) -> u32 {
        3
    }

    fn dispatch(
        &self,
        procedure: u32,
        args: &[u8],
        results: &mut BytesMut,
    ) -> Result<(), DispatchError> {
        match procedure {
            1 => call_procedure(args, results, |(a, b): (String, String)| a + &b),
            // sleeps for the given number of milliseconds, then echoes it
            2 => call_procedure(args, results, |ms: u32| {
                thread::sleep(Duration::from_millis(ms.into()));
                ms
            }),
            _ => Err(DispatchError::ProcUnavail(procedure)),
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .without_time()
        .with_test_writer()
        .try_init();
}

fn spawn(program: Arc<dyn RpcProgram>) -> (SocketAddr, ServerHandle) {
    let server = Server::bind(ServerConfig::default(), program).unwrap();
    server.spawn().unwrap()
}

#[test]
fn calls_over_tcp() {
    init_tracing();
    let (addr, _server) = spawn(Arc::new(Concat));
    let mut client = ClientStub::connect(addr, 0x2000_00aa, 3, TransportConfig::default()).unwrap();

    client.ping().unwrap();
    let joined: String = client.sync_call(1, &("onc", "-rpc")).unwrap();
    assert_eq!(joined, "onc-rpc");
    assert!(matches!(client.sync_call::<_, ()>(9, &()), Err(Error::ProcUnavail)));
    // the connection survives a failed call
    let joined: String = client.sync_call(1, &("a", "b")).unwrap();
    assert_eq!(joined, "ab");

    client.deinitialize().unwrap();
}

#[test]
fn large_records_are_fragmented() {
    init_tracing();
    let (addr, _server) = spawn(Arc::new(Concat));
    let config = TransportConfig {
        max_fragment_size: 16,
        ..TransportConfig::default()
    };
    let mut client = ClientStub::connect(addr, 0x2000_00aa, 3, config).unwrap();
    let long = "x".repeat(1000);
    let joined: String = client.sync_call(1, &(long.as_str(), "!")).unwrap();
    assert_eq!(joined.len(), 1001);
}

#[test]
fn wrong_version_over_tcp() {
    init_tracing();
    let (addr, _server) = spawn(Arc::new(Concat));
    let mut client = ClientStub::connect(addr, 0x2000_00aa, 1, TransportConfig::default()).unwrap();
    assert!(matches!(
        client.ping(),
        Err(Error::ProgMismatch { low: 3, high: 3 })
    ));
}

#[test]
fn server_skips_garbage_records() {
    init_tracing();
    let (addr, _server) = spawn(Arc::new(Concat));

    let stream = TcpStream::connect(addr).unwrap();
    let mut raw = stream.try_clone().unwrap();
    let mut wire = Vec::new();
    // too short for a header, then a reply that no server answers
    record::write_record(&mut wire, &[1, 2, 3], 1024).unwrap();
    let stray_reply = xdr::to_bytes(&RpcMessage::accepted(77, AcceptStat::Success)).unwrap();
    record::write_record(&mut wire, &stray_reply, 1024).unwrap();
    raw.write_all(&wire).unwrap();

    // same connection, still answering
    let transport = TcpTransport::from_stream(stream, TransportConfig::default()).unwrap();
    let mut client = ClientStub::new(transport, 0x2000_00aa, 3);
    client.ping().unwrap();
    let joined: String = client.sync_call(1, &("still", " here")).unwrap();
    assert_eq!(joined, "still here");
    client.deinitialize().unwrap();
}

#[test]
fn late_reply_does_not_poison_the_connection() {
    init_tracing();
    let (addr, _server) = spawn(Arc::new(Concat));
    let config = TransportConfig {
        read_timeout: Some(Duration::from_millis(300)),
        ..TransportConfig::default()
    };
    let mut client = ClientStub::connect(addr, 0x2000_00aa, 3, config).unwrap();

    let err = client.sync_call::<_, u32>(2, &400u32).unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
    // the late reply to the call above arrives first and is skipped
    assert_eq!(client.sync_call::<_, u32>(2, &1u32).unwrap(), 1);
    assert_eq!(client.sync_call::<_, u32>(2, &2u32).unwrap(), 2);
    client.deinitialize().unwrap();
}

#[test]
fn stopped_server_refuses_connections() {
    init_tracing();
    let (addr, server) = spawn(Arc::new(Concat));
    let mut client = ClientStub::connect(addr, 0x2000_00aa, 3, TransportConfig::default()).unwrap();
    client.ping().unwrap();

    server.stop().unwrap();
    // accepted connections outlive the listener
    client.ping().unwrap();
    client.deinitialize().unwrap();

    let config = TransportConfig {
        connect_timeout: Some(Duration::from_millis(200)),
        ..TransportConfig::default()
    };
    assert!(matches!(
        ClientStub::connect(addr, 0x2000_00aa, 3, config),
        Err(Error::Io(_))
    ));
}

#[test]
fn rpcbind_lookup_and_registration() {
    init_tracing();
    let (rpcbind_addr, _rpcbind) = spawn(Arc::new(Registry::new()));
    let service_addr = SocketAddr::from((LOCAL_HOST, 4242));
    let config = TransportConfig::default();

    assert!(matches!(
        rpcbind::lookup(rpcbind_addr, 0x2000_00aa, 3, config.clone()),
        Err(Error::NotRegistered { program: 0x2000_00aa, version: 3 })
    ));
    assert!(rpcbind::register(rpcbind_addr, 0x2000_00aa, 3, service_addr, config.clone()).unwrap());
    assert!(!rpcbind::register(rpcbind_addr, 0x2000_00aa, 3, service_addr, config.clone()).unwrap());
    assert_eq!(
        rpcbind::lookup(rpcbind_addr, 0x2000_00aa, 3, config.clone()).unwrap(),
        service_addr
    );
    assert!(rpcbind::unregister(rpcbind_addr, 0x2000_00aa, 3, config.clone()).unwrap());
    assert!(rpcbind::lookup(rpcbind_addr, 0x2000_00aa, 3, config).is_err());
}
