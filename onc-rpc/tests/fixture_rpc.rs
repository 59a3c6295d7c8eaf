use std::{net::SocketAddr, sync::Arc};

use onc_rpc::{
    DataResult, MyStruct, Payload, ResultUnion, ResultUnionOther, TestClient, TestService,
};
use onc_rpc_core::{
    rpcbind::{self, Registry},
    xdr::Opaque,
    ClientStub, Error, RawUnion, RpcProgram, Server, ServerConfig, ServerHandle, TransportConfig,
};
use tracing_subscriber::EnvFilter;

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

/// The server keeps running while the returned handle is alive.
fn client() -> (TestClient, ServerHandle) {
    init_tracing();
    let (addr, server) = spawn(Arc::new(TestService));
    (TestClient::connect(addr, TransportConfig::default()).unwrap(), server)
}

#[test]
fn addition() {
    let (mut client, _server) = client();
    assert_eq!(client.add(2, 3).unwrap(), 5);
    assert_eq!(client.add(-7, 7).unwrap(), 0);
    assert_eq!(client.add(i32::MAX, 1).unwrap(), i32::MIN);
    onc_rpc::deinitialize(client).unwrap();
}

#[test]
fn struct_param() {
    let (mut client, _server) = client();
    assert_eq!(client.struct_mul_fields(&MyStruct { x: 2, y: -5 }).unwrap(), -10);
    assert_eq!(client.struct_mul_fields(&MyStruct { x: 0, y: 9 }).unwrap(), 0);
    onc_rpc::deinitialize(client).unwrap();
}

#[test]
fn struct_return() {
    let (mut client, _server) = client();
    assert_eq!(client.struct_combine(5, -20).unwrap(), MyStruct { x: 5, y: -20 });
    onc_rpc::deinitialize(client).unwrap();
}

#[test]
fn union_return() {
    let (mut client, _server) = client();

    let result = client.union_test(20).unwrap();
    assert_eq!(result, ResultUnion::FloatRes(1.0));
    assert_eq!(result.discriminant(), 20);
    assert_eq!(result.payload(), Payload::Float(1.0));

    let result = client.union_test(0).unwrap();
    assert_eq!(result, ResultUnion::IntRes(1));
    assert_eq!(result.payload(), Payload::Int(1));

    for n in [-1, 7, 21] {
        let result = client.union_test(n).unwrap();
        assert_eq!(result, ResultUnion::err());
        assert_eq!(result.discriminant(), -1);
        assert_eq!(result.payload(), Payload::Int(0));
    }
    onc_rpc::deinitialize(client).unwrap();
}

#[test]
fn union_param() {
    let (mut client, _server) = client();
    assert_eq!(client.union_param(&ResultUnion::FloatRes(8.0)).unwrap(), 8);
    assert_eq!(client.union_param(&ResultUnion::FloatRes(2.75)).unwrap(), 2);
    assert_eq!(client.union_param(&ResultUnion::IntRes(-33)).unwrap(), -33);
    assert_eq!(client.union_param(&ResultUnion::err()).unwrap(), -1);
    let other = ResultUnionOther::new(3).unwrap();
    assert_eq!(client.union_param(&ResultUnion::Other(other)).unwrap(), -1);
    onc_rpc::deinitialize(client).unwrap();
}

#[test]
fn union_roundtrip() {
    let (mut client, _server) = client();
    for n in [0, 20, 5] {
        let result = client.union_test(n).unwrap();
        let expected = if n == 5 { -1 } else { 1 };
        assert_eq!(client.union_param(&result).unwrap(), expected);
    }
    onc_rpc::deinitialize(client).unwrap();
}

#[test]
fn byte_union_reply() {
    let (mut client, _server) = client();
    let DataResult::Data(Opaque(bytes)) = client.fill_data(5).unwrap() else {
        panic!("expected the data arm");
    };
    assert_eq!(bytes, [0, 1, 2, 3, 4]);

    let mut buf = [0xaa; 16];
    let raw = client.fill_data_raw(5, &mut buf).unwrap();
    assert_eq!(raw, RawUnion { discriminant: 0, len: 5 });
    assert_eq!(&buf[..6], &[0, 1, 2, 3, 4, 0xaa]);

    let raw = client.fill_data_raw(5000, &mut buf).unwrap();
    assert_eq!(raw, RawUnion { discriminant: -1, len: 0 });

    let err = client.fill_data_raw(17, &mut buf).unwrap_err();
    assert!(matches!(err, Error::BufferTooSmall { needed: 17, available: 16 }), "{err:?}");
    // a short buffer is not a transport failure
    assert_eq!(client.add(1, 1).unwrap(), 2);
    onc_rpc::deinitialize(client).unwrap();
}

#[test]
fn many_calls_on_one_connection() {
    let (mut client, _server) = client();
    client.ping().unwrap();
    for i in 0..100 {
        assert_eq!(client.add(i, i).unwrap(), 2 * i);
    }
    onc_rpc::deinitialize(client).unwrap();
}

#[test]
fn concurrent_clients() {
    init_tracing();
    let (addr, _server) = spawn(Arc::new(TestService));
    let workers: Vec<_> = (0..4)
        .map(|n| {
            std::thread::spawn(move || {
                let mut client = TestClient::connect(addr, TransportConfig::default()).unwrap();
                for i in 0..20 {
                    assert_eq!(client.add(n, i).unwrap(), n + i);
                }
                client.deinitialize().unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn unknown_procedure_and_version() {
    init_tracing();
    let (addr, _server) = spawn(Arc::new(TestService));
    let program = TestService.program();

    let mut stub = ClientStub::connect(addr, program, 1, TransportConfig::default()).unwrap();
    let err = stub.sync_call::<_, i32>(42, &(1, 2)).unwrap_err();
    assert!(matches!(err, Error::ProcUnavail), "{err:?}");
    // malformed arguments do not poison the connection
    let err = stub.sync_call::<_, i32>(1, &7).unwrap_err();
    assert!(matches!(err, Error::GarbageArgs), "{err:?}");
    assert_eq!(stub.sync_call::<_, i32>(1, &(1, 2)).unwrap(), 3);
    stub.deinitialize().unwrap();

    let mut stub = ClientStub::connect(addr, program, 2, TransportConfig::default()).unwrap();
    let err = stub.sync_call::<_, i32>(1, &(1, 2)).unwrap_err();
    assert!(matches!(err, Error::ProgMismatch { low: 1, high: 1 }), "{err:?}");
    stub.deinitialize().unwrap();
}

#[test]
fn located_through_rpcbind() {
    init_tracing();
    let (rpcbind_addr, _rpcbind) = spawn(Arc::new(Registry::new()));
    let (addr, _server) = spawn(Arc::new(TestService));
    let config = TransportConfig::default();

    let lookup = || {
        rpcbind::lookup(
            rpcbind_addr,
            TestService.program(),
            TestService.version(),
            config.clone(),
        )
    };
    assert!(matches!(lookup(), Err(Error::NotRegistered { .. })));

    let registered = rpcbind::register(
        rpcbind_addr,
        TestService.program(),
        TestService.version(),
        addr,
        config.clone(),
    )
    .unwrap();
    assert!(registered);

    let found = lookup().unwrap();
    assert_eq!(found, addr);
    let mut client = TestClient::connect(found, config.clone()).unwrap();
    assert_eq!(client.add(40, 2).unwrap(), 42);
    onc_rpc::deinitialize(client).unwrap();
}

#[test]
fn connects_through_rpcbind() {
    init_tracing();
    let (rpcbind_addr, _rpcbind) = spawn(Arc::new(Registry::new()));
    let (addr, _server) = spawn(Arc::new(TestService));
    let config = TransportConfig::default();

    assert!(matches!(
        TestClient::connect_with_rpcbind(rpcbind_addr, config.clone()),
        Err(Error::NotRegistered { .. })
    ));
    rpcbind::register(
        rpcbind_addr,
        TestService.program(),
        TestService.version(),
        addr,
        config.clone(),
    )
    .unwrap();

    let mut client = TestClient::connect_with_rpcbind(rpcbind_addr, config).unwrap();
    assert_eq!(client.union_param(&ResultUnion::FloatRes(8.0)).unwrap(), 8);
    onc_rpc::deinitialize(client).unwrap();
}
