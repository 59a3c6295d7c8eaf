use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use bytes::BytesMut;
use onc_rpc::{TestClient, TestService};
use onc_rpc_core::{server_stub::handle_record, Error, Transport};

/// Answers calls in-process and counts how often it is released.
struct Loopback {
    replies: VecDeque<BytesMut>,
    shutdowns: Arc<AtomicUsize>,
}

impl Loopback {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let transport = Self {
            replies: VecDeque::new(),
            shutdowns: shutdowns.clone(),
        };
        (transport, shutdowns)
    }
}

impl Transport for Loopback {
    fn send_record(&mut self, record: &[u8]) -> Result<(), Error> {
        if let Some(reply) = handle_record(&TestService, record) {
            self.replies.push_back(reply);
        }
        Ok(())
    }

    fn recv_record(&mut self) -> Result<BytesMut, Error> {
        self.replies.pop_front().ok_or(Error::Closed)
    }

    fn shutdown(&mut self) -> Result<(), Error> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn deinitialize_releases_once() {
    let (transport, shutdowns) = Loopback::new();
    let mut client = TestClient::new(transport);
    assert_eq!(client.add(2, 3).unwrap(), 5);
    assert_eq!(shutdowns.load(Ordering::SeqCst), 0);

    onc_rpc::deinitialize(client).unwrap();
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn drop_releases_once() {
    let (transport, shutdowns) = Loopback::new();
    let mut client = TestClient::new(transport);
    assert_eq!(client.struct_combine(1, 2).unwrap().y, 2);
    drop(client);
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn unused_handle_is_released() {
    let (transport, shutdowns) = Loopback::new();
    TestClient::new(transport).deinitialize().unwrap();
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
}
