use std::net::{IpAddr, SocketAddr};

use bytes::BytesMut;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::TransportConfig,
    error::Error,
    messages::{
        AcceptStat, AcceptedReply, MessageBody, OpaqueAuth, RejectedReply, ReplyBody, RpcMessage,
        NULL_PROCEDURE,
    },
    rpcbind,
    transport::{TcpTransport, Transport},
    xdr,
};

/// Result of [`ClientStub::sync_call_raw_union`]: the union's discriminant and
/// how many bytes of its arm were copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawUnion {
    pub discriminant: i32,
    pub len: usize,
}

/// Client handle bound to one program version on one connection.
///
/// The connection is released exactly once: by [`ClientStub::deinitialize`],
/// or on drop when the handle was never deinitialized.
pub struct ClientStub<T: Transport = TcpTransport> {
    // `None` once released
    transport: Option<T>,
    program: u32,
    version: u32,
    next_xid: u32,
    cred: OpaqueAuth,
}

impl ClientStub<TcpTransport> {
    pub fn connect(
        addr: SocketAddr,
        program: u32,
        version: u32,
        config: TransportConfig,
    ) -> Result<Self, Error> {
        let transport = TcpTransport::connect(addr, config)?;
        info!(%addr, program, version, "initialized connection");
        Ok(Self::new(transport, program, version))
    }

    /// Asks the rpcbind service on `host` where the program listens, then
    /// connects there.
    pub fn connect_via_rpcbind(
        host: IpAddr,
        program: u32,
        version: u32,
        config: TransportConfig,
    ) -> Result<Self, Error> {
        let rpcbind_addr = SocketAddr::new(host, rpcbind::RPCBIND_PORT);
        Self::connect_with_rpcbind(rpcbind_addr, program, version, config)
    }

    /// Like [`ClientStub::connect_via_rpcbind`], with rpcbind listening on
    /// `rpcbind_addr` instead of the well-known port.
    pub fn connect_with_rpcbind(
        rpcbind_addr: SocketAddr,
        program: u32,
        version: u32,
        config: TransportConfig,
    ) -> Result<Self, Error> {
        let addr = rpcbind::lookup(rpcbind_addr, program, version, config.clone())?;
        Self::connect(addr, program, version, config)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref()?.peer_addr().ok()
    }
}

impl<T: Transport> ClientStub<T> {
    pub fn new(transport: T, program: u32, version: u32) -> Self {
        Self {
            transport: Some(transport),
            program,
            version,
            next_xid: rand::random(),
            cred: OpaqueAuth::none(),
        }
    }

    pub fn with_credentials(mut self, cred: OpaqueAuth) -> Self {
        self.cred = cred;
        self
    }

    pub fn program(&self) -> u32 {
        self.program
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn ping(&mut self) -> Result<(), Error> {
        self.sync_call(NULL_PROCEDURE, &())
    }

    pub fn sync_call<A, R>(&mut self, procedure: u32, args: &A) -> Result<R, Error>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let results = self.call(procedure, args)?;
        Ok(xdr::from_bytes(&results)?)
    }

    /// Calls a procedure that returns a union of byte arms and copies the
    /// arm's bytes into `buf` without decoding the union. A void arm leaves
    /// `buf` untouched and reports a length of 0.
    pub fn sync_call_raw_union<A>(
        &mut self,
        procedure: u32,
        args: &A,
        buf: &mut [u8],
    ) -> Result<RawUnion, Error>
    where
        A: Serialize + ?Sized,
    {
        let results = self.call(procedure, args)?;
        let (discriminant, rest): (i32, &[u8]) = xdr::from_bytes_partial(&results)?;
        if rest.is_empty() {
            return Ok(RawUnion {
                discriminant,
                len: 0,
            });
        }
        // opaque<> and string<> arms share the length-prefixed layout
        let data: &[u8] = xdr::from_bytes(rest)?;
        let available = buf.len();
        let dest = buf.get_mut(..data.len()).ok_or(Error::BufferTooSmall {
            needed: data.len(),
            available,
        })?;
        dest.copy_from_slice(data);
        Ok(RawUnion {
            discriminant,
            len: data.len(),
        })
    }

    /// Runs one call and returns the encoded results of a successful reply.
    fn call<A>(&mut self, procedure: u32, args: &A) -> Result<BytesMut, Error>
    where
        A: Serialize + ?Sized,
    {
        let xid = self.next_xid;
        self.next_xid = self.next_xid.wrapping_add(1);

        let mut call = RpcMessage::call(xid, self.program, self.version, procedure);
        if let MessageBody::Call(body) = &mut call.body {
            body.cred = self.cred.clone();
        }
        let mut record = BytesMut::new();
        xdr::to_buffer(&call, &mut record)?;
        xdr::to_buffer(args, &mut record)?;

        let (body, results) = match self.exchange(xid, procedure, &record) {
            Ok(reply) => reply,
            Err(err) => {
                if !err.is_timeout() {
                    self.abandon(&err);
                }
                return Err(err);
            }
        };
        match body {
            ReplyBody::Accepted(AcceptedReply { stat, .. }) => match stat {
                AcceptStat::Success => Ok(results),
                AcceptStat::ProgUnavail => Err(Error::ProgUnavail),
                AcceptStat::ProgMismatch { low, high } => Err(Error::ProgMismatch { low, high }),
                AcceptStat::ProcUnavail => Err(Error::ProcUnavail),
                AcceptStat::GarbageArgs => Err(Error::GarbageArgs),
                AcceptStat::SystemErr => Err(Error::SystemErr),
            },
            ReplyBody::Denied(RejectedReply::RpcMismatch { low, high }) => {
                Err(Error::RpcMismatch { low, high })
            }
            ReplyBody::Denied(RejectedReply::AuthError(stat)) => Err(Error::AuthError(stat)),
        }
    }

    /// Sends one call record and waits for its reply. Replies to earlier
    /// calls that timed out are skipped.
    fn exchange(
        &mut self,
        xid: u32,
        procedure: u32,
        record: &[u8],
    ) -> Result<(ReplyBody, BytesMut), Error> {
        let transport = self.transport.as_mut().ok_or(Error::Closed)?;
        // a write that fails part way leaves a torn record behind
        transport.send_record(record).map_err(|err| match err {
            Error::Io(err) => Error::Broken(err),
            other => other,
        })?;
        debug!(xid, procedure, "sent call");

        loop {
            let mut reply = transport.recv_record()?;
            let (message, rest): (RpcMessage, &[u8]) = xdr::from_bytes_partial(&reply)?;
            let header_len = reply.len() - rest.len();
            if message.xid != xid {
                if is_earlier(message.xid, xid) {
                    debug!(xid, stale = message.xid, "discarding late reply");
                    continue;
                }
                return Err(Error::XidMismatch {
                    expected: xid,
                    got: message.xid,
                });
            }
            let body = match message.body {
                MessageBody::Reply(body) => body,
                MessageBody::Call(_) => return Err(Error::UnexpectedMessage),
            };
            let results = reply.split_off(header_len);
            return Ok((body, results));
        }
    }

    /// Drops a connection that can no longer be trusted to carry records.
    fn abandon(&mut self, err: &Error) {
        if let Some(mut transport) = self.transport.take() {
            warn!(program = self.program, "abandoning connection after {err}");
            if let Err(err) = transport.shutdown() {
                debug!("failed to shut down abandoned connection, {err}");
            }
        }
    }

    /// Releases the connection held by this handle.
    pub fn deinitialize(mut self) -> Result<(), Error> {
        self.release()
    }

    fn release(&mut self) -> Result<(), Error> {
        if let Some(mut transport) = self.transport.take() {
            transport.shutdown()?;
            info!(program = self.program, "closed connection");
        }
        Ok(())
    }
}

/// Whether `xid` was issued before `current`, allowing for wrap-around.
fn is_earlier(xid: u32, current: u32) -> bool {
    let distance = current.wrapping_sub(xid);
    distance != 0 && distance <= i32::MAX as u32
}

impl<T: Transport> Drop for ClientStub<T> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("failed to close connection, {err}");
        }
    }
}
