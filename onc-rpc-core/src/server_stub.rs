use std::{
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    config::{ServerConfig, TransportConfig, LOCAL_HOST},
    error::Error,
    messages::{
        AcceptStat, AuthStat, CallBody, MessageBody, OpaqueAuth, RejectedReply, RpcMessage,
        AUTH_NONE, AUTH_SYS, MAX_AUTH_BYTES, NULL_PROCEDURE, RPC_VERSION,
    },
    transport::{TcpTransport, Transport},
    xdr,
};

/// One version of an RPC program, as seen by the server.
pub trait RpcProgram: Send + Sync {
    fn program(&self) -> u32;
    fn version(&self) -> u32;

    /// Runs `procedure` on the XDR-encoded `args`, appending the encoded
    /// result to `results`. The NULL procedure is answered by the server and
    /// never reaches this method.
    fn dispatch(&self, procedure: u32, args: &[u8], results: &mut BytesMut)
        -> Result<(), DispatchError>;
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("procedure {0} is not implemented")]
    ProcUnavail(u32),
    #[error("failed to decode arguments, {0}")]
    GarbageArgs(xdr::Error),
    #[error("procedure failed, {0}")]
    SystemErr(String),
}

impl From<DispatchError> for AcceptStat {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::ProcUnavail(_) => AcceptStat::ProcUnavail,
            DispatchError::GarbageArgs(_) => AcceptStat::GarbageArgs,
            DispatchError::SystemErr(_) => AcceptStat::SystemErr,
        }
    }
}

/// Decodes `args`, runs `procedure` and encodes what it returns.
///
/// Each call gets its own result value; nothing is shared between calls.
pub fn call_procedure<'a, A, R, F>(
    args: &'a [u8],
    results: &mut BytesMut,
    procedure: F,
) -> Result<(), DispatchError>
where
    A: Deserialize<'a>,
    R: Serialize,
    F: FnOnce(A) -> R,
{
    let args = xdr::from_bytes(args).map_err(DispatchError::GarbageArgs)?;
    let result = procedure(args);
    xdr::to_buffer(&result, results).map_err(|err| DispatchError::SystemErr(err.to_string()))
}

pub struct Server {
    listener: TcpListener,
    program: Arc<dyn RpcProgram>,
    transport: TransportConfig,
    stopped: Arc<AtomicBool>,
}

impl Server {
    pub fn bind(config: ServerConfig, program: Arc<dyn RpcProgram>) -> Result<Self, Error> {
        let listener = TcpListener::bind(config.bind_addr)?;
        info!(
            addr = %listener.local_addr()?,
            program = program.program(),
            version = program.version(),
            "server listening"
        );
        Ok(Self {
            listener,
            program,
            transport: config.transport,
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections, one thread per connection, until the
    /// [`ServerHandle`] from [`Server::spawn`] stops it. Connections already
    /// accepted run until their client hangs up.
    pub fn serve(self) -> Result<(), Error> {
        for stream in self.listener.incoming() {
            if self.stopped.load(Ordering::Acquire) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let program = Arc::clone(&self.program);
                    let config = self.transport.clone();
                    thread::Builder::new()
                        .name("rpc-connection".into())
                        .spawn(move || handle_connection(stream, program.as_ref(), config))?;
                }
                Err(err) => warn!("failed to accept connection, {err}"),
            }
        }
        info!(program = self.program.program(), "server stopped");
        Ok(())
    }

    /// Runs [`Server::serve`] on a background thread. The server stops when
    /// the returned handle is stopped or dropped.
    pub fn spawn(self) -> Result<(SocketAddr, ServerHandle), Error> {
        let addr = self.local_addr()?;
        let stopped = Arc::clone(&self.stopped);
        let thread = thread::Builder::new()
            .name("rpc-server".into())
            .spawn(move || self.serve())?;
        let handle = ServerHandle {
            addr,
            stopped,
            thread: Some(thread),
        };
        Ok((addr, handle))
    }
}

/// Owns a server started by [`Server::spawn`].
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    stopped: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), Error>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting connections and waits for the accept loop to exit.
    pub fn stop(mut self) -> Result<(), Error> {
        self.halt()
    }

    fn halt(&mut self) -> Result<(), Error> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.stopped.store(true, Ordering::Release);
        // wake the blocking accept
        let mut wake = self.addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(LOCAL_HOST.into());
        }
        if let Err(err) = TcpStream::connect(wake) {
            warn!(addr = %wake, "failed to wake the server, {err}");
            return Err(err.into());
        }
        match thread.join() {
            Ok(result) => result,
            Err(_) => {
                error!(addr = %self.addr, "server thread panicked");
                Ok(())
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(err) = self.halt() {
            warn!(addr = %self.addr, "failed to stop server, {err}");
        }
    }
}

fn handle_connection(stream: TcpStream, program: &dyn RpcProgram, config: TransportConfig) {
    let peer = stream.peer_addr().ok();
    debug!(?peer, "new connection");
    let mut transport = match TcpTransport::from_stream(stream, config) {
        Ok(transport) => transport,
        Err(err) => {
            warn!(?peer, "failed to set up connection, {err}");
            return;
        }
    };

    loop {
        let record = match transport.recv_record() {
            Ok(record) => record,
            Err(Error::Closed) => {
                debug!(?peer, "connection closed");
                break;
            }
            Err(err) => {
                warn!(?peer, "failed to receive record, {err}");
                break;
            }
        };
        let Some(reply) = handle_record(program, &record) else {
            continue;
        };
        if let Err(err) = transport.send_record(&reply) {
            warn!(?peer, "failed to send reply, {err}");
            break;
        }
    }

    if let Err(err) = transport.shutdown() {
        debug!(?peer, "failed to shut down connection, {err}");
    }
}

/// Answers one call record. Records that are not decodable calls get no
/// reply.
pub fn handle_record(program: &dyn RpcProgram, record: &[u8]) -> Option<BytesMut> {
    let (message, args): (RpcMessage, &[u8]) = match xdr::from_bytes_partial(record) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!("dropping record with an undecodable header, {err}");
            return None;
        }
    };
    let xid = message.xid;
    let call = match message.body {
        MessageBody::Call(call) => call,
        MessageBody::Reply(_) => {
            warn!(xid, "ignoring reply sent to a server");
            return None;
        }
    };

    let mut results = BytesMut::new();
    let reply = execute(program, xid, &call, args, &mut results);
    let mut record = BytesMut::new();
    if let Err(err) = xdr::to_buffer(&reply, &mut record) {
        error!(xid, "failed to encode reply header, {err}");
        return None;
    }
    record.extend_from_slice(&results);
    Some(record)
}

fn execute(
    program: &dyn RpcProgram,
    xid: u32,
    call: &CallBody,
    args: &[u8],
    results: &mut BytesMut,
) -> RpcMessage {
    if call.rpc_version != RPC_VERSION {
        return RpcMessage::denied(
            xid,
            RejectedReply::RpcMismatch {
                low: RPC_VERSION,
                high: RPC_VERSION,
            },
        );
    }
    if let Err(stat) = check_auth(&call.cred, &call.verf) {
        return RpcMessage::denied(xid, RejectedReply::AuthError(stat));
    }

    let stat = if call.program != program.program() {
        AcceptStat::ProgUnavail
    } else if call.version != program.version() {
        AcceptStat::ProgMismatch {
            low: program.version(),
            high: program.version(),
        }
    } else if call.procedure == NULL_PROCEDURE {
        AcceptStat::Success
    } else {
        match program.dispatch(call.procedure, args, results) {
            Ok(()) => AcceptStat::Success,
            Err(err) => {
                warn!(xid, procedure = call.procedure, "{err}");
                results.clear();
                err.into()
            }
        }
    };
    debug!(xid, procedure = call.procedure, ?stat, "handled call");
    RpcMessage::accepted(xid, stat)
}

/// AUTH_NONE and AUTH_SYS are accepted without inspecting the body.
fn check_auth(cred: &OpaqueAuth, verf: &OpaqueAuth) -> Result<(), AuthStat> {
    if cred.body.len() > MAX_AUTH_BYTES {
        return Err(AuthStat::BadCred);
    }
    if verf.body.len() > MAX_AUTH_BYTES {
        return Err(AuthStat::BadVerf);
    }
    match cred.flavor {
        AUTH_NONE | AUTH_SYS => Ok(()),
        _ => Err(AuthStat::RejectedCred),
    }
}
