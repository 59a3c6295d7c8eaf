//! ONC RPC ([RFC 5531]) over TCP with XDR ([RFC 4506]) encoding.
//!
//! Programs implement [`RpcProgram`] and are served by [`Server`]; callers
//! hold a [`ClientStub`] bound to one program version.
//!
//! [RFC 5531]: https://datatracker.ietf.org/doc/html/rfc5531
//! [RFC 4506]: https://datatracker.ietf.org/doc/html/rfc4506

pub mod client_stub;
pub mod config;
pub mod error;
pub mod messages;
pub mod record;
pub mod rpcbind;
pub mod server_stub;
pub mod transport;
pub mod xdr;

pub use client_stub::{ClientStub, RawUnion};
pub use config::{ServerConfig, TransportConfig};
pub use error::Error;
pub use server_stub::{call_procedure, DispatchError, RpcProgram, Server, ServerHandle};
pub use transport::{TcpTransport, Transport};
