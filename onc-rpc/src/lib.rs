//! A small ONC RPC test program: integer addition, struct arguments and
//! results, and a discriminated union passed in both directions.
//!
//! The wire types, the client and the service trait are generated from
//! `rpcl/test.x` at build time by `onc-rpcgen`.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use onc_rpc::{TestClient, TestService};
//! use onc_rpc_core::{Server, ServerConfig, TransportConfig};
//!
//! let server = Server::bind(ServerConfig::default(), Arc::new(TestService)).unwrap();
//! let (addr, _server) = server.spawn().unwrap();
//!
//! let mut client = TestClient::connect(addr, TransportConfig::default()).unwrap();
//! assert_eq!(client.add(2, 3).unwrap(), 5);
//! onc_rpc::deinitialize(client).unwrap();
//! ```

pub mod client;
pub mod protocol;
pub mod service;

pub use client::{deinitialize, TestClient};
pub use protocol::{DataResult, MyStruct, Payload, ResultUnion, ResultUnionOther};
pub use service::TestService;
