use onc_rpc_core::{Error, TcpTransport, Transport};

use crate::protocol::TestVersionClient;

/// Typed handle for calling the test program, generated from `rpcl/test.x`.
pub type TestClient<T = TcpTransport> = TestVersionClient<T>;

/// Releases the connection behind `client`.
///
/// The handle is consumed, so it cannot be released twice. A handle that is
/// dropped without this call is released on drop and any error is logged.
pub fn deinitialize<T: Transport>(client: TestClient<T>) -> Result<(), Error> {
    client.deinitialize()
}
