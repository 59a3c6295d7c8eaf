//! Just enough of rpcbind ([RFC 1833]) to find a program's TCP port and to
//! register one.
//!
//! [RFC 1833]: https://datatracker.ietf.org/doc/html/rfc1833

use std::{
    collections::BTreeMap,
    fmt,
    net::{IpAddr, SocketAddr},
    str::FromStr,
    sync::{Mutex, PoisonError},
};

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    client_stub::ClientStub,
    config::TransportConfig,
    error::Error,
    server_stub::{call_procedure, DispatchError, RpcProgram},
};

pub const RPCBIND_PORT: u16 = 111;
pub const RPCBIND_PROGRAM: u32 = 100_000;
pub const RPCBIND_VERSION: u32 = 4;

pub const RPCBPROC_SET: u32 = 1;
pub const RPCBPROC_UNSET: u32 = 2;
pub const RPCBPROC_GETADDR: u32 = 3;

pub const NETID_TCP: &str = "tcp";
const OWNER: &str = "onc-rpc";

/// `rpcb` mapping entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Rpcb {
    pub program: u32,
    pub version: u32,
    pub netid: String,
    /// Universal address, see [`UniversalAddr`].
    pub addr: String,
    pub owner: String,
}

/// Universal address of an IP endpoint: the host followed by the two port
/// octets, e.g. `127.0.0.1.4.1` for port 1025.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniversalAddr(pub SocketAddr);

impl From<SocketAddr> for UniversalAddr {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for UniversalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [hi, lo] = self.0.port().to_be_bytes();
        write!(f, "{}.{hi}.{lo}", self.0.ip())
    }
}

impl FromStr for UniversalAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidAddress(s.to_string());
        let mut parts = s.rsplitn(3, '.');
        let lo: u8 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let hi: u8 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let ip: IpAddr = parts
            .next()
            .and_then(|host| host.parse().ok())
            .ok_or_else(invalid)?;
        Ok(Self(SocketAddr::new(ip, u16::from_be_bytes([hi, lo]))))
    }
}

fn connect(rpcbind: SocketAddr, config: TransportConfig) -> Result<ClientStub, Error> {
    ClientStub::connect(rpcbind, RPCBIND_PROGRAM, RPCBIND_VERSION, config)
}

/// Resolves where `program`/`version` listens for TCP calls.
pub fn lookup(
    rpcbind: SocketAddr,
    program: u32,
    version: u32,
    config: TransportConfig,
) -> Result<SocketAddr, Error> {
    let mut client = connect(rpcbind, config)?;
    let query = Rpcb {
        program,
        version,
        netid: NETID_TCP.to_string(),
        addr: String::new(),
        owner: String::new(),
    };
    let uaddr: String = client.sync_call(RPCBPROC_GETADDR, &query)?;
    client.deinitialize()?;

    if uaddr.is_empty() {
        return Err(Error::NotRegistered { program, version });
    }
    let UniversalAddr(mut addr) = uaddr.parse()?;
    // a wildcard answer means "same host as rpcbind"
    if addr.ip().is_unspecified() {
        addr.set_ip(rpcbind.ip());
    }
    debug!(program, version, %addr, "resolved program address");
    Ok(addr)
}

/// Registers `addr` as the TCP endpoint of `program`/`version`. Returns
/// `false` when rpcbind already holds a mapping for it.
pub fn register(
    rpcbind: SocketAddr,
    program: u32,
    version: u32,
    addr: SocketAddr,
    config: TransportConfig,
) -> Result<bool, Error> {
    let mut client = connect(rpcbind, config)?;
    let mapping = Rpcb {
        program,
        version,
        netid: NETID_TCP.to_string(),
        addr: UniversalAddr(addr).to_string(),
        owner: OWNER.to_string(),
    };
    let registered: bool = client.sync_call(RPCBPROC_SET, &mapping)?;
    client.deinitialize()?;
    info!(program, version, %addr, registered, "rpcbind registration");
    Ok(registered)
}

pub fn unregister(
    rpcbind: SocketAddr,
    program: u32,
    version: u32,
    config: TransportConfig,
) -> Result<bool, Error> {
    let mut client = connect(rpcbind, config)?;
    let mapping = Rpcb {
        program,
        version,
        netid: String::new(),
        addr: String::new(),
        owner: OWNER.to_string(),
    };
    let removed: bool = client.sync_call(RPCBPROC_UNSET, &mapping)?;
    client.deinitialize()?;
    Ok(removed)
}

/// In-process rpcbind: answers SET, UNSET and GETADDR from a table.
#[derive(Debug, Default)]
pub struct Registry {
    mappings: Mutex<BTreeMap<(u32, u32, String), Rpcb>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, mapping: Rpcb) -> bool {
        let mut mappings = self.mappings.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (mapping.program, mapping.version, mapping.netid.clone());
        if mappings.contains_key(&key) {
            return false;
        }
        mappings.insert(key, mapping);
        true
    }

    /// An empty netid removes the mapping for every transport.
    fn unset(&self, mapping: Rpcb) -> bool {
        let mut mappings = self.mappings.lock().unwrap_or_else(PoisonError::into_inner);
        let before = mappings.len();
        mappings.retain(|(program, version, netid), _| {
            !(*program == mapping.program
                && *version == mapping.version
                && (mapping.netid.is_empty() || *netid == mapping.netid))
        });
        mappings.len() != before
    }

    fn getaddr(&self, query: Rpcb) -> String {
        let netid = if query.netid.is_empty() {
            NETID_TCP.to_string()
        } else {
            query.netid
        };
        let mappings = self.mappings.lock().unwrap_or_else(PoisonError::into_inner);
        mappings
            .get(&(query.program, query.version, netid))
            .map(|mapping| mapping.addr.clone())
            .unwrap_or_default()
    }
}

impl RpcProgram for Registry {
    fn program(&self) -> u32 {
        RPCBIND_PROGRAM
    }

    fn version(&self) -> u32 {
        RPCBIND_VERSION
    }

    fn dispatch(
        &self,
        procedure: u32,
        args: &[u8],
        results: &mut BytesMut,
    ) -> Result<(), DispatchError> {
        match procedure {
            RPCBPROC_SET => call_procedure(args, results, |mapping: Rpcb| self.set(mapping)),
            RPCBPROC_UNSET => call_procedure(args, results, |mapping: Rpcb| self.unset(mapping)),
            RPCBPROC_GETADDR => call_procedure(args, results, |query: Rpcb| self.getaddr(query)),
            _ => Err(DispatchError::ProcUnavail(procedure)),
        }
    }
}
