use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

pub const LOCAL_HOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Largest reassembled record either side accepts.
pub const MAX_RECORD_SIZE: usize = 1 << 20;
/// Largest fragment written; records above this are split.
pub const MAX_FRAGMENT_SIZE: usize = 64 * 1024;
pub const TIME_OUT: Duration = Duration::from_secs(5);
pub const BUF_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub max_record_size: usize,
    pub max_fragment_size: usize,
    /// Bounds establishing an outgoing connection. `None` leaves it to the
    /// operating system.
    pub connect_timeout: Option<Duration>,
    /// `None` blocks forever.
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_record_size: MAX_RECORD_SIZE,
            max_fragment_size: MAX_FRAGMENT_SIZE,
            connect_timeout: Some(TIME_OUT),
            read_timeout: Some(TIME_OUT),
            write_timeout: Some(TIME_OUT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port 0 picks an ephemeral port.
    pub bind_addr: SocketAddr,
    pub transport: TransportConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((LOCAL_HOST, 0)),
            // connections may idle between calls
            transport: TransportConfig {
                read_timeout: None,
                ..TransportConfig::default()
            },
        }
    }
}
