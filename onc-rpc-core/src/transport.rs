use std::{
    io::{self, BufReader, BufWriter, Write},
    net::{Shutdown, SocketAddr, TcpStream},
};

use bytes::BytesMut;
use tracing::debug;

use crate::{
    config::{TransportConfig, BUF_SIZE},
    error::Error,
    record,
};

/// Moves whole RPC records between two ends of a connection.
pub trait Transport: Send {
    fn send_record(&mut self, record: &[u8]) -> Result<(), Error>;

    /// Blocks until the next record arrives. A peer that closes the
    /// connection between records yields [`Error::Closed`]. A timeout before
    /// the record starts leaves the stream usable; see [`Error::is_timeout`].
    fn recv_record(&mut self) -> Result<BytesMut, Error>;

    /// Releases the connection. Called at most once per transport.
    fn shutdown(&mut self) -> Result<(), Error>;
}

/// Record-marked TCP stream.
#[derive(Debug)]
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    config: TransportConfig,
}

impl TcpTransport {
    pub fn connect(addr: SocketAddr, config: TransportConfig) -> Result<Self, Error> {
        let stream = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
            None => TcpStream::connect(addr)?,
        };
        Self::from_stream(stream, config)
    }

    pub fn from_stream(stream: TcpStream, config: TransportConfig) -> Result<Self, Error> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        Ok(Self {
            reader: BufReader::with_capacity(BUF_SIZE, stream.try_clone()?),
            writer: BufWriter::with_capacity(BUF_SIZE, stream),
            config,
        })
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.reader.get_ref().peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.reader.get_ref().local_addr()
    }
}

impl Transport for TcpTransport {
    fn send_record(&mut self, record: &[u8]) -> Result<(), Error> {
        record::write_record(&mut self.writer, record, self.config.max_fragment_size)?;
        Ok(())
    }

    fn recv_record(&mut self) -> Result<BytesMut, Error> {
        record::read_record(&mut self.reader, self.config.max_record_size)?.ok_or(Error::Closed)
    }

    fn shutdown(&mut self) -> Result<(), Error> {
        self.writer.flush()?;
        match self.writer.get_ref().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // the peer got there first
            Err(err) if err.kind() == io::ErrorKind::NotConnected => {
                debug!("connection already shut down");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
