//! Record marking for stream transports ([RFC 5531, section 11]).
//!
//! A record is sent as one or more fragments, each preceded by a 4-byte
//! big-endian header whose high bit flags the last fragment and whose low
//! 31 bits carry the fragment length.
//!
//! [RFC 5531, section 11]: https://datatracker.ietf.org/doc/html/rfc5531#section-11

use std::io::{self, Read, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::error::Error;

const LAST_FRAGMENT: u32 = 1 << (u32::BITS - 1);
pub const MAX_FRAGMENT_LEN: usize = (LAST_FRAGMENT - 1) as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub last: bool,
    pub len: u32,
}

impl FragmentHeader {
    pub fn new(last: bool, len: u32) -> Self {
        debug_assert!(len as usize <= MAX_FRAGMENT_LEN);
        Self { last, len }
    }

    pub fn encode(self) -> [u8; 4] {
        let mut word = self.len & !LAST_FRAGMENT;
        if self.last {
            word |= LAST_FRAGMENT;
        }
        word.to_be_bytes()
    }

    pub fn decode(bytes: [u8; 4]) -> Self {
        let word = u32::from_be_bytes(bytes);
        Self {
            last: word & LAST_FRAGMENT != 0,
            len: word & !LAST_FRAGMENT,
        }
    }
}

/// Writes `record` as fragments of at most `max_fragment` bytes and flushes.
pub fn write_record<W: Write>(writer: &mut W, record: &[u8], max_fragment: usize) -> io::Result<()> {
    let max_fragment = max_fragment.clamp(1, MAX_FRAGMENT_LEN);
    if record.is_empty() {
        writer.write_all(&FragmentHeader::new(true, 0).encode())?;
        return writer.flush();
    }

    let mut fragments = record.chunks(max_fragment).peekable();
    while let Some(fragment) = fragments.next() {
        let header = FragmentHeader::new(fragments.peek().is_none(), fragment.len() as u32);
        writer.write_all(&header.encode())?;
        writer.write_all(fragment)?;
    }
    trace!("wrote record of {} bytes", record.len());
    writer.flush()
}

/// Reads one record, reassembling its fragments.
///
/// Returns `Ok(None)` when the stream ends cleanly before a new record. A
/// failure before the first header byte is [`Error::Io`] and leaves the
/// stream at a record boundary; any failure after it is [`Error::Broken`].
pub fn read_record<R: Read>(reader: &mut R, max_record: usize) -> Result<Option<BytesMut>, Error> {
    let mut header = [0u8; 4];
    if !read_first_header(reader, &mut header)? {
        return Ok(None);
    }

    let mut record = BytesMut::new();
    loop {
        let fragment = FragmentHeader::decode(header);
        let start = record.len();
        let size = start + fragment.len as usize;
        if size > max_record {
            return Err(Error::RecordTooLarge {
                size,
                limit: max_record,
            });
        }
        record.resize(size, 0);
        reader
            .read_exact(&mut record[start..])
            .map_err(Error::Broken)?;
        if fragment.last {
            trace!("read record of {} bytes", record.len());
            return Ok(Some(record));
        }
        reader.read_exact(&mut header).map_err(Error::Broken)?;
    }
}

/// Like `read_exact`, but a stream that is already at its end yields `false`.
fn read_first_header<R: Read>(reader: &mut R, buf: &mut [u8; 4]) -> Result<bool, Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(Error::Broken(io::ErrorKind::UnexpectedEof.into())),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if filled == 0 => return Err(err.into()),
            Err(err) => return Err(Error::Broken(err)),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn header_carries_the_last_flag() {
        let header = FragmentHeader::new(true, 28);
        assert_eq!(header.encode(), [0x80, 0, 0, 28]);
        assert_eq!(FragmentHeader::decode([0x80, 0, 0, 28]), header);
        assert_eq!(
            FragmentHeader::decode([0, 0, 1, 0]),
            FragmentHeader::new(false, 256)
        );
    }

    #[test]
    fn single_fragment_record() {
        let mut wire = Vec::new();
        write_record(&mut wire, &[1, 2, 3, 4], 1024).unwrap();
        assert_eq!(wire, vec![0x80, 0, 0, 4, 1, 2, 3, 4]);

        let record = read_record(&mut Cursor::new(wire), 1024).unwrap().unwrap();
        assert_eq!(&record[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn records_are_split_and_reassembled() {
        let payload: Vec<u8> = (0..10).collect();
        let mut wire = Vec::new();
        write_record(&mut wire, &payload, 4).unwrap();
        // 4 + 4 + 2 bytes of payload, three headers
        assert_eq!(wire.len(), 10 + 3 * 4);
        assert_eq!(&wire[..4], &[0, 0, 0, 4]);
        assert_eq!(&wire[16..20], &[0x80, 0, 0, 2]);

        let record = read_record(&mut Cursor::new(wire), 1024).unwrap().unwrap();
        assert_eq!(&record[..], &payload[..]);
    }

    #[test]
    fn consecutive_records_stay_separate() {
        let mut wire = Vec::new();
        write_record(&mut wire, b"abcd", 1024).unwrap();
        write_record(&mut wire, b"", 1024).unwrap();
        let mut cursor = Cursor::new(wire);

        assert_eq!(&read_record(&mut cursor, 64).unwrap().unwrap()[..], b"abcd");
        assert!(read_record(&mut cursor, 64).unwrap().unwrap().is_empty());
        assert!(read_record(&mut cursor, 64).unwrap().is_none());
    }

    #[test]
    fn oversized_record_is_rejected() {
        let mut wire = Vec::new();
        write_record(&mut wire, &[0; 32], 8).unwrap();
        let err = read_record(&mut Cursor::new(wire), 16).unwrap_err();
        assert!(matches!(
            err,
            Error::RecordTooLarge {
                size: 24,
                limit: 16
            }
        ));
    }

    #[test]
    fn truncated_record_is_an_error() {
        let wire = vec![0x80, 0, 0, 8, 1, 2];
        let err = read_record(&mut Cursor::new(wire), 64).unwrap_err();
        assert!(matches!(err, Error::Broken(e) if e.kind() == io::ErrorKind::UnexpectedEof));

        let wire = vec![0x80, 0];
        let err = read_record(&mut Cursor::new(wire), 64).unwrap_err();
        assert!(matches!(err, Error::Broken(_)));
    }

    /// Fails with `kind` once `data` runs out.
    struct Stalled {
        data: Cursor<Vec<u8>>,
        kind: io::ErrorKind,
    }

    impl Read for Stalled {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(self.kind.into()),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn timeout_between_records_keeps_framing() {
        let mut reader = Stalled {
            data: Cursor::new(Vec::new()),
            kind: io::ErrorKind::WouldBlock,
        };
        let err = read_record(&mut reader, 64).unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::WouldBlock));
        assert!(Error::from(io::Error::from(io::ErrorKind::TimedOut)).is_timeout());
    }

    #[test]
    fn timeout_inside_a_record_breaks_framing() {
        let mut reader = Stalled {
            data: Cursor::new(vec![0x80, 0, 0, 8, 1, 2, 3]),
            kind: io::ErrorKind::WouldBlock,
        };
        let err = read_record(&mut reader, 64).unwrap_err();
        assert!(!err.is_timeout());
        assert!(matches!(err, Error::Broken(e) if e.kind() == io::ErrorKind::WouldBlock));
    }
}
