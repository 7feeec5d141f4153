//! Transport collaborator interfaces and the in-memory and `std::io`
//! backed implementations shipped with the crate.
//!
//! Real transport adapters (TCP, UDP, SCTP, TLS) live outside the codec;
//! anything that can hand over whole messages fits these traits.

use crate::error::IpfixError;
use crate::types::{MSG_HEADER_LEN, MAX_MESSAGE_LEN};

use byteorder::{BigEndian, ByteOrder};

use std::io::{Read, Write};

/// Message sink for the write path. Receives one whole encoded message per
/// call.
pub trait Exporter {
    fn write_message(&mut self, msg: &[u8]) -> Result<(), IpfixError>;

    /// Flushes any transport buffering. The default does nothing.
    fn flush(&mut self) -> Result<(), IpfixError> {
        Ok(())
    }
}

/// Message source for the read path. Returns one whole message, or `None`
/// at end of stream.
pub trait Collector {
    fn read_message(&mut self) -> Result<Option<Vec<u8>>, IpfixError>;
}

/// Exporter collecting emitted messages in memory.
#[derive(Debug, Default)]
pub struct VecExporter {
    pub messages: Vec<Vec<u8>>,
}

impl VecExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All emitted messages concatenated into one byte stream.
    pub fn concat(&self) -> Vec<u8> {
        self.messages.concat()
    }
}

impl Exporter for VecExporter {
    fn write_message(&mut self, msg: &[u8]) -> Result<(), IpfixError> {
        self.messages.push(msg.to_vec());
        Ok(())
    }
}

/// Exporter writing messages to anything [`Write`], e.g. a file.
#[derive(Debug)]
pub struct WriterExporter<W: Write> {
    writer: W,
}

impl<W: Write> WriterExporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Exporter for WriterExporter<W> {
    fn write_message(&mut self, msg: &[u8]) -> Result<(), IpfixError> {
        self.writer.write_all(msg)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), IpfixError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Collector over an in-memory byte buffer holding zero or more whole
/// messages back to back, framed by their length fields.
#[derive(Debug, Default)]
pub struct BufferCollector {
    data: Vec<u8>,
    pos: usize,
}

impl BufferCollector {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// Replaces the buffer, restarting from its first message.
    pub fn set_buffer(&mut self, data: Vec<u8>) {
        self.data = data;
        self.pos = 0;
    }
}

impl Collector for BufferCollector {
    fn read_message(&mut self) -> Result<Option<Vec<u8>>, IpfixError> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let rest = &self.data[self.pos..];
        if rest.len() < MSG_HEADER_LEN {
            return Err(IpfixError::Malformed("truncated message header".into()));
        }
        let len = BigEndian::read_u16(&rest[2..4]) as usize;
        if len < MSG_HEADER_LEN || len > rest.len() {
            return Err(IpfixError::Malformed(format!(
                "message length {len} exceeds buffered {}",
                rest.len()
            )));
        }
        let msg = rest[..len].to_vec();
        self.pos += len;
        Ok(Some(msg))
    }
}

/// Collector reading length-framed messages from anything [`Read`], e.g. a
/// file or a stream socket.
#[derive(Debug)]
pub struct ReaderCollector<R: Read> {
    reader: R,
}

impl<R: Read> ReaderCollector<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Collector for ReaderCollector<R> {
    fn read_message(&mut self) -> Result<Option<Vec<u8>>, IpfixError> {
        let mut header = [0u8; MSG_HEADER_LEN];
        let mut filled = 0;
        while filled < header.len() {
            match self.reader.read(&mut header[filled..])? {
                0 if filled == 0 => return Ok(None),
                0 => {
                    return Err(IpfixError::Malformed("truncated message header".into()));
                }
                n => filled += n,
            }
        }
        let len = BigEndian::read_u16(&header[2..4]) as usize;
        if !(MSG_HEADER_LEN..=MAX_MESSAGE_LEN).contains(&len) {
            return Err(IpfixError::Malformed(format!("message length {len}")));
        }
        let mut msg = vec![0u8; len];
        msg[..MSG_HEADER_LEN].copy_from_slice(&header);
        self.reader.read_exact(&mut msg[MSG_HEADER_LEN..])?;
        Ok(Some(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(len: u16) -> Vec<u8> {
        let mut msg = vec![0u8; len as usize];
        msg[0] = 0x00;
        msg[1] = 0x0A;
        BigEndian::write_u16(&mut msg[2..4], len);
        msg
    }

    #[test]
    fn buffer_collector_frames_by_length() {
        let mut data = message(20);
        data.extend(message(16));
        let mut collector = BufferCollector::new(data);
        assert_eq!(collector.read_message().unwrap().unwrap().len(), 20);
        assert_eq!(collector.read_message().unwrap().unwrap().len(), 16);
        assert!(collector.read_message().unwrap().is_none());
    }

    #[test]
    fn buffer_collector_rejects_overrun_length() {
        let mut msg = message(20);
        msg.truncate(18);
        let mut collector = BufferCollector::new(msg);
        assert!(collector.read_message().is_err());
    }

    #[test]
    fn reader_collector_round_trips_through_io() {
        let mut bytes = Vec::new();
        let mut exporter = WriterExporter::new(&mut bytes);
        exporter.write_message(&message(24)).unwrap();
        exporter.write_message(&message(16)).unwrap();
        exporter.flush().unwrap();

        let mut collector = ReaderCollector::new(bytes.as_slice());
        assert_eq!(collector.read_message().unwrap().unwrap().len(), 24);
        assert_eq!(collector.read_message().unwrap().unwrap().len(), 16);
        assert!(collector.read_message().unwrap().is_none());
    }
}
