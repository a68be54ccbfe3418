//! The pkt-line framing used by the smart HTTP transport.
//!
//! Each line is prefixed with a 4-character hex length (including the
//! prefix itself); lengths of 4 or less are flush packets.

use crate::{GitError, Result};
use std::io::Read;

/// A pkt-line packet, reduced to the client-side subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data line with content. Trailing newlines are preserved.
    Data(Vec<u8>),
    /// Flush packet (`0000`; the reserved lengths 1-4 are treated the same).
    Flush,
}

impl PktLine {
    /// Encodes the packet to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Data(data) => {
                let mut result = format!("{:04x}", data.len() + 4).into_bytes();
                result.extend_from_slice(data);
                result
            }
            Self::Flush => b"0000".to_vec(),
        }
    }

    /// Returns the data content, or None for a flush.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            Self::Flush => None,
        }
    }

    /// Returns true if this is a flush packet.
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }
}

/// Blocking reader for pkt-line streams.
pub struct PktLineReader<R> {
    reader: R,
}

impl<R: Read> PktLineReader<R> {
    /// Creates a new pkt-line reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next packet. EOF mid-stream is an error.
    pub fn read(&mut self) -> Result<PktLine> {
        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf)?;

        let len_str = std::str::from_utf8(&len_buf)
            .map_err(|_| GitError::InvalidPktLine("invalid length prefix".to_string()))?;
        let len = usize::from_str_radix(len_str, 16)
            .map_err(|_| GitError::InvalidPktLine(format!("invalid length: {len_str}")))?;

        if len <= 4 {
            return Ok(PktLine::Flush);
        }

        let mut data = vec![0u8; len - 4];
        self.reader.read_exact(&mut data)?;
        Ok(PktLine::Data(data))
    }

    /// Discards packets up to and including the next flush.
    pub fn drain_until_flush(&mut self) -> Result<()> {
        while !self.read()?.is_flush() {}
        Ok(())
    }

    /// Consumes the reader and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
