//! Framing for the verifier pipe pair.
//!
//! Request: `u32` little-endian length, then that many credential bytes.
//! Reply: one byte, `1` for success and `0` for failure.

use std::io::{ErrorKind, IoSlice, Read, Write};

use crate::config::types::{LockError, Result};
use crate::kernel::memlock::SecureBuffer;

const VERDICT_SUCCESS: u8 = 1;
const VERDICT_FAILURE: u8 = 0;

/// Outcome of one verification. There is no partial or ambiguous verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthVerdict {
    Success,
    Failure,
}

impl AuthVerdict {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            VERDICT_SUCCESS => Ok(AuthVerdict::Success),
            VERDICT_FAILURE => Ok(AuthVerdict::Failure),
            other => Err(LockError::MalformedVerdict(other)),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            AuthVerdict::Success => VERDICT_SUCCESS,
            AuthVerdict::Failure => VERDICT_FAILURE,
        }
    }
}

/// Write one request frame.
///
/// Header and credential go out in a single `writev`, straight from the
/// caller's (pinned) storage. Frames up to `PIPE_BUF` land atomically on a
/// pipe; a short write is completed piecewise.
pub fn write_request<W: Write>(writer: &mut W, credential: &[u8]) -> Result<()> {
    let len = u32::try_from(credential.len())
        .map_err(|_| LockError::Process("credential frame too large".to_string()))?;
    let header = len.to_le_bytes();

    let written = loop {
        match writer.write_vectored(&[IoSlice::new(&header), IoSlice::new(credential)]) {
            Ok(0) => return Err(std::io::Error::from(ErrorKind::WriteZero).into()),
            Ok(n) => break n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    };

    if written < header.len() {
        writer.write_all(&header[written..])?;
        writer.write_all(credential)?;
    } else {
        writer.write_all(&credential[written - header.len()..])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read one request into `out`, replacing its content.
///
/// Returns `Ok(false)` on a clean end-of-stream before a new frame starts.
/// A frame longer than `out` can hold is a protocol violation.
pub fn read_request<R: Read>(reader: &mut R, out: &mut SecureBuffer) -> Result<bool> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > out.max_len() {
        return Err(LockError::Process(format!(
            "request frame of {} bytes exceeds limit of {}",
            len,
            out.max_len()
        )));
    }

    out.clear();
    reader.read_exact(out.extend_zeroed(len)?)?;
    Ok(true)
}

pub fn write_verdict<W: Write>(writer: &mut W, verdict: AuthVerdict) -> Result<()> {
    writer.write_all(&[verdict.to_byte()])?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn buffer() -> SecureBuffer {
        SecureBuffer::with_capacity(8, 64).unwrap()
    }

    #[test]
    fn verdict_bytes_decode_strictly() {
        assert_eq!(AuthVerdict::from_byte(1).unwrap(), AuthVerdict::Success);
        assert_eq!(AuthVerdict::from_byte(0).unwrap(), AuthVerdict::Failure);
        for byte in [2u8, b'1', b'0', 0xff] {
            assert!(matches!(
                AuthVerdict::from_byte(byte),
                Err(LockError::MalformedVerdict(b)) if b == byte
            ));
        }
    }

    /// Accepts at most `chunk` bytes per call, like a congested pipe.
    struct Trickle {
        data: Vec<u8>,
        chunk: usize,
        calls: usize,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.calls += 1;
            let n = buf.len().min(self.chunk);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> std::io::Result<usize> {
            self.calls += 1;
            let mut budget = self.chunk;
            let mut total = 0;
            for buf in bufs {
                let n = buf.len().min(budget);
                self.data.extend_from_slice(&buf[..n]);
                budget -= n;
                total += n;
            }
            Ok(total)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn frame(credential: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_request(&mut out, credential).unwrap();
        out
    }

    #[test]
    fn request_frame_carries_length_prefix() {
        let frame = frame(b"abc123");
        assert_eq!(&frame[..4], &6u32.to_le_bytes());
        assert_eq!(&frame[4..], b"abc123");
    }

    #[test]
    fn whole_frame_goes_out_in_one_vectored_write() {
        let mut sink = Trickle {
            data: Vec::new(),
            chunk: usize::MAX,
            calls: 0,
        };
        write_request(&mut sink, b"hunter2").unwrap();
        assert_eq!(sink.calls, 1);
        assert_eq!(sink.data, frame(b"hunter2"));
    }

    #[test]
    fn short_writes_still_produce_the_full_frame() {
        for chunk in [1, 3, 4, 5, 9] {
            let mut sink = Trickle {
                data: Vec::new(),
                chunk,
                calls: 0,
            };
            write_request(&mut sink, b"correct horse").unwrap();
            assert_eq!(sink.data, frame(b"correct horse"), "chunk {}", chunk);
        }
    }

    #[test]
    fn frames_with_newlines_survive() {
        let frame = frame(b"line1\nline2");
        let mut out = buffer();
        assert!(read_request(&mut Cursor::new(frame), &mut out).unwrap());
        assert_eq!(out.as_slice(), b"line1\nline2");
    }

    #[test]
    fn back_to_back_frames_are_read_separately() {
        let mut stream = frame(b"first");
        stream.extend_from_slice(&frame(b""));
        let mut cursor = Cursor::new(stream);
        let mut out = buffer();

        assert!(read_request(&mut cursor, &mut out).unwrap());
        assert_eq!(out.as_slice(), b"first");
        assert!(read_request(&mut cursor, &mut out).unwrap());
        assert!(out.is_empty());
        assert!(!read_request(&mut cursor, &mut out).unwrap());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut stream = 1000u32.to_le_bytes().to_vec();
        stream.extend(std::iter::repeat(b'x').take(1000));
        let mut out = buffer();
        assert!(read_request(&mut Cursor::new(stream), &mut out).is_err());
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut stream = 10u32.to_le_bytes().to_vec();
        stream.extend_from_slice(b"abc");
        let mut out = buffer();
        assert!(read_request(&mut Cursor::new(stream), &mut out).is_err());
    }
}
