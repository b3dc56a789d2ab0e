//! Length-prefixed text blobs
//!
//! Each record is an 8-byte header (six zero-padded ASCII digits giving the
//! payload byte length, then CR LF) followed by the UTF-8 payload.

use std::io::{ErrorKind, Read, Write};

use crate::error::CodecError;

/// Largest payload a header can describe
pub const MAX_TLOB_SIZE: usize = 999_999;

const HEADER_LEN: usize = 8;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Writes length-prefixed blobs to a byte sink
pub struct TlobWriter<W: Write> {
    inner: W,
}

impl<W: Write> TlobWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one blob; an oversized blob is rejected before any byte is written
    pub fn write(&mut self, blob: &str) -> Result<(), CodecError> {
        let size = blob.len();
        if size > MAX_TLOB_SIZE {
            return Err(CodecError::PayloadTooLarge {
                size,
                max: MAX_TLOB_SIZE,
            });
        }
        let header = format!("{size:06}\r\n");
        self.inner.write_all(header.as_bytes())?;
        self.inner.write_all(blob.as_bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), CodecError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads length-prefixed blobs from a byte source
pub struct TlobReader<R: Read> {
    inner: R,
    buffer: Vec<u8>,
}

impl<R: Read> TlobReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(0x8000),
        }
    }

    /// Read the next blob, or `None` at a clean end of stream
    pub fn try_read(&mut self) -> Result<Option<String>, CodecError> {
        let mut header = [0u8; HEADER_LEN];
        match read_fully(&mut self.inner, &mut header)? {
            0 => return Ok(None),
            HEADER_LEN => {}
            _ => return Err(CodecError::UnexpectedEof),
        }
        let size = parse_header(&header)?;

        self.buffer.resize(size, 0);
        if read_fully(&mut self.inner, &mut self.buffer)? != size {
            return Err(CodecError::UnexpectedEof);
        }
        let text = std::str::from_utf8(&self.buffer).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(Some(text.to_string()))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Iterator for TlobReader<R> {
    type Item = Result<String, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_read().transpose()
    }
}

fn parse_header(header: &[u8; HEADER_LEN]) -> Result<usize, CodecError> {
    let digits = &header[..6];
    if !digits.iter().all(u8::is_ascii_digit) {
        if header[..2] == GZIP_MAGIC {
            return Err(CodecError::LooksCompressed);
        }
        return Err(CodecError::InvalidHeader(
            "expecting only digits in the first 6 bytes",
        ));
    }
    if &header[6..] != b"\r\n" {
        return Err(CodecError::InvalidHeader(
            "expecting CR-LF in the last 2 bytes",
        ));
    }
    Ok(digits
        .iter()
        .fold(0usize, |size, digit| size * 10 + usize::from(digit - b'0')))
}

/// Read until `buf` is full or the source ends, returning the bytes read
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, CodecError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(blobs: &[&str]) -> Vec<u8> {
        let mut writer = TlobWriter::new(Vec::new());
        for blob in blobs {
            writer.write(blob).unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode(&["hello"]);
        assert_eq!(&bytes[..8], b"000005\r\n");
        assert_eq!(&bytes[8..], b"hello");
    }

    #[test]
    fn test_read_back() {
        let bytes = encode(&["<Event/>", "", "grüße"]);
        let blobs: Vec<_> = TlobReader::new(bytes.as_slice())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(blobs, vec!["<Event/>", "", "grüße"]);
    }

    #[test]
    fn test_oversize_rejected_before_writing() {
        let mut writer = TlobWriter::new(Vec::new());
        let big = "x".repeat(MAX_TLOB_SIZE + 1);
        assert!(matches!(
            writer.write(&big),
            Err(CodecError::PayloadTooLarge { .. })
        ));
        assert!(writer.into_inner().is_empty());
    }

    #[test]
    fn test_gzip_stream_detected() {
        let bytes = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00];
        let err = TlobReader::new(&bytes[..]).try_read().unwrap_err();
        assert!(matches!(err, CodecError::LooksCompressed));
    }

    #[test]
    fn test_bad_headers() {
        let err = TlobReader::new(&b"00a005\r\nhello"[..]).try_read().unwrap_err();
        assert!(matches!(err, CodecError::InvalidHeader(_)));

        let err = TlobReader::new(&b"000005\n\nhello"[..]).try_read().unwrap_err();
        assert!(matches!(err, CodecError::InvalidHeader(_)));

        let err = TlobReader::new(&b"0000"[..]).try_read().unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedEof));

        let err = TlobReader::new(&b"000005\r\nhel"[..]).try_read().unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedEof));
    }

    #[test]
    fn test_empty_stream() {
        assert!(TlobReader::new(&b""[..]).try_read().unwrap().is_none());
    }
}
