//! Delimited text blobs
//!
//! Each record is `STX payload ETX LF`. Anything between records is
//! ignored by the reader.

use std::io::{ErrorKind, Read, Write};

use crate::error::CodecError;

/// Record start marker (ASCII STX)
pub const RECORD_START: u8 = 0x02;
/// Record end marker (ASCII ETX)
pub const RECORD_END: u8 = 0x03;
/// Filler byte written after each record (ASCII LF)
pub const RECORD_FILLER: u8 = 0x0A;

/// Default payload size limit
pub const DEFAULT_MAX_BLOB_SIZE: usize = 0xFF00;
/// Largest payload size limit that can be configured
pub const HARD_MAX_BLOB_SIZE: usize = 0xFFF0;

/// Writes delimited blobs to a byte sink
pub struct DelimitedWriter<W: Write> {
    inner: W,
    max_blob_size: usize,
    buffer: Vec<u8>,
}

impl<W: Write> DelimitedWriter<W> {
    pub fn new(inner: W, max_blob_size: usize) -> Result<Self, CodecError> {
        if max_blob_size > HARD_MAX_BLOB_SIZE {
            return Err(CodecError::LimitTooLarge(max_blob_size));
        }
        Ok(Self {
            inner,
            max_blob_size,
            buffer: Vec::with_capacity(max_blob_size + 8),
        })
    }

    pub fn max_blob_size(&self) -> usize {
        self.max_blob_size
    }

    /// Write one blob as a single framed record
    pub fn write(&mut self, blob: &str) -> Result<(), CodecError> {
        let bytes = blob.as_bytes();
        if bytes.len() > self.max_blob_size {
            return Err(CodecError::PayloadTooLarge {
                size: bytes.len(),
                max: self.max_blob_size,
            });
        }
        if bytes.contains(&RECORD_END) {
            return Err(CodecError::EmbeddedTerminator);
        }
        self.buffer.clear();
        self.buffer.push(RECORD_START);
        self.buffer.extend_from_slice(bytes);
        self.buffer.extend_from_slice(&[RECORD_END, RECORD_FILLER]);
        self.inner.write_all(&self.buffer)?;
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

/// Reads delimited blobs through a fixed-size buffer
pub struct DelimitedReader<R: Read> {
    source: R,
    buffer: Vec<u8>,
    read: usize,
    tail: usize,
}

impl<R: Read> DelimitedReader<R> {
    pub fn new(source: R, max_blob_size: usize) -> Self {
        Self {
            source,
            buffer: vec![0; max_blob_size + 8],
            read: 0,
            tail: 0,
        }
    }

    /// Read the next blob, or `None` once the stream holds no further
    /// record start
    pub fn try_read(&mut self) -> Result<Option<String>, CodecError> {
        loop {
            if let Some(pos) = find(&self.buffer[self.read..self.tail], RECORD_START) {
                self.read += pos;
                break;
            }
            // Only inter-record filler buffered
            self.read = self.tail;
            if !self.fill()? {
                return Ok(None);
            }
        }

        let mut scanned = 1;
        let end = loop {
            let window = &self.buffer[self.read + scanned..self.tail];
            if let Some(pos) = find(window, RECORD_END) {
                break self.read + scanned + pos;
            }
            scanned = self.tail - self.read;
            if scanned >= self.buffer.len() {
                return Err(CodecError::RecordTooLong(self.buffer.len()));
            }
            if !self.fill()? {
                return Err(CodecError::MissingRecordEnd);
            }
        };

        let text = std::str::from_utf8(&self.buffer[self.read + 1..end])
            .map_err(|_| CodecError::InvalidUtf8)?
            .to_string();
        self.read = end + 1;
        Ok(Some(text))
    }

    /// Move unread bytes to the front and read more. Returns whether any
    /// new bytes arrived.
    fn fill(&mut self) -> Result<bool, CodecError> {
        if self.read > 0 {
            self.buffer.copy_within(self.read..self.tail, 0);
            self.tail -= self.read;
            self.read = 0;
        }
        if self.tail == self.buffer.len() {
            return Ok(false);
        }
        loop {
            match self.source.read(&mut self.buffer[self.tail..]) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.tail += n;
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R: Read> Iterator for DelimitedReader<R> {
    type Item = Result<String, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_read().transpose()
    }
}

fn find(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Source returning at most `step` bytes per read
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    fn encode(blobs: &[&str], max: usize) -> Vec<u8> {
        let mut writer = DelimitedWriter::new(Vec::new(), max).unwrap();
        for blob in blobs {
            writer.write(blob).unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn test_record_layout() {
        assert_eq!(encode(&["ab"], 16), vec![0x02, b'a', b'b', 0x03, 0x0A]);
    }

    #[test]
    fn test_read_back_across_refills() {
        let long = "x".repeat(40);
        let blobs = ["first record", "", long.as_str(), "last"];
        let bytes = encode(&blobs, 48);
        let source = Trickle {
            data: &bytes,
            step: 7,
        };
        let read: Vec<_> = DelimitedReader::new(source, 48)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(read, blobs);
    }

    #[test]
    fn test_filler_between_records_ignored() {
        let mut bytes = b"garbage\n\n".to_vec();
        bytes.extend(encode(&["one"], 16));
        bytes.extend_from_slice(b"\r\n  ");
        bytes.extend(encode(&["two"], 16));
        let read: Vec<_> = DelimitedReader::new(bytes.as_slice(), 16)
            .map(Result::unwrap)
            .collect();
        assert_eq!(read, vec!["one", "two"]);
    }

    #[test]
    fn test_writer_rejections() {
        assert!(matches!(
            DelimitedWriter::new(Vec::new(), HARD_MAX_BLOB_SIZE + 1),
            Err(CodecError::LimitTooLarge(_))
        ));

        let mut writer = DelimitedWriter::new(Vec::new(), 8).unwrap();
        assert!(matches!(writer.write("a\u{3}b"), Err(CodecError::EmbeddedTerminator)));
        assert!(matches!(
            writer.write("123456789"),
            Err(CodecError::PayloadTooLarge { size: 9, max: 8 })
        ));
        assert!(writer.into_inner().is_empty());
    }

    #[test]
    fn test_truncated_record() {
        let bytes = [0x02, b'a', b'b'];
        let err = DelimitedReader::new(&bytes[..], 16).try_read().unwrap_err();
        assert!(matches!(err, CodecError::MissingRecordEnd));
    }

    #[test]
    fn test_record_longer_than_buffer() {
        let mut bytes = vec![0x02];
        bytes.extend(std::iter::repeat_n(b'z', 64));
        bytes.push(0x03);
        let err = DelimitedReader::new(bytes.as_slice(), 16).try_read().unwrap_err();
        assert!(matches!(err, CodecError::RecordTooLong(24)));
    }
}
