//! Blob stream codecs
//!
//! Two framings ([`Framing::Tlob`] and [`Framing::Delimited`]) over an
//! optional gzip layer. The choices are independent: every framing can be
//! written compressed or plain.
//!
//! ```ignore
//! let mut writer = BlobWriter::new(file, Framing::Tlob, Compression::Gzip)?;
//! writer.write("<Event/>")?;
//! let file = writer.finish()?;
//! ```

pub mod delimited;
pub mod tlob;

use std::io::{self, Read, Write};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
pub use delimited::{DEFAULT_MAX_BLOB_SIZE, DelimitedReader, DelimitedWriter};
pub use tlob::{MAX_TLOB_SIZE, TlobReader, TlobWriter};

/// How records are framed inside a blob stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Six-digit length header per record
    #[default]
    Tlob,
    /// STX/ETX delimited records
    Delimited,
}

/// Optional compression wrapped around a blob stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Gzip,
}

impl Compression {
    pub fn is_compressed(self) -> bool {
        matches!(self, Compression::Gzip)
    }

    pub fn from_flag(compressed: bool) -> Self {
        if compressed {
            Compression::Gzip
        } else {
            Compression::None
        }
    }
}

/// A sink that is either passed through or gzip-compressed
pub enum CompressedWriter<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

impl<W: Write> CompressedWriter<W> {
    pub fn new(inner: W, compression: Compression) -> Self {
        match compression {
            Compression::None => Self::Plain(inner),
            Compression::Gzip => Self::Gzip(GzEncoder::new(inner, flate2::Compression::best())),
        }
    }

    /// Write any compression trailer and return the underlying sink
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::Plain(mut inner) => {
                inner.flush()?;
                Ok(inner)
            }
            Self::Gzip(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(inner) => inner.write(buf),
            Self::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(inner) => inner.flush(),
            Self::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// A source that is either passed through or gzip-decompressed
pub enum CompressedReader<R: Read> {
    Plain(R),
    Gzip(MultiGzDecoder<R>),
}

impl<R: Read> CompressedReader<R> {
    pub fn new(inner: R, compression: Compression) -> Self {
        match compression {
            Compression::None => Self::Plain(inner),
            Compression::Gzip => Self::Gzip(MultiGzDecoder::new(inner)),
        }
    }
}

impl<R: Read> Read for CompressedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(inner) => inner.read(buf),
            Self::Gzip(decoder) => decoder.read(buf),
        }
    }
}

/// Writer for either framing
pub enum BlobWriter<W: Write> {
    Tlob(TlobWriter<CompressedWriter<W>>),
    Delimited(DelimitedWriter<CompressedWriter<W>>),
}

impl<W: Write> BlobWriter<W> {
    /// Create a writer; delimited framing uses the default size limit
    pub fn new(inner: W, framing: Framing, compression: Compression) -> Result<Self, CodecError> {
        let sink = CompressedWriter::new(inner, compression);
        Ok(match framing {
            Framing::Tlob => Self::Tlob(TlobWriter::new(sink)),
            Framing::Delimited => {
                Self::Delimited(DelimitedWriter::new(sink, DEFAULT_MAX_BLOB_SIZE)?)
            }
        })
    }

    /// Largest payload this writer accepts
    pub fn max_blob_size(&self) -> usize {
        match self {
            Self::Tlob(_) => MAX_TLOB_SIZE,
            Self::Delimited(writer) => writer.max_blob_size(),
        }
    }

    pub fn write(&mut self, blob: &str) -> Result<(), CodecError> {
        match self {
            Self::Tlob(writer) => writer.write(blob),
            Self::Delimited(writer) => writer.write(blob),
        }
    }

    /// Flush all records and return the underlying sink
    pub fn finish(self) -> Result<W, CodecError> {
        let sink = match self {
            Self::Tlob(writer) => writer.into_inner(),
            Self::Delimited(writer) => writer.into_inner(),
        };
        Ok(sink.finish()?)
    }
}

/// Reader for either framing
pub enum BlobReader<R: Read> {
    Tlob(TlobReader<CompressedReader<R>>),
    Delimited(DelimitedReader<CompressedReader<R>>),
}

impl<R: Read> BlobReader<R> {
    pub fn new(inner: R, framing: Framing, compression: Compression) -> Self {
        let source = CompressedReader::new(inner, compression);
        match framing {
            Framing::Tlob => Self::Tlob(TlobReader::new(source)),
            Framing::Delimited => {
                Self::Delimited(DelimitedReader::new(source, DEFAULT_MAX_BLOB_SIZE))
            }
        }
    }

    pub fn try_read(&mut self) -> Result<Option<String>, CodecError> {
        match self {
            Self::Tlob(reader) => reader.try_read(),
            Self::Delimited(reader) => reader.try_read(),
        }
    }
}

impl<R: Read> Iterator for BlobReader<R> {
    type Item = Result<String, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_read().transpose()
    }
}
