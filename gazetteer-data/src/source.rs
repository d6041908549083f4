//! Incremental access to large source files.
//!
//! [`SourceReader`] hands its inner stream to the parsers in bounded chunks
//! and checks a [`CancelToken`] before every read, so a run can be stopped
//! between chunks. [`Compression`] covers the containers the feeds ship
//! in: plain files, bzip2 streams and zip archives.

use std::io::{self, BufReader, Read, Seek};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bzip2::read::MultiBzDecoder;
use thiserror::Error;
use zip::ZipArchive;

/// Default chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Name of the NaPTAN document inside the published archive.
pub const NAPTAN_ZIP_MEMBER: &str = "NaPTAN.xml";

/// Upper bound on bytes requested from the source per read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSize(NonZeroUsize);

impl ChunkSize {
    /// Create a chunk size; zero is raised to one byte.
    #[must_use]
    pub fn new(bytes: usize) -> Self {
        Self(NonZeroUsize::new(bytes).unwrap_or(NonZeroUsize::MIN))
    }

    /// Chunk size in bytes.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

/// Shared flag that stops an import between chunks.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Errors raised while opening or reading a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading from the underlying stream failed.
    #[error("failed to read source {name}")]
    Read {
        /// Source label, usually the file name.
        name: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The zip container could not be opened or lacked the member.
    #[error("failed to open {member} in zip archive {name}")]
    Zip {
        /// Archive label.
        name: String,
        /// Requested member.
        member: String,
        /// Underlying zip failure.
        #[source]
        source: zip::result::ZipError,
    },
    /// The run was cancelled.
    #[error("import of {name} was cancelled")]
    Cancelled {
        /// Source label.
        name: String,
    },
}

/// Container format of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compression {
    /// Uncompressed.
    None,
    /// A bzip2 stream, possibly multi-member.
    Bzip2,
    /// A named member of a zip archive.
    ZipMember(String),
}

impl Compression {
    /// Guess the container from a file name.
    ///
    /// `.bz2` selects bzip2; `.zip` selects the NaPTAN member.
    #[must_use]
    pub fn detect(file_name: &str) -> Self {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".bz2") {
            Self::Bzip2
        } else if lower.ends_with(".zip") {
            Self::ZipMember(NAPTAN_ZIP_MEMBER.to_owned())
        } else {
            Self::None
        }
    }
}

/// Chunked, cancellable view over a byte stream.
#[derive(Debug)]
pub struct SourceReader<R> {
    inner: R,
    chunk: ChunkSize,
    cancel: CancelToken,
    bytes_read: u64,
}

impl<R: Read> SourceReader<R> {
    /// Wrap `inner`, reading at most `chunk` bytes at a time.
    pub fn new(inner: R, chunk: ChunkSize) -> Self {
        Self {
            inner,
            chunk,
            cancel: CancelToken::default(),
            bytes_read: 0,
        }
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Bytes consumed from the inner stream so far.
    pub const fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Token checked before each read.
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Buffer the reader with one chunk of capacity, ready for an XML parser.
    pub fn buffered(self) -> BufReader<Self> {
        let capacity = self.chunk.get();
        BufReader::with_capacity(capacity, self)
    }
}

impl<R: Read> Read for SourceReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::other("source read cancelled"));
        }
        let limit = buf.len().min(self.chunk.get());
        let window = buf.get_mut(..limit).unwrap_or_default();
        let read = self.inner.read(window)?;
        self.bytes_read += read as u64;
        Ok(read)
    }
}

/// Open the decoded stream of `reader` and pass it to `consume`.
///
/// Zip members borrow their archive, so the stream is only valid inside
/// the callback.
pub fn with_decoded<R, T, E, F>(
    reader: R,
    name: &str,
    compression: &Compression,
    consume: F,
) -> Result<T, E>
where
    R: Read + Seek,
    E: From<SourceError>,
    F: FnOnce(&mut dyn Read) -> Result<T, E>,
{
    match compression {
        Compression::None => {
            let mut plain = reader;
            consume(&mut plain)
        }
        Compression::Bzip2 => {
            let mut decoder = MultiBzDecoder::new(reader);
            consume(&mut decoder)
        }
        Compression::ZipMember(member) => {
            let zip_error = |source| SourceError::Zip {
                name: name.to_owned(),
                member: member.clone(),
                source,
            };
            let mut archive = ZipArchive::new(reader).map_err(zip_error)?;
            let mut file = archive.by_name(member).map_err(zip_error)?;
            consume(&mut file)
        }
    }
}

/// Map a read failure to [`SourceError`], preferring cancellation.
pub(crate) fn read_error(name: &str, cancel: &CancelToken, source: io::Error) -> SourceError {
    if cancel.is_cancelled() {
        SourceError::Cancelled {
            name: name.to_owned(),
        }
    } else {
        SourceError::Read {
            name: name.to_owned(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::{Cursor, Write};

    #[rstest]
    fn reads_never_exceed_the_chunk_size() {
        let data = vec![b'x'; 100];
        let mut reader = SourceReader::new(Cursor::new(data), ChunkSize::new(16));
        let mut buf = [0_u8; 64];
        let read = reader.read(&mut buf).expect("read succeeds");
        assert_eq!(read, 16);
        assert_eq!(reader.bytes_read(), 16);
    }

    #[rstest]
    fn cancelled_reader_stops() {
        let token = CancelToken::new();
        let mut reader =
            SourceReader::new(Cursor::new(vec![1_u8; 10]), ChunkSize::default()).with_cancel(token.clone());
        token.cancel();
        let mut buf = [0_u8; 4];
        let err = reader.read(&mut buf).expect_err("cancelled");
        let mapped = read_error("feed", reader.cancel_token(), err);
        assert!(matches!(mapped, SourceError::Cancelled { .. }));
    }

    #[rstest]
    #[case("naptan.ZIP", Compression::ZipMember(NAPTAN_ZIP_MEMBER.to_owned()))]
    #[case("oxford.osm.bz2", Compression::Bzip2)]
    #[case("oxford.osm", Compression::None)]
    fn detects_containers(#[case] name: &str, #[case] expected: Compression) {
        assert_eq!(Compression::detect(name), expected);
    }

    #[rstest]
    fn decodes_bzip2_streams() {
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(b"<osm/>").expect("compress");
        let compressed = encoder.finish().expect("finish");

        let text = with_decoded(Cursor::new(compressed), "x.bz2", &Compression::Bzip2, |stream| {
            let mut out = String::new();
            stream
                .read_to_string(&mut out)
                .map_err(|source| SourceError::Read {
                    name: "x.bz2".to_owned(),
                    source,
                })?;
            Ok::<_, SourceError>(out)
        })
        .expect("decode");
        assert_eq!(text, "<osm/>");
    }

    #[rstest]
    fn missing_zip_member_is_reported() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("other.xml", zip::write::SimpleFileOptions::default())
                .expect("start file");
            writer.write_all(b"<x/>").expect("write");
            writer.finish().expect("finish");
        }
        buffer.set_position(0);

        let result = with_decoded(
            buffer,
            "naptan.zip",
            &Compression::ZipMember(NAPTAN_ZIP_MEMBER.to_owned()),
            |_| Ok::<_, SourceError>(()),
        );
        assert!(matches!(result, Err(SourceError::Zip { .. })));
    }
}
