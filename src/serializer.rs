//! Compressed pprof serialization
//!
//! The profile is encoded as a `perftools.profiles.Profile` protobuf and
//! written through gzip, which is what `pprof` and most flame-graph viewers
//! expect. The byte count returned is what reached the sink after the gzip
//! stream was finished.

use crate::pprof;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;
use std::io::{self, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while writing or reading a profile
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to create profile file in {dir}: {source}")]
    Create {
        dir: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write profile: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to persist profile to {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid profile data: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Result type for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Writer adapter that counts the bytes accepted by the inner writer
struct CountingWriter<W> {
    inner: W,
    bytes: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writes one finished profile
#[derive(Debug)]
pub struct ProfileSerializer {
    profile: pprof::Profile,
}

impl ProfileSerializer {
    pub fn new(profile: pprof::Profile) -> Self {
        Self { profile }
    }

    /// Encode, compress and write the profile to `sink`
    ///
    /// Returns the number of compressed bytes written.
    pub fn write<W: Write>(self, sink: W) -> Result<u64> {
        let encoded = self.profile.encode_to_vec();
        let mut gz = GzEncoder::new(
            CountingWriter {
                inner: sink,
                bytes: 0,
            },
            Compression::default(),
        );
        gz.write_all(&encoded)?;
        let mut counting = gz.finish()?;
        counting.flush()?;

        debug!(
            encoded = encoded.len(),
            compressed = counting.bytes,
            "profile serialized"
        );
        Ok(counting.bytes)
    }

    /// Write the profile to `path`
    ///
    /// The data goes to a temporary file next to `path` that is renamed into
    /// place only after everything was written, so a failed export never
    /// leaves a truncated profile behind.
    pub fn write_to_path(self, path: &Path) -> Result<u64> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir).map_err(|source| ExportError::Create {
            dir: dir.display().to_string(),
            source,
        })?;

        let bytes = self.write(file.as_file_mut())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| ExportError::Persist {
            path: path.display().to_string(),
            source: e.error,
        })?;

        info!(path = %path.display(), bytes, "profile written");
        Ok(bytes)
    }
}

/// Read back a gzip-compressed profile
pub fn read_profile<R: Read>(source: R) -> Result<pprof::Profile> {
    let mut decoder = GzDecoder::new(source);
    let mut buffer = Vec::new();
    decoder.read_to_end(&mut buffer)?;
    Ok(pprof::Profile::decode(buffer.as_slice())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn profile() -> pprof::Profile {
        pprof::Profile {
            string_table: vec![String::new(), "woken".to_string(), "count".to_string()],
            sample_types: vec![pprof::ValueType { r#type: 1, unit: 2 }],
            samples: vec![pprof::Sample {
                location_ids: vec![1],
                values: vec![3],
            }],
            ..pprof::Profile::default()
        }
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_byte_count_matches_sink() {
        let mut buffer = Vec::new();
        let bytes = ProfileSerializer::new(profile()).write(&mut buffer).unwrap();
        assert_eq!(bytes, buffer.len() as u64);
        // gzip magic
        assert_eq!(&buffer[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_write_then_read() {
        let mut buffer = Vec::new();
        ProfileSerializer::new(profile()).write(&mut buffer).unwrap();
        let decoded = read_profile(buffer.as_slice()).unwrap();
        assert_eq!(decoded, profile());
    }

    #[test]
    fn test_sink_failure_is_reported() {
        let err = ProfileSerializer::new(profile()).write(FailingSink).unwrap_err();
        assert!(matches!(err, ExportError::Io(_)));
    }

    #[test]
    fn test_write_to_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wakeups.pb.gz");
        let bytes = ProfileSerializer::new(profile()).write_to_path(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), bytes);
        // Only the profile itself remains in the directory
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_to_missing_dir_fails_without_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("wakeups.pb.gz");
        let err = ProfileSerializer::new(profile()).write_to_path(&path).unwrap_err();
        assert!(matches!(err, ExportError::Create { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_read_garbage_fails() {
        assert!(read_profile(&b"not a profile"[..]).is_err());
    }
}
