//! Unified error type for the tilecast crates.
//!
//! Every failure in tiling, merging, routing, or reassembly is funnelled into
//! [`Error`]. [`Error::scope`] tells the caller whether the stream can go on
//! with the next super-frame or has to be torn down.

/// How far a failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Only the current super-frame is lost; the next one may proceed.
    SuperFrame,
    /// The stream cannot continue.
    Stream,
}

/// Unified error type covering all failure modes in tilecast.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A frame or byte buffer could not be allocated.
    #[error("Allocation failed: {bytes} bytes")]
    Allocation {
        /// Size of the failed request.
        bytes: usize,
    },

    /// Tile or frame geometry is unknown or inconsistent.
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// A container packet would grow past the configured hard maximum.
    #[error("Container too large: need {needed} bytes, max {max}")]
    Oversize {
        /// Bytes the packet would need.
        needed: usize,
        /// Configured hard maximum.
        max: usize,
    },

    /// The number of picture units in a super-frame does not match the grid.
    #[error("Tile count mismatch: expected {expected} tiles, received {found}")]
    TileCountMismatch {
        /// Tiles in the grid.
        expected: usize,
        /// Picture units actually observed.
        found: usize,
    },

    /// Assembly was forced with an incomplete block collection.
    #[error("Reconstruction error: collected {collected} of {expected} tiles")]
    Reconstruction {
        /// Tiles in the grid.
        expected: usize,
        /// Tiles present in the collection.
        collected: usize,
    },

    /// Super-frame cadence deviated from the frame rate under strict timing.
    #[error("Timing error: super-frame interval {actual_ms:.1}ms, expected {expected_ms:.1}ms")]
    Timing {
        /// Interval implied by the frame rate.
        expected_ms: f64,
        /// Measured wall-clock interval.
        actual_ms: f64,
    },

    /// The wrapped single-tile codec failed.
    #[error("Codec adapter error [{stage}]: {message}")]
    CodecAdapter {
        /// Where the failure happened (open, push, pull, flush).
        stage: &'static str,
        /// Human-readable error description.
        message: String,
    },

    /// Container packet or side-channel bytes are malformed.
    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    /// An I/O operation on an injected sink failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Classify how far this failure reaches.
    pub fn scope(&self) -> ErrorScope {
        match self {
            Error::Geometry(_) | Error::CodecAdapter { .. } | Error::Io { .. } => {
                ErrorScope::Stream
            }
            Error::Allocation { .. }
            | Error::Oversize { .. }
            | Error::TileCountMismatch { .. }
            | Error::Reconstruction { .. }
            | Error::Timing { .. }
            | Error::InvalidContainer(_) => ErrorScope::SuperFrame,
        }
    }

    /// Whether the stream must be torn down after this error.
    pub fn is_stream_fatal(&self) -> bool {
        self.scope() == ErrorScope::Stream
    }

    /// Convenience constructor for [`Error::Geometry`].
    pub fn geometry(msg: impl Into<String>) -> Self {
        Error::Geometry(msg.into())
    }

    /// Convenience constructor for [`Error::CodecAdapter`].
    pub fn codec(stage: &'static str, message: impl Into<String>) -> Self {
        Error::CodecAdapter {
            stage,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::InvalidContainer`].
    pub fn invalid_container(msg: impl Into<String>) -> Self {
        Error::InvalidContainer(msg.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Allocate a zeroed byte buffer, reporting failure instead of aborting.
pub fn try_alloc_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::Allocation { bytes: len })?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversize_display() {
        let err = Error::Oversize {
            needed: 2048,
            max: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Container too large: need 2048 bytes, max 1024"
        );
        assert_eq!(err.scope(), ErrorScope::SuperFrame);
    }

    #[test]
    fn tile_count_display() {
        let err = Error::TileCountMismatch {
            expected: 4,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "Tile count mismatch: expected 4 tiles, received 3"
        );
        assert!(!err.is_stream_fatal());
    }

    #[test]
    fn geometry_is_stream_fatal() {
        let err = Error::geometry("payload before side-channel");
        assert_eq!(err.to_string(), "Geometry error: payload before side-channel");
        assert!(err.is_stream_fatal());
    }

    #[test]
    fn codec_display() {
        let err = Error::codec("open", "unsupported profile");
        assert_eq!(
            err.to_string(),
            "Codec adapter error [open]: unsupported profile"
        );
        assert!(err.is_stream_fatal());
    }

    #[test]
    fn timing_display() {
        let err = Error::Timing {
            expected_ms: 33.3,
            actual_ms: 250.0,
        };
        assert_eq!(
            err.to_string(),
            "Timing error: super-frame interval 250.0ms, expected 33.3ms"
        );
        assert_eq!(err.scope(), ErrorScope::SuperFrame);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "sink closed");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.is_stream_fatal());
    }

    #[test]
    fn alloc_zeroed() {
        let buf = try_alloc_zeroed(64).unwrap();
        assert_eq!(buf.len(), 64);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
