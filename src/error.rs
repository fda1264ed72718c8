//! Error types for the gzip module bridge.

use thiserror::Error;

/// Errors that can occur when loading or driving the gzip compute module.
///
/// Errors are `Clone` so that a memoized load failure can be handed to every
/// caller awaiting the same in-flight initialization.
#[derive(Debug, Clone, Error)]
pub enum GzipError {
    /// A boundary call was made before the module reached `Ready`.
    #[error("gzip module not initialized: call init() or init_sync() first")]
    NotInitialized,

    /// Fetching, reading, compiling, or instantiating the module failed.
    #[error("failed to load gzip module from {module}: {cause}")]
    Load {
        /// Description of the module source (path, URL, "bytes", ...).
        module: String,
        /// Reason for the load failure.
        cause: String,
    },

    /// The module allocator could not satisfy a request.
    #[error("module allocation failed: requested {requested} bytes")]
    AllocationFailure {
        /// Number of bytes requested.
        requested: u64,
    },

    /// A call across the module boundary trapped.
    #[error("module call '{function}' failed: {cause}")]
    Boundary {
        /// The export that was being called.
        function: &'static str,
        /// Reason for the failure.
        cause: String,
    },

    /// An address/length pair fell outside the module's linear memory.
    #[error("invalid module memory range: offset {offset:#x}, len {len}")]
    MemoryAccess {
        /// Start offset of the rejected range.
        offset: u32,
        /// Length of the rejected range in bytes.
        len: u32,
    },

    /// A zero-copy fill initializer failed.
    ///
    /// The staged allocation has already been returned to the module
    /// allocator when this is raised.
    #[error("input initializer failed: {cause}")]
    Fill {
        /// Reason reported by the initializer.
        cause: String,
    },

    /// The module rejected the input during decompression.
    ///
    /// Carries the human-readable message staged by the module in its error
    /// channel.
    #[error("decompression failed: {message}")]
    Decoding {
        /// Message recovered from the module's error channel.
        message: String,
    },
}

impl GzipError {
    /// Build a [`GzipError::Fill`] from any displayable cause.
    pub fn fill(cause: impl std::fmt::Display) -> Self {
        Self::Fill {
            cause: cause.to_string(),
        }
    }

    /// Check whether retrying the failed operation can succeed.
    ///
    /// Only load failures are retriable: the loader stays uninitialized and
    /// `init` may simply be called again.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Load { .. })
    }

    /// Check whether this error is recoverable by the caller.
    ///
    /// Decoding errors describe bad *input*, not a broken module; the handle
    /// remains fully usable afterwards.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decoding { .. } | Self::Fill { .. })
    }
}

/// Result type alias using [`GzipError`].
pub type Result<T> = std::result::Result<T, GzipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = GzipError::Decoding {
            message: "invalid gzip header".to_string(),
        };
        assert_eq!(err.to_string(), "decompression failed: invalid gzip header");

        let err = GzipError::MemoryAccess {
            offset: 0x100,
            len: 32,
        };
        assert!(err.to_string().contains("0x100"));
    }

    #[test]
    fn error_classification() {
        assert!(
            GzipError::Load {
                module: "wasm_gzip.wasm".to_string(),
                cause: "connection refused".to_string(),
            }
            .is_retriable()
        );
        assert!(!GzipError::NotInitialized.is_retriable());

        assert!(
            GzipError::Decoding {
                message: "truncated member".to_string(),
            }
            .is_recoverable()
        );
        assert!(
            !GzipError::AllocationFailure { requested: 1 << 40 }.is_recoverable()
        );
    }
}
