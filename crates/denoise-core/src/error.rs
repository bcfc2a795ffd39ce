//! Error types for denoise operations.
//!
//! Every failure in the runtime is reported through the single [`Error`] enum.
//! Callers that only care about the broad category inspect [`Error::kind`],
//! which maps each variant onto a coarse [`ErrorKind`].
//!
//! # Categories
//!
//! - **Configuration**: invalid or missing option combinations, unknown option
//!   names, type-mismatched option access, image size/format mismatches,
//!   unusable weights. Never retried; filter state is left unchanged.
//! - **Resource**: allocation or network construction failures.
//! - **Invalid operation**: calls made in the wrong state, e.g. executing a
//!   filter that has not been committed.
//! - **I/O**: file errors (only produced by front ends).
//!
//! # Usage
//!
//! ```rust
//! use denoise_core::{Error, ErrorKind, Result};
//!
//! fn check_scale(scale: f32) -> Result<()> {
//!     if !(scale.is_finite() && scale > 0.0) {
//!         return Err(Error::invalid_argument(format!("invalid input scale {scale}")));
//!     }
//!     Ok(())
//! }
//!
//! assert_eq!(check_scale(-1.0).unwrap_err().kind(), ErrorKind::Configuration);
//! ```

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid or missing option combination. The caller must fix its input.
    Configuration,
    /// Memory or backend resources could not be obtained.
    Resource,
    /// The operation is not valid in the object's current state.
    InvalidOperation,
    /// File system or stream error.
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Configuration => "configuration error",
            Self::Resource => "resource error",
            Self::InvalidOperation => "invalid operation",
            Self::Io => "I/O error",
        };
        f.write_str(name)
    }
}

/// Errors produced by the denoise runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// Option name not recognized by the object it was set on.
    #[error("unsupported option '{name}' for {owner}")]
    UnsupportedOption {
        /// Option name as passed by the caller
        name: String,
        /// Object type that rejected it (e.g. "RT filter")
        owner: String,
    },

    /// Option accessed with an accessor of the wrong type.
    #[error("option '{name}' is of type {actual}, not {requested}")]
    TypeMismatch {
        /// Option name
        name: String,
        /// Type of the accessor used
        requested: &'static str,
        /// Declared type of the option
        actual: &'static str,
    },

    /// Invalid option value or combination.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A required image is not bound.
    #[error("{0} image not specified")]
    MissingImage(&'static str),

    /// Bound images do not share the same dimensions.
    #[error("{name} image is {width}x{height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        /// Name of the offending image
        name: &'static str,
        /// Its width
        width: usize,
        /// Its height
        height: usize,
        /// Width of the reference (color) image
        expected_width: usize,
        /// Height of the reference (color) image
        expected_height: usize,
    },

    /// Pixel format not usable for the requested role.
    #[error("unsupported pixel format {format} for {role}")]
    UnsupportedFormat {
        /// Format description
        format: String,
        /// Role the image was bound to
        role: String,
    },

    /// Weight blob missing or malformed.
    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    /// Memory allocation failed.
    #[error("out of memory: failed to allocate {requested} bytes for {what}")]
    OutOfMemory {
        /// Bytes requested
        requested: usize,
        /// What the allocation was for
        what: String,
    },

    /// Backend failed to construct or run a network.
    #[error("backend error: {0}")]
    Backend(String),

    /// Operation not valid in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates an [`Error::UnsupportedOption`] error.
    #[inline]
    pub fn unsupported_option(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::UnsupportedOption {
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// Creates an [`Error::TypeMismatch`] error.
    #[inline]
    pub fn type_mismatch(name: impl Into<String>, requested: &'static str, actual: &'static str) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            requested,
            actual,
        }
    }

    /// Creates an [`Error::InvalidArgument`] error.
    #[inline]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates an [`Error::DimensionMismatch`] error.
    #[inline]
    pub fn dimension_mismatch(name: &'static str, got: (usize, usize), expected: (usize, usize)) -> Self {
        Self::DimensionMismatch {
            name,
            width: got.0,
            height: got.1,
            expected_width: expected.0,
            expected_height: expected.1,
        }
    }

    /// Creates an [`Error::UnsupportedFormat`] error.
    #[inline]
    pub fn unsupported_format(format: impl std::fmt::Display, role: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.to_string(),
            role: role.into(),
        }
    }

    /// Creates an [`Error::InvalidWeights`] error.
    #[inline]
    pub fn invalid_weights(msg: impl Into<String>) -> Self {
        Self::InvalidWeights(msg.into())
    }

    /// Creates an [`Error::OutOfMemory`] error.
    #[inline]
    pub fn out_of_memory(requested: usize, what: impl Into<String>) -> Self {
        Self::OutOfMemory {
            requested,
            what: what.into(),
        }
    }

    /// Creates an [`Error::Backend`] error.
    #[inline]
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Creates an [`Error::InvalidOperation`] error.
    #[inline]
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Returns the coarse category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedOption { .. }
            | Self::TypeMismatch { .. }
            | Self::InvalidArgument(_)
            | Self::MissingImage(_)
            | Self::DimensionMismatch { .. }
            | Self::UnsupportedFormat { .. }
            | Self::InvalidWeights(_) => ErrorKind::Configuration,
            Self::OutOfMemory { .. } | Self::Backend(_) => ErrorKind::Resource,
            Self::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns `true` if this is a configuration error.
    #[inline]
    pub fn is_configuration_error(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    /// Returns `true` if this is a resource error.
    #[inline]
    pub fn is_resource_error(&self) -> bool {
        self.kind() == ErrorKind::Resource
    }
}
