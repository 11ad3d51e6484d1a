// src/error.rs
//! Error handling for the whole crate.
//!
//! - **Taxonomy**: broken assets (preprocess/syntax/unknown type), lookup failures,
//!   capacity overflows and render-thread failures each get their own variant.
//! - **Features**: context chaining, custom messages, transparent std errors, `is_*` helpers, `Result` alias.
//! - Binding-resolution misses are *not* errors; they are logged and skipped.

use std::fmt;
use thiserror::Error;

/// Main error type. Send + Sync + 'static so it can cross the render thread boundary.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O errors (loading shader files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed `#type` marker or unknown stage name.
    #[error("shader preprocess error: {0}")]
    Preprocess(String),

    /// Unterminated struct/uniform statement or malformed array suffix.
    #[error("shader syntax error: {0}")]
    ShaderSyntax(String),

    /// Uniform or struct field type that is neither primitive nor a known struct.
    #[error("unknown type '{type_name}' for '{name}'")]
    UnknownType { type_name: String, name: String },

    /// `Material::set` on a name the shader does not declare.
    #[error("uniform '{0}' not found in material buffers")]
    UniformNotFound(String),

    /// Texture set on a name that is not a sampler declaration.
    #[error("resource '{0}' not found in shader")]
    ResourceNotFound(String),

    /// `ByteBuffer` write or read past its capacity.
    #[error("buffer overflow: {size} bytes at offset {offset} exceeds capacity {capacity}")]
    BufferOverflow {
        offset: usize,
        size: usize,
        capacity: usize,
    },

    /// The command queue arena is out of space under the fixed-budget policy.
    #[error("render command queue full: requested {requested} bytes with {used}/{capacity} in use")]
    CommandQueueFull {
        requested: usize,
        used: usize,
        capacity: usize,
    },

    /// The backend failed to compile or link a program.
    #[error("shader compile error: {0}")]
    ShaderCompile(String),

    /// The render thread hung up or panicked.
    #[error("render thread error: {0}")]
    RenderThread(String),

    /// Opaque wrapper for any other error.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Simple custom message.
    #[error("{0}")]
    Custom(String),

    /// Context chaining.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a custom error message.
    #[inline]
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Self::Custom(msg.into())
    }

    /// Create a formatted custom error (like `format!` but returns `Error`).
    #[inline]
    pub fn format(args: fmt::Arguments) -> Self {
        Self::Custom(fmt::format(args))
    }

    /// Add context to any error (chainable, like `.context()` in anyhow).
    #[inline]
    pub fn context<C: Into<String>>(self, context: C) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    /// Quick static message.
    #[inline]
    pub fn msg(msg: &'static str) -> Self {
        Self::Custom(msg.into())
    }

    /// Strip any `WithContext` layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    // === Kind checks (look through context layers) ===
    #[inline]
    pub fn is_io(&self) -> bool {
        matches!(self.root(), Error::Io(_))
    }

    /// True for every error that means the shader asset itself is broken.
    #[inline]
    pub fn is_parse(&self) -> bool {
        matches!(
            self.root(),
            Error::Preprocess(_) | Error::ShaderSyntax(_) | Error::UnknownType { .. }
        )
    }

    #[inline]
    pub fn is_lookup(&self) -> bool {
        matches!(self.root(), Error::UniformNotFound(_) | Error::ResourceNotFound(_))
    }

    #[inline]
    pub fn is_overflow(&self) -> bool {
        matches!(
            self.root(),
            Error::BufferOverflow { .. } | Error::CommandQueueFull { .. }
        )
    }

    #[inline]
    pub fn is_custom(&self) -> bool {
        matches!(self.root(), Error::Custom(_))
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Self::Custom(msg.to_owned())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Self::Custom(msg)
    }
}

/// Convenient `Result` alias. Use `crate::Result<T>` everywhere.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain_keeps_kind() {
        let err = Error::ShaderSyntax("missing ';'".into()).context("loading 'flat'");
        assert!(err.is_parse());
        assert!(!err.is_io());
        assert_eq!(err.to_string(), "loading 'flat': shader syntax error: missing ';'");
    }

    #[test]
    fn test_overflow_message() {
        let err = Error::BufferOverflow {
            offset: 12,
            size: 8,
            capacity: 16,
        };
        assert!(err.is_overflow());
        assert_eq!(
            err.to_string(),
            "buffer overflow: 8 bytes at offset 12 exceeds capacity 16"
        );
    }
}
