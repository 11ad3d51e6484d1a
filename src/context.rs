// src/context.rs
//! `.context()` / `.with_context()` for `Result` and `Option`, plus the
//! `bail!` / `ensure!` macros used by the shader parser and file loading.

use crate::error::{Error, Result};

/// Attach a message to a failure while converting it into [`Error`].
pub trait Context<T> {
    /// Eager message; prefer `with_context` when building it allocates.
    fn context<C: Into<String>>(self, context: C) -> Result<T>;

    /// The closure only runs on the failure path.
    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T, E> Context<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    #[inline]
    fn context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|err| err.into().context(context))
    }

    #[inline]
    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|err| err.into().context(f()))
    }
}

/// A `None` becomes [`Error::Custom`] carrying the message.
impl<T> Context<T> for Option<T> {
    #[inline]
    fn context<C: Into<String>>(self, context: C) -> Result<T> {
        self.ok_or_else(|| Error::custom(context))
    }

    #[inline]
    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.ok_or_else(|| Error::custom(f()))
    }
}

// ============================================================================
// MACROS
// ============================================================================

/// Return early with an error: a literal message, anything `Into<Error>`,
/// or a format string with arguments.
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::error::Error::msg($msg))
    };
    ($err:expr $(,)?) => {
        return Err(Into::<$crate::error::Error>::into($err))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::error::Error::format(format_args!($fmt, $($arg)*)))
    };
}

/// `bail!` unless the condition holds.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr $(,)?) => {
        if !($cond) {
            $crate::bail!($err);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($fmt, $($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_count(text: &str) -> Result<u32> {
        let count: u32 = text
            .parse()
            .map_err(|_| Error::ShaderSyntax(format!("bad count '{}'", text)))?;
        ensure!(count > 0, Error::ShaderSyntax("zero-length array".into()));
        Ok(count)
    }

    #[test]
    fn test_ensure_and_bail() {
        assert_eq!(parse_count("4").unwrap(), 4);
        assert!(parse_count("0").unwrap_err().is_parse());
        assert!(parse_count("x").unwrap_err().is_parse());
    }

    #[test]
    fn test_option_context() {
        let missing: Option<u32> = None;
        let err = missing.context("no such shader").unwrap_err();
        assert!(err.is_custom());
        assert_eq!(err.to_string(), "no such shader");
    }

    #[test]
    fn test_result_with_context() {
        let io: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = io.with_context(|| "reading shader.glsl").unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("reading shader.glsl"));
    }
}
