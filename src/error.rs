use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

macro_rules! argument_error {
    ($msg:expr) => {
        crate::Error::ArgumentOutOfRange($msg.to_string())
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::ArgumentOutOfRange(format!($fmt, $($arg)*))
    };
}

macro_rules! invalid_operation {
    ($msg:expr) => {
        crate::Error::InvalidOperation($msg.to_string())
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidOperation(format!($fmt, $($arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the failure classes of the metadata format itself: caller mistakes
/// ([`Error::ArgumentOutOfRange`], [`Error::InvalidOperation`]) are kept apart from problems
/// with untrusted input ([`Error::Malformed`], [`Error::OutOfBounds`]). None of these are
/// retried internally.
///
/// # Examples
///
/// ```rust
/// use metascope::{BlobBuilder, Error};
///
/// let mut builder = BlobBuilder::new();
/// match builder.write_compressed_integer(0x2000_0000) {
///     Err(Error::ArgumentOutOfRange(message)) => println!("rejected: {message}"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A caller passed a count, size or value outside of what the encoding can represent.
    ///
    /// Examples are compressed integers above `0x1FFF_FFFF`, a `#US` heap growing past its
    /// 24-bit offset space or a version string longer than the root header permits.
    #[error("Argument out of range - {0}")]
    ArgumentOutOfRange(String),

    /// An operation was attempted that the current object state does not permit.
    ///
    /// Raised when writing to a [`crate::BlobBuilder`] that has been linked into another chain,
    /// when a handle of the wrong kind is converted, or when a sorted metadata table is out of
    /// order and validation was not suppressed.
    #[error("Invalid operation - {0}")]
    InvalidOperation(String),

    /// The input is damaged and could not be parsed.
    ///
    /// This is the bad-image-format class: a truncated header, a wrong signature, illegal table
    /// bits, an oversized row count or an unreadable compressed integer. The error includes the
    /// source location where the malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted.
    ///
    /// Raised by reader cursors and memory block views as well as by reservation windows of
    /// a [`crate::BlobBuilder`].
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors from loading metadata files or writing builder content
    /// to an [`std::io::Write`] sink.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_carries_location() {
        let error = malformed_error!("bad signature - {}", 0x1234);
        match error {
            Error::Malformed {
                message,
                file,
                line,
            } => {
                assert_eq!(message, "bad signature - 4660");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            _ => panic!("unexpected error variant"),
        }
    }

    #[test]
    fn display() {
        assert_eq!(
            argument_error!("value {} too large", 7).to_string(),
            "Argument out of range - value 7 too large"
        );
        assert_eq!(
            invalid_operation!("builder is linked").to_string(),
            "Invalid operation - builder is linked"
        );
        assert_eq!(
            out_of_bounds_error!().to_string(),
            "Out of Bound read would have occurred!"
        );
    }
}
