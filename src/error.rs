use std::io;

/// String like type that occupies the same space as one usize
type TinyStr = Box<String>;

/// Errors returned by the tree, the page stores and the durable writer.
///
/// [Error::Corruption] means a page or a structural invariant was found broken. The operation that
/// returned it was aborted midway, so the tree handle must not be used for further mutations.
#[allow(missing_docs)]
#[derive(Debug, Display, Error)]
#[display("{:?}", self)]
#[non_exhaustive]
pub enum Error {
    Validation(#[error(not(source))] TinyStr),
    Corruption(#[error(not(source))] TinyStr),
    Io(io::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(Box::new(msg.into()))
    }

    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(Box::new(msg.into()))
    }

    #[inline]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_))
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        let kind = match &value {
            Error::Io(i) => i.kind(),
            Error::Corruption(_) => io::ErrorKind::InvalidData,
            Error::Validation(_) => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, value)
    }
}

macro_rules! error_validation {
    ($($arg:tt)*) => {{
        let msg = ::std::fmt::format(::std::format_args!($($arg)*));
        crate::Error::validation(msg)
    }}
}

macro_rules! error_corruption {
    ($($arg:tt)*) => {{
        let msg = ::std::fmt::format(::std::format_args!($($arg)*));
        crate::Error::corruption(msg)
    }}
}

pub(crate) use error_corruption;
pub(crate) use error_validation;
