use std::fmt;

/// Errors from scancode table and device operations
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// Memory for the table could not be allocated
    OutOfMemory,
    /// The table is full and already at its maximum size
    CapacityExhausted,
    /// Index is beyond the number of entries in the table
    OutOfRange,
    /// Scancode not present and insertion was not allowed
    NotFound,
    /// Malformed request
    InvalidArgument,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "out of memory"),
            Error::CapacityExhausted => write!(f, "scancode table is full"),
            Error::OutOfRange => write!(f, "index out of range"),
            Error::NotFound => write!(f, "scancode not found"),
            Error::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

impl std::error::Error for Error {}
