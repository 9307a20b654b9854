//! Error taxonomy for table operations

use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// The slot allocator could not produce a slot for a new entry.
    AllocationFailure,
    /// Capacity reached and eviction was disabled or freed nothing.
    TableFull,
    /// The table was configured with zero capacity and stores nothing.
    TableDisabled,
    /// Rejected at construction: a `string` table needs room for at least
    /// one byte plus the terminator.
    InvalidKeySize,
}

impl Error {
    pub fn as_str(self) -> &'static str {
        match self {
            Error::AllocationFailure => "Slot allocation failed",
            Error::TableFull => "Table full",
            Error::TableDisabled => "Table disabled (zero capacity)",
            Error::InvalidKeySize => "Invalid key size",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for Error {}
