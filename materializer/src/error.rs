//! The single error type surfaced by every fallible operation in this crate.

use std::{error, fmt};

/// A boxed collaborator error.
///
/// Every external collaborator (`MemoryMap`, `PersistentStore`, `ValueObject`,
/// `RegisterContext`) is generic over its own concrete error type; this crate does not need to
/// name it, only to propagate and display it, so collaborator failures are boxed before crossing
/// into [`Error`].
pub type CollaboratorError = Box<dyn error::Error + 'static>;

/// Errors that can occur while materializing or dematerializing an argument struct.
#[derive(Debug)]
pub enum Error {
    /// No [`Target`][crate::collaborators::Target] was available from the execution scope.
    NoTarget,
    /// Neither the frame nor the memory map could provide an execution scope.
    NoExecutionScope,
    /// The operation requires a stack frame, but none was bound.
    NoFrame,
    /// The memory map failed to satisfy an allocation request.
    AllocationFailed(CollaboratorError),
    /// The memory map failed to free a previously allocated region.
    DeallocationFailed(CollaboratorError),
    /// Reading from inferior memory failed.
    ReadFailed(CollaboratorError),
    /// Writing to inferior memory failed.
    WriteFailed(CollaboratorError),
    /// A variable's data size disagreed with its declared type, or a register's data size
    /// differed from the expected size.
    SizeMismatch {
        /// The size, in bytes, that was expected.
        expected: usize,
        /// The size, in bytes, that was actually observed.
        actual: usize,
    },
    /// A temporary allocation already existed when an entity tried to create a fresh one.
    DoubleAllocation,
    /// A live location was a file address where a load address was required.
    BadAddressForm,
    /// A persistent variable's flags left it unable to be materialized.
    NotMaterialized,
    /// A persistent variable's flags left it unable to be dematerialized.
    NotDematerialized,
    /// A second `materialize` was attempted while a [`Dematerializer`][crate::Dematerializer] was
    /// still outstanding.
    AlreadyMaterialized,
    /// A [`Dematerializer`][crate::Dematerializer] was used after being consumed.
    Invalidated,
    /// The generic `dematerialize` entry point was invoked on the result entity, which requires
    /// the specialized, out-parameter-taking entry point instead.
    WrongEntry,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTarget => write!(f, "no target is available from the execution scope"),
            Self::NoExecutionScope => {
                write!(f, "neither the frame nor the memory map yielded an execution scope")
            }
            Self::NoFrame => write!(f, "operation requires a stack frame, but none was bound"),
            Self::AllocationFailed(error) => write!(f, "inferior allocation failed: {error}"),
            Self::DeallocationFailed(error) => write!(f, "inferior deallocation failed: {error}"),
            Self::ReadFailed(error) => write!(f, "reading inferior memory failed: {error}"),
            Self::WriteFailed(error) => write!(f, "writing inferior memory failed: {error}"),
            Self::SizeMismatch { expected, actual } => write!(
                f,
                "size mismatch: expected {expected} bytes, found {actual} bytes"
            ),
            Self::DoubleAllocation => {
                write!(f, "a temporary allocation already exists for this entity")
            }
            Self::BadAddressForm => write!(f, "live location is a file address, not a load address"),
            Self::NotMaterialized => {
                write!(f, "persistent variable flags do not permit materialization")
            }
            Self::NotDematerialized => {
                write!(f, "persistent variable flags do not permit dematerialization")
            }
            Self::AlreadyMaterialized => {
                write!(f, "a dematerializer is already outstanding for this materializer")
            }
            Self::Invalidated => write!(f, "dematerializer was used after being consumed"),
            Self::WrongEntry => write!(
                f,
                "the generic dematerialize entry point cannot be used for the result entity"
            ),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::AllocationFailed(error)
            | Self::DeallocationFailed(error)
            | Self::ReadFailed(error)
            | Self::WriteFailed(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}
