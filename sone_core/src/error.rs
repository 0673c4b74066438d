use crate::InsertError;

/// Errors surfaced to callers of the core.
#[derive(thiserror::Error, Debug)]
pub enum SoneError {
    /// An image insert could not be started.
    #[error("could not start image insert")]
    ImageInsert(#[source] InsertError),
    /// Any other insert failed.
    #[error("insert failed")]
    Insert(#[from] InsertError),
}

pub type SoneResult<T> = std::result::Result<T, SoneError>;
