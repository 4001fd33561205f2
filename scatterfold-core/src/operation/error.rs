//! Operation error type.
//!
//! An operation body reports failure with an [`OperationError`]. The worker
//! turns it into an error-tagged result message, and the driver fails the
//! whole call once it sees that message. Nothing is retried: retry policy, if
//! desired, belongs to the caller of the driver.
use std::fmt;

/// An error raised from within an operation body.
///
/// ## Example
///
/// ```
/// use scatterfold::operation::{Operation, OperationError, Result};
/// # use scatterfold::opkind_derive::OpKind;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, Debug, Clone, Copy)]
/// struct CheckedDivide(i64);
///
/// impl Operation for CheckedDivide {
///     type Input = i64;
///     type Output = i64;
/// #   type Kind = MyOps;
///
///     fn execute(&self, input: i64, _index: usize) -> Result<i64> {
///         match input.checked_div(self.0) {
///             Some(out) => Ok(out),
///             None => OperationError::from_str("division by zero").into(),
///         }
///     }
/// }
/// # #[derive(OpKind, Serialize, Deserialize, Debug, Clone)]
/// # enum MyOps {
/// #     #[op(map)]
/// #     CheckedDivide(CheckedDivide),
/// # }
///
/// assert_eq!(CheckedDivide(2).execute(10, 0).unwrap(), 5);
/// assert_eq!(
///     CheckedDivide(0).execute(10, 0).unwrap_err().to_string(),
///     "operation failed: division by zero"
/// );
/// ```
#[derive(Debug)]
pub struct OperationError {
    err: anyhow::Error,
}

impl OperationError {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self { err: err.into() }
    }

    pub fn from_anyhow(err: anyhow::Error) -> Self {
        Self { err }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(err: &str) -> Self {
        Self {
            err: anyhow::Error::msg(err.to_string()),
        }
    }

    /// Extract the underlying error as a reference.
    pub fn as_err(&self) -> &anyhow::Error {
        &self.err
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation failed: {:#}", self.err)
    }
}

impl<E> From<E> for OperationError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(value: E) -> Self {
        Self { err: value.into() }
    }
}

impl<T> From<OperationError> for Result<T> {
    fn from(value: OperationError) -> Self {
        Err(value)
    }
}

pub type Result<T> = std::result::Result<T, OperationError>;
