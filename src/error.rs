//! Error types returned by table operations.

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors returned by table construction and table operations.
///
/// Every variant maps onto a negative errno-style code through
/// [`Error::errno`] for callers that need the integer form.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
  /// A creation parameter or call argument was rejected.
  #[error("invalid argument: {0}")]
  InvalidArgument(&'static str),
  /// A table with the same name is already registered.
  #[error("table `{0}` already exists")]
  AlreadyExists(String),
  /// The backing memory could not be allocated.
  #[error("out of memory")]
  OutOfMemory,
  /// No free slot could be found for a new key.
  #[error("no space left in table")]
  OutOfSpace,
  /// The key, position, or table name is not present.
  #[error("entry not found")]
  NotFound,
}

impl Error {
  /// Returns the negative errno value for this error.
  ///
  /// ```
  /// use cuckoo_tab::Error;
  ///
  /// assert_eq!(Error::NotFound.errno(), -2);
  /// assert_eq!(Error::OutOfSpace.errno(), -28);
  /// ```
  #[inline]
  pub const fn errno(&self) -> i32 {
    match self {
      Self::InvalidArgument(_) => -22,
      Self::AlreadyExists(_) => -17,
      Self::OutOfMemory => -12,
      Self::OutOfSpace => -28,
      Self::NotFound => -2,
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::error::Error;

  #[test]
  fn errno_values_are_negative() {
    let errors: [Error; 5] = [
      Error::InvalidArgument("test"),
      Error::AlreadyExists("test".to_owned()),
      Error::OutOfMemory,
      Error::OutOfSpace,
      Error::NotFound,
    ];

    for error in errors {
      assert!(error.errno() < 0, "{error} maps to a non-negative code");
    }
  }

  #[test]
  fn display_names_table() {
    let error: Error = Error::AlreadyExists("flows".to_owned());

    assert_eq!(error.to_string(), "table `flows` already exists");
  }
}
