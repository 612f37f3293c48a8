use std::collections::TryReserveError;

/// Errors reported by [`DenseIntMap`](crate::DenseIntMap) operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Keys are node ordinals and must not be negative.
    #[error("invalid key {0}: keys must be non-negative")]
    InvalidKey(i32),

    /// The backing array could not be allocated.
    #[error("failed to allocate backing array of {capacity} slots")]
    Allocation {
        capacity: usize,
        #[source]
        source: TryReserveError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            Error::InvalidKey(-3).to_string(),
            "invalid key -3: keys must be non-negative"
        );

        let source = Vec::<u64>::new().try_reserve_exact(usize::MAX).unwrap_err();
        let err = Error::Allocation { capacity: usize::MAX, source };
        assert!(err.to_string().starts_with("failed to allocate backing array"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
