use konst::{primitive::parse_usize, unwrap_ctx};

/// Initial capacity used by [`DenseIntMap::new`](crate::DenseIntMap::new).
///
/// Override at build time with `SYNCHRONIZED_DEFAULT_CAPACITY=<n>`.
pub const DEFAULT_CAPACITY: usize = match option_env!("SYNCHRONIZED_DEFAULT_CAPACITY") {
    Some(value) => unwrap_ctx!(parse_usize(value)),
    None => 16,
};

/// How the backing array is enlarged when a key lands past its end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GrowthPolicy {
    /// Grow to `max(2 * capacity, key + 1)`, amortizing sequential inserts.
    #[default]
    Doubling,
    /// Grow to exactly `key + 1`.
    Exact,
}

impl GrowthPolicy {
    /// Capacity to allocate so that index `required - 1` fits.
    pub fn next_capacity(self, current: usize, required: usize) -> usize {
        match self {
            GrowthPolicy::Doubling => current.saturating_mul(2).max(required),
            GrowthPolicy::Exact => required,
        }
    }
}
