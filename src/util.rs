use std::cell::Cell;
use std::sync::atomic::Ordering::{Relaxed, SeqCst};
use std::sync::atomic::{AtomicIsize, AtomicUsize};

use arr_macro::arr;

/// Number of stripes in a [`Counter`]. Must match the literal passed to `arr!` below.
pub const MAX_STRIPES: usize = 32;

const PADDING_BYTES: usize = 64;

pub type PadBytes<const N: usize> = [bool; N];

#[repr(C, align(64))]
struct AtomicIsizePadded(AtomicIsize);

impl AtomicIsizePadded {
    fn new(val: isize) -> Self {
        Self(AtomicIsize::new(val))
    }
}

static NEXT_STRIPE: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static STRIPE: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Stripe owned by the calling thread, assigned round-robin on first use.
fn stripe() -> usize {
    STRIPE.with(|cell| match cell.get() {
        Some(idx) => idx,
        None => {
            let idx = NEXT_STRIPE.fetch_add(1, Relaxed) % MAX_STRIPES;
            cell.set(Some(idx));
            idx
        }
    })
}

/// Striped signed counter.
///
/// Each thread adds into its own cache-line padded stripe, so writers on
/// different threads do not contend on one word. Individual stripes may go
/// negative when one thread inserts and another removes; only the sum is
/// meaningful.
#[repr(C, align(64))]
pub struct Counter {
    _padding0: PadBytes<PADDING_BYTES>,
    stripes: [AtomicIsizePadded; MAX_STRIPES],
    _padding1: PadBytes<PADDING_BYTES>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            _padding0: [false; PADDING_BYTES],
            stripes: arr![AtomicIsizePadded::new(0); 32],
            _padding1: [false; PADDING_BYTES],
        }
    }

    #[inline]
    pub fn add(&self, delta: isize) {
        self.stripes[stripe()].0.fetch_add(delta, SeqCst);
    }

    #[inline]
    pub fn inc(&self) {
        self.add(1);
    }

    #[inline]
    pub fn dec(&self) {
        self.add(-1);
    }

    /// Sum over all stripes. Exact once every `add` has returned.
    pub fn sum(&self) -> isize {
        self.stripes
            .iter()
            .fold(0, |acc, stripe| acc + stripe.0.load(SeqCst))
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_sizes() {
        use std::mem::size_of;
        assert_eq!(size_of::<PadBytes<64>>(), 64);
        assert_eq!(size_of::<AtomicIsizePadded>(), 64);
        assert_eq!(
            size_of::<Counter>(),
            (MAX_STRIPES + 2) * PADDING_BYTES
        );
    }

    #[test]
    fn test_init() {
        let counter = Counter::new();
        assert_eq!(counter.sum(), 0);
    }

    #[test]
    fn stripe_is_stable_per_thread() {
        let first = stripe();
        assert_eq!(first, stripe());
        assert!(first < MAX_STRIPES);
    }

    #[test]
    fn test_inc_dec_across_threads() {
        let counter = Counter::new();
        std::thread::scope(|s| {
            for tid in 0..MAX_THREADS_IN_TEST {
                let cref = &counter;
                s.spawn(move || {
                    for _ in 0..1000 {
                        cref.inc();
                    }
                    if tid % 2 == 0 {
                        for _ in 0..500 {
                            cref.dec();
                        }
                    }
                });
            }
        });
        let evens = (MAX_THREADS_IN_TEST + 1) / 2;
        assert_eq!(
            counter.sum(),
            (MAX_THREADS_IN_TEST * 1000 - evens * 500) as isize
        );
    }

    #[test]
    fn negative_stripes_cancel() {
        let counter = Counter::new();
        counter.inc();
        std::thread::scope(|s| {
            s.spawn(|| counter.dec());
        });
        assert_eq!(counter.sum(), 0);
    }

    const MAX_THREADS_IN_TEST: usize = 40;
}
