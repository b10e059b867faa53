//! Combination enumeration for the delta sweep.
//!
//! [`CombinationGenerator`] yields every r-element subset of a pool exactly
//! once — no duplicates, no omissions — using the standard lexicographic
//! next-combination step over an ascending index array. The exact total
//! C(n,r) is computed up front so the sweep can size its progress reporting
//! and the iterator knows when it is exhausted; the subsets themselves are
//! produced one at a time and never materialized as a list.
//!
//! No I/O. One instance is single-use and not restartable.

use std::fmt;

// ---------------------------------------------------------------------------
// CombinationError
// ---------------------------------------------------------------------------

/// Precondition violations when constructing a [`CombinationGenerator`].
///
/// These indicate caller defects (the sweep special-cases r = 0 and r = n
/// before ever constructing a generator), so callers are expected to
/// propagate them as fatal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CombinationError {
    /// The pool was empty.
    EmptyPool,
    /// A subset size of zero was requested.
    SizeZero,
    /// The requested subset size exceeds the pool size.
    SizeExceedsPool {
        /// Requested subset size.
        size: usize,
        /// Number of elements in the pool.
        pool: usize,
    },
    /// C(pool, size) does not fit in 128 bits.
    CountOverflow {
        /// Requested subset size.
        size: usize,
        /// Number of elements in the pool.
        pool: usize,
    },
}

impl fmt::Display for CombinationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPool => write!(f, "cannot enumerate subsets of an empty pool"),
            Self::SizeZero => write!(f, "subset size must be at least 1"),
            Self::SizeExceedsPool { size, pool } => {
                write!(f, "subset size {size} exceeds pool size {pool}")
            }
            Self::CountOverflow { size, pool } => {
                write!(f, "C({pool},{size}) overflows the combination counter")
            }
        }
    }
}

impl std::error::Error for CombinationError {}

// ---------------------------------------------------------------------------
// binomial
// ---------------------------------------------------------------------------

/// Exact C(n,r), or `None` on 128-bit overflow.
///
/// Multiplicative form: every intermediate value is itself a binomial
/// coefficient, so each division is exact.
#[must_use]
pub fn binomial(n: usize, r: usize) -> Option<u128> {
    if r > n {
        return Some(0);
    }
    let r = r.min(n - r);
    let mut c: u128 = 1;
    for i in 1..=r {
        c = c.checked_mul((n - r + i) as u128)? / i as u128;
    }
    Some(c)
}

// ---------------------------------------------------------------------------
// CombinationGenerator
// ---------------------------------------------------------------------------

/// Iterator over all size-`r` subsets of a pool of distinct elements.
///
/// Yield order is unspecified (currently lexicographic over pool indices).
/// The pool's elements are assumed distinct — the generator enumerates index
/// subsets and never compares elements.
#[derive(Debug)]
pub struct CombinationGenerator<T> {
    pool: Vec<T>,
    indices: Vec<usize>,
    total: u128,
    produced: u128,
    started: bool,
}

impl<T: Clone> CombinationGenerator<T> {
    /// Create a generator over all `size`-element subsets of `pool`.
    ///
    /// # Errors
    ///
    /// Fails for an empty pool, `size == 0`, `size > pool.len()`, or a
    /// subset count beyond 128 bits. The r = 0 and r = n cases are the
    /// caller's to special-case, per the sweep's semantics.
    pub fn new(pool: Vec<T>, size: usize) -> Result<Self, CombinationError> {
        if pool.is_empty() {
            return Err(CombinationError::EmptyPool);
        }
        if size == 0 {
            return Err(CombinationError::SizeZero);
        }
        if size > pool.len() {
            return Err(CombinationError::SizeExceedsPool {
                size,
                pool: pool.len(),
            });
        }
        let total = binomial(pool.len(), size).ok_or(CombinationError::CountOverflow {
            size,
            pool: pool.len(),
        })?;
        Ok(Self {
            indices: (0..size).collect(),
            pool,
            total,
            produced: 0,
            started: false,
        })
    }

    /// The exact number of subsets this generator yields in total.
    #[must_use]
    pub fn total(&self) -> u128 {
        self.total
    }

    /// Subsets not yet yielded.
    #[must_use]
    pub fn remaining(&self) -> u128 {
        self.total - self.produced
    }

    /// Step the index array to the next combination.
    ///
    /// Finds the rightmost index not at its maximum allowed position,
    /// increments it, and resets everything to its right to be consecutive.
    /// Only called while `produced < total`, so a successor always exists.
    fn advance(&mut self) {
        let n = self.pool.len();
        let r = self.indices.len();
        let mut i = r;
        while i > 0 {
            i -= 1;
            if self.indices[i] != i + n - r {
                self.indices[i] += 1;
                for j in i + 1..r {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                return;
            }
        }
        unreachable!("combination counter and index array disagree");
    }
}

impl<T: Clone> Iterator for CombinationGenerator<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.produced == self.total {
            return None;
        }
        if self.started {
            self.advance();
        } else {
            self.started = true;
        }
        self.produced += 1;
        Some(self.indices.iter().map(|&i| self.pool[i].clone()).collect())
    }
}
