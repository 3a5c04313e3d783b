//! Simple Temporal Networks: difference constraints `time(b) - time(a) <= w` over labelled timepoints,
//! with incremental consistency checking.

mod network;

pub use network::*;

use std::fmt::{Debug, Display};
use std::ops::{Add, Neg, Sub};

/// Numeric type usable as a distance in the network.
///
/// `infty()` stands for an absent upper bound. It is chosen far enough from the type's bounds that
/// adding a few finite weights to it never overflows.
pub trait Time:
    Add<Self, Output = Self> + Sub<Self, Output = Self> + Neg<Output = Self> + Display + Debug + Copy + Ord
{
    fn zero() -> Self;
    fn infty() -> Self;

    fn is_finite(self) -> bool {
        self < Self::infty() && self > -Self::infty()
    }
}

macro_rules! impl_time {
    ($t:ty) => {
        impl Time for $t {
            fn zero() -> Self {
                0
            }

            fn infty() -> Self {
                <$t>::MAX / 2
            }
        }
    };
}

impl_time!(i32);
impl_time!(i64);
