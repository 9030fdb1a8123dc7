pub mod factors;
pub mod indicators;
pub mod suite;

#[cfg(test)]
mod indicators_tests;

pub use factors::*;
pub use indicators::*;
pub use suite::append_canonical_indicators;
