//! Benchmark problems for the temporal probabilistic planners, and the glue that compiles them
//! for a given search mode.

pub mod domains;
