//! Ground representation of temporal probabilistic planning problems, and the compilers that turn
//! durative actions into the instantaneous-shaped actions manipulated by the search engines.

mod actions;
mod atoms;
pub mod compile;
mod effects;
pub mod errors;
mod problem;
mod state;

pub use actions::*;
pub use atoms::*;
pub use effects::*;
pub use problem::*;
pub use state::*;

pub type Res<T> = anyhow::Result<T>;
