//! Search engines for temporal probabilistic planning problems.
//!
//! The [Mdp] turns a converted problem into a stochastic transition system, the [PlanStn] keeps
//! track of the temporal consistency of the actions chosen in regular mode, and the [Trpg]
//! estimates how promising a state is. On top of them, [Mcts] and [Rtdp] choose one action at a
//! time, and [plan] drives them until the goals are achieved or the deadline is exceeded.

mod config;
mod evaluate;
mod heuristic;
mod mdp;
mod plan_stn;
mod planner;
pub mod search;

pub use config::*;
pub use evaluate::*;
pub use heuristic::*;
pub use mdp::*;
pub use plan_stn::*;
pub use planner::*;
pub use search::{Decision, Mcts, Rtdp, Search};
