use derive_more::derive::Display;
use std::str::FromStr;
use std::time::Duration;

/// Search algorithm used to choose each action.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum Strategy {
    #[display("mcts")]
    Mcts,
    #[display("rtdp")]
    Rtdp,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mcts" => Ok(Strategy::Mcts),
            "rtdp" => Ok(Strategy::Rtdp),
            _ => Err(format!("Unknown strategy: '{s}'. Valid options are: 'mcts', 'rtdp'")),
        }
    }
}

/// How MCTS aggregates the returns of a node.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum Selection {
    /// Running mean of the returns.
    #[display("avg")]
    Avg,
    /// Mean for action nodes, maximum over the children for state nodes.
    #[display("max")]
    Max,
    /// Returns are attributed to the interval of legal start times of the root action, and a node is
    /// worth the best interval.
    #[display("rootInterval")]
    RootInterval,
}

impl FromStr for Selection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avg" => Ok(Selection::Avg),
            "max" => Ok(Selection::Max),
            "rootInterval" => Ok(Selection::RootInterval),
            _ => Err(format!(
                "Unknown selection: '{s}'. Valid options are: 'avg', 'max', 'rootInterval'"
            )),
        }
    }
}

/// How the value of a newly created node is estimated.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum LeafEvaluation {
    /// Temporal relaxed planning graph heuristic.
    #[display("heuristic")]
    Heuristic,
    /// Discounted return of a uniformly random walk.
    #[display("rollout")]
    Rollout,
}

impl FromStr for LeafEvaluation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heuristic" => Ok(LeafEvaluation::Heuristic),
            "rollout" => Ok(LeafEvaluation::Rollout),
            _ => Err(format!(
                "Unknown leaf evaluation: '{s}'. Valid options are: 'heuristic', 'rollout'"
            )),
        }
    }
}

/// Rewards of the decision process.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Rewards {
    /// Reward of a transition into a goal state.
    pub goal: f64,
    /// Reward of any other transition. Expected to be non-positive.
    pub step: f64,
    /// Value of a state in which no action is applicable.
    pub dead_end: f64,
}

impl Default for Rewards {
    fn default() -> Self {
        Rewards {
            goal: 1.0,
            step: 0.0,
            dead_end: -100.0,
        }
    }
}

/// Parameters of the planning loop and of the search engines.
#[derive(Clone, Debug)]
pub struct PlannerConfig {
    pub strategy: Strategy,
    pub selection: Selection,
    pub leaf: LeafEvaluation,
    /// UCT exploration constant.
    pub exploration: f64,
    pub discount: f64,
    /// Maximal depth of a search iteration, relative to the root.
    pub search_depth: u32,
    /// Time budget of each decision.
    pub search_time: Duration,
    /// If set, each decision stops after this many iterations even if time remains.
    pub max_iterations: Option<u64>,
    /// With [Selection::Max], number of children evaluated when a state node is created.
    pub max_children: usize,
    /// Keep the subtree of the executed outcome between two decisions.
    pub reuse_tree: bool,
    /// Fix the time of each executed action in the schedule.
    pub fix_time: bool,
    /// Maximal number of executed actions before giving up.
    pub max_steps: usize,
    pub rewards: Rewards,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            strategy: Strategy::Mcts,
            selection: Selection::Avg,
            leaf: LeafEvaluation::Heuristic,
            exploration: 10.0,
            discount: 0.95,
            search_depth: 40,
            search_time: Duration::from_secs(10),
            max_iterations: None,
            max_children: 5,
            reuse_tree: false,
            fix_time: true,
            max_steps: 1000,
            rewards: Rewards::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options() {
        assert_eq!("rootInterval".parse::<Selection>(), Ok(Selection::RootInterval));
        assert_eq!(Selection::RootInterval.to_string(), "rootInterval");
        assert_eq!("rtdp".parse::<Strategy>(), Ok(Strategy::Rtdp));
        assert!("ucb".parse::<Strategy>().is_err());
        assert_eq!("rollout".parse::<LeafEvaluation>(), Ok(LeafEvaluation::Rollout));
    }
}
