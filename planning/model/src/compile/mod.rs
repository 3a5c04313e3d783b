//! Compilation of ground problems into the action vocabulary of the search engines.
//!
//!  - [decompose] splits every durative action into a start and an end action, linked by an
//!    execution marker, and guards actions against interfering with running ones.
//!  - [combine] keeps durative actions whole and adds one action per legal set of durative
//!    actions that may be started together.

mod combine;
mod decompose;

pub use combine::*;
pub use decompose::*;

use crate::{Action, ActionId, AtomSet, State, World};
use derive_more::derive::Display;
use std::str::FromStr;

/// How durative actions are exposed to the search.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum Mode {
    /// Start and end of each durative action are chosen separately, and scheduled in an STN.
    #[display("regular")]
    Regular,
    /// Durative actions (or sets of them) are chosen as a whole, and time is carried by the state.
    #[display("combination")]
    Combination,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Mode::Regular),
            "combination" => Ok(Mode::Combination),
            _ => Err(format!("Unknown mode: '{s}'. Valid options are: 'regular', 'combination'")),
        }
    }
}

/// A problem whose actions are all in the engine vocabulary.
#[derive(Clone, Debug)]
pub struct ConvertedProblem {
    pub name: String,
    pub mode: Mode,
    pub world: World,
    pub init: State,
    pub goals: AtomSet,
    pub deadline: Option<i64>,
    actions: Vec<Action>,
}

impl ConvertedProblem {
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, id: ActionId) -> &Action {
        &self.actions[usize::from(id)]
    }

    pub fn ids(&self) -> impl Iterator<Item = ActionId> + use<> {
        (0..self.actions.len()).map(ActionId::from)
    }

    pub fn find(&self, name: &str) -> Option<ActionId> {
        self.actions.iter().position(|a| a.name() == name).map(ActionId::from)
    }

    pub fn is_goal(&self, state: &State) -> bool {
        state.entails_all(&self.goals)
    }
}
