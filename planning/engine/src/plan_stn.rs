use derive_more::derive::Display;
use hashbrown::HashMap;
use tempo_model::compile::ConvertedProblem;
use tempo_model::{Action, ActionId};
use tempo_stn::{NetworkStatus, Stn};
use thiserror::Error;

/// Timepoint of a plan under construction.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
pub enum Timepoint {
    #[display("global-start")]
    GlobalStart,
    #[display("global-end")]
    GlobalEnd,
    /// The `occurrence`-th execution of an action. The end of a durative action shares the
    /// occurrence number of its start.
    #[display("{action}/{occurrence}")]
    Event { action: ActionId, occurrence: u32 },
}

#[derive(Error, Debug, PartialEq)]
pub enum ScheduleError {
    #[error("{0} ends an action that is not executing")]
    UnmatchedEnd(String),
    #[error("{0} cannot be scheduled: only instantaneous, start and end actions have a timepoint")]
    NotSchedulable(String),
}

/// Temporal network of the actions chosen so far in regular mode.
///
/// Chosen actions are totally ordered, in the order they were added, between the global start
/// and the global end. The latter is bounded by the deadline. Each start creates a *potential*
/// end at the right distance, which becomes the actual end once the matching end action is
/// added. Until then, nothing added later may occur after it.
#[derive(Clone)]
pub struct PlanStn {
    stn: Stn<Timepoint, i64>,
    /// Potential ends of the executing actions, indexed by end action.
    pending: HashMap<ActionId, Timepoint>,
    occurrences: HashMap<ActionId, u32>,
    last: Option<Timepoint>,
}

impl PlanStn {
    pub fn new(deadline: Option<i64>) -> Self {
        let mut stn = Stn::new(Timepoint::GlobalStart);
        stn.insert(&Timepoint::GlobalEnd, &Timepoint::GlobalStart, Some(0), deadline);
        PlanStn {
            stn,
            pending: HashMap::new(),
            occurrences: HashMap::new(),
            last: None,
        }
    }

    /// Adds the action `id` after all previously added ones and returns its timepoint.
    /// The network may become inconsistent, which is reported by [PlanStn::is_consistent].
    pub fn add(&mut self, problem: &ConvertedProblem, id: ActionId) -> Result<Timepoint, ScheduleError> {
        let tp = match problem.action(id) {
            Action::Start(start) => {
                let occurrence = self.next_occurrence(id);
                let tp = Timepoint::Event { action: id, occurrence };
                self.order(tp);
                let end = Timepoint::Event {
                    action: start.end,
                    occurrence,
                };
                self.stn
                    .insert(&end, &tp, Some(start.duration.min), Some(start.duration.max));
                self.pending.insert(start.end, end);
                tp
            }
            Action::End(end) => {
                let tp = self
                    .pending
                    .remove(&id)
                    .ok_or_else(|| ScheduleError::UnmatchedEnd(end.name.clone()))?;
                self.order(tp);
                tp
            }
            Action::Instantaneous(_) => {
                let occurrence = self.next_occurrence(id);
                let tp = Timepoint::Event { action: id, occurrence };
                self.order(tp);
                tp
            }
            other => return Err(ScheduleError::NotSchedulable(other.name().to_string())),
        };
        self.last = Some(tp);
        Ok(tp)
    }

    fn next_occurrence(&mut self, id: ActionId) -> u32 {
        let n = self.occurrences.entry(id).or_insert(0);
        *n += 1;
        *n
    }

    /// Places `tp` after the last chosen timepoint, before the global end and before every
    /// potential end.
    fn order(&mut self, tp: Timepoint) {
        let previous = self.last.unwrap_or(Timepoint::GlobalStart);
        self.stn.insert(&tp, &previous, Some(0), None);
        self.stn.insert(&Timepoint::GlobalEnd, &tp, Some(0), None);
        for end in self.pending.values() {
            self.stn.insert(end, &tp, Some(0), None);
        }
    }

    /// Pins a timepoint to an absolute time.
    pub fn fix(&mut self, tp: Timepoint, time: i64) -> NetworkStatus {
        self.stn.fix(&tp, time)
    }

    pub fn is_consistent(&self) -> bool {
        self.stn.is_consistent()
    }

    pub fn earliest(&self, tp: Timepoint) -> Option<i64> {
        self.stn.earliest(&tp)
    }

    /// `(earliest, latest)` times of the timepoint. The latest time is `i64::MAX / 2` when unbounded.
    pub fn legal_interval(&self, tp: Timepoint) -> Option<(i64, i64)> {
        self.stn.legal_interval(&tp)
    }

    /// Earliest possible time of the global end: the makespan of the plan so far.
    pub fn current_end_time(&self) -> i64 {
        self.stn.earliest(&Timepoint::GlobalEnd).unwrap_or(0)
    }

    /// Timepoint of the last action added.
    pub fn last(&self) -> Option<Timepoint> {
        self.last
    }

    /// Number of started actions whose end has not been added yet.
    pub fn num_executing(&self) -> usize {
        self.pending.len()
    }
}
