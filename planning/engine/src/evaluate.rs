use crate::{NoPlanReason, Plan, PlanError, PlanOutcome};
use itertools::Itertools;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::fmt::{Display, Formatter};
use tracing::info;

/// Aggregated results of several independent runs of the planner.
#[derive(Clone, Debug, Default)]
pub struct Evaluation {
    pub runs: usize,
    /// Makespans of the successful runs.
    pub makespans: Vec<i64>,
    pub failures: Vec<NoPlanReason>,
}

impl Evaluation {
    pub fn record(&mut self, plan: &Plan) {
        self.runs += 1;
        match plan.outcome {
            PlanOutcome::Success { makespan } => self.makespans.push(makespan),
            PlanOutcome::NoPlan { reason } => self.failures.push(reason),
        }
    }

    pub fn successes(&self) -> usize {
        self.makespans.len()
    }

    pub fn success_rate(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.successes() as f64 / self.runs as f64
        }
    }

    pub fn mean_makespan(&self) -> Option<f64> {
        if self.makespans.is_empty() {
            None
        } else {
            Some(self.makespans.iter().sum::<i64>() as f64 / self.makespans.len() as f64)
        }
    }

    /// Standard error of the mean makespan. Requires at least two successful runs.
    pub fn std_error(&self) -> Option<f64> {
        let n = self.makespans.len();
        if n < 2 {
            return None;
        }
        let mean = self.mean_makespan()?;
        let variance = self.makespans.iter().map(|&m| (m as f64 - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Some((variance / n as f64).sqrt())
    }
}

impl Display for Evaluation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "success: {}/{} ({:.1}%)", self.successes(), self.runs, 100.0 * self.success_rate())?;
        if let Some(mean) = self.mean_makespan() {
            write!(f, "  makespan: {mean:.2}")?;
            if let Some(err) = self.std_error() {
                write!(f, " +/- {err:.2}")?;
            }
        }
        if !self.failures.is_empty() {
            let counts = self
                .failures
                .iter()
                .counts()
                .into_iter()
                .map(|(reason, n)| format!("{reason}: {n}"))
                .sorted()
                .join(", ");
            write!(f, "  failures: {counts}")?;
        }
        Ok(())
    }
}

/// Runs the planner `runs` times, the i-th run being seeded with `seed + i`.
pub fn evaluate(
    runs: usize,
    seed: u64,
    mut run: impl FnMut(&mut SmallRng) -> Result<Plan, PlanError>,
) -> Result<Evaluation, PlanError> {
    let mut evaluation = Evaluation::default();
    for i in 0..runs {
        let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(i as u64));
        let plan = run(&mut rng)?;
        match plan.outcome {
            PlanOutcome::Success { makespan } => info!("Run {}/{runs}: makespan {makespan}", i + 1),
            PlanOutcome::NoPlan { reason } => info!("Run {}/{runs}: no plan ({reason})", i + 1),
        }
        evaluation.record(&plan);
    }
    info!("{evaluation}");
    Ok(evaluation)
}
