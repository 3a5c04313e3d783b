use thiserror::Error;

/// Rejections of ill-formed ground problems. These are caller errors, reported when the offending
/// element is added to a [Problem](crate::Problem).
#[derive(Error, Debug, PartialEq)]
pub enum ModelError {
    #[error("Duplicate action: {0}")]
    DuplicateAction(String),
    #[error("Action {action} requires {atom} to be both true and false ({phase})")]
    ConflictingPreconditions {
        action: String,
        atom: String,
        phase: &'static str,
    },
    #[error("Action {action} sets {atom} to both true and false ({phase})")]
    ConflictingEffects {
        action: String,
        atom: String,
        phase: &'static str,
    },
    #[error("Action {action} has an invalid duration [{min}, {max}]")]
    InvalidDuration { action: String, min: i64, max: i64 },
    #[error("Action {action} has an invalid probabilistic effect: {reason}")]
    InvalidDistribution { action: String, reason: String },
    #[error("Unknown atom in {0}")]
    UnknownAtom(String),
}
