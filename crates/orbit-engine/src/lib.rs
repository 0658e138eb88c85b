//! Content selection and run orchestration for orbit.

pub mod engine;
pub mod mystery;
pub mod prompts;
pub mod quiz;
pub mod roll;

pub use engine::{Engine, RunReport};
pub use roll::{MysteryPhase, Outcome, OutcomeKind, RollTable};
