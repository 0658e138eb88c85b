//! The single probability table that decides what a run emits.

use rand::seq::IndexedRandom;
use rand::Rng;

use orbit_core::config::RollConfig;
use orbit_core::StudyProfile;

/// Draws are uniform over `1..=DRAW_MAX`.
pub const DRAW_MAX: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Silence,
    Fact,
    QuizBatch,
    MysteryCase,
}

/// Where a mystery case is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MysteryPhase {
    /// The case is being presented in this run.
    Presenting,
    /// The presentation went out and the reveal is parked for the next run.
    PendingReveal,
}

/// A drawn outcome with the inputs its content path needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Silence,
    Fact { topic: String },
    QuizBatch { unit: String, count: u32 },
    MysteryCase { phase: MysteryPhase },
}

impl Outcome {
    /// Fill in the random inputs for `kind` from the study profile.
    ///
    /// Returns `None` when the profile has nothing to draw from.
    pub fn select<R: Rng>(
        kind: OutcomeKind,
        profile: &StudyProfile,
        max_questions: u32,
        rng: &mut R,
    ) -> Option<Self> {
        match kind {
            OutcomeKind::Silence => Some(Outcome::Silence),
            OutcomeKind::Fact => profile.interests.choose(rng).map(|topic| Outcome::Fact {
                topic: topic.clone(),
            }),
            OutcomeKind::QuizBatch => {
                let unit = profile.current_units.choose(rng)?.clone();
                let count = rng.random_range(1..=max_questions.max(1));
                Some(Outcome::QuizBatch { unit, count })
            }
            OutcomeKind::MysteryCase => Some(Outcome::MysteryCase {
                phase: MysteryPhase::Presenting,
            }),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Silence => OutcomeKind::Silence,
            Outcome::Fact { .. } => OutcomeKind::Fact,
            Outcome::QuizBatch { .. } => OutcomeKind::QuizBatch,
            Outcome::MysteryCase { .. } => OutcomeKind::MysteryCase,
        }
    }
}

/// Disjoint, exhaustive draw ranges built from inclusive upper bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollTable {
    silence_max: u8,
    fact_max: u8,
    quiz_max: u8,
}

impl Default for RollTable {
    fn default() -> Self {
        RollConfig::default().into()
    }
}

impl From<RollConfig> for RollTable {
    fn from(cfg: RollConfig) -> Self {
        // Clamp so a hand-built config still yields a monotonic table.
        let quiz_max = cfg.quiz_max.min(DRAW_MAX);
        let fact_max = cfg.fact_max.min(quiz_max);
        let silence_max = cfg.silence_max.min(fact_max);
        Self {
            silence_max,
            fact_max,
            quiz_max,
        }
    }
}

impl RollTable {
    /// Map a draw to an outcome kind. Total over every `u8`; anything above
    /// the quiz range is a mystery case.
    pub fn classify(&self, draw: u8) -> OutcomeKind {
        if draw <= self.silence_max {
            OutcomeKind::Silence
        } else if draw <= self.fact_max {
            OutcomeKind::Fact
        } else if draw <= self.quiz_max {
            OutcomeKind::QuizBatch
        } else {
            OutcomeKind::MysteryCase
        }
    }

    /// Draw uniformly from `1..=100` and classify.
    pub fn roll<R: Rng>(&self, rng: &mut R) -> (u8, OutcomeKind) {
        let draw = rng.random_range(1..=DRAW_MAX);
        (draw, self.classify(draw))
    }
}
