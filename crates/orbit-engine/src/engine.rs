//! One scheduled run: flush any parked reveal, draw an outcome, run its
//! content path.
//!
//! Content paths never fail the run. Generation failures are absorbed by the
//! [`GeneratorSession`], delivery failures by the [`Broadcaster`], and a state
//! store error is logged and worked around.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use orbit_agent::GeneratorSession;
use orbit_core::config::{EngineConfig, RevealMode, RollConfig};
use orbit_core::StudyProfile;
use orbit_state::{DurableState, StateStore};
use orbit_telegram::markup::render_html;
use orbit_telegram::{Broadcaster, DeliveryReport};

use crate::mystery::{self, MysteryCase};
use crate::prompts;
use crate::quiz::parse_batch;
use crate::roll::{MysteryPhase, Outcome, OutcomeKind, RollTable};

/// What one run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// A reveal parked by the previous run was delivered first.
    pub flushed_reveal: bool,
    /// The random draw; `None` when the outcome was forced.
    pub draw: Option<u8>,
    pub outcome: Option<OutcomeKind>,
    /// Text messages handed to the broadcaster (each may fan out and chunk).
    pub messages: usize,
    /// Successful poll deliveries, summed over destinations.
    pub polls_delivered: usize,
    /// Where a mystery case ended up, if one was drawn.
    pub mystery_phase: Option<MysteryPhase>,
}

pub struct Engine {
    generator: GeneratorSession,
    broadcaster: Broadcaster,
    store: Arc<dyn StateStore>,
    profile: StudyProfile,
    config: EngineConfig,
    table: RollTable,
}

impl Engine {
    pub fn new(
        generator: GeneratorSession,
        broadcaster: Broadcaster,
        store: Arc<dyn StateStore>,
        profile: StudyProfile,
        config: EngineConfig,
        roll: RollConfig,
    ) -> Self {
        Self {
            generator,
            broadcaster,
            store,
            profile,
            config,
            table: roll.into(),
        }
    }

    /// Execute one run. `forced` bypasses the draw.
    pub async fn run<R: Rng>(&mut self, rng: &mut R, forced: Option<OutcomeKind>) -> RunReport {
        let mut report = RunReport::default();

        let flushed = self.flush_pending(&mut report).await;
        report.flushed_reveal = flushed;

        let kind = match forced {
            Some(kind) => {
                info!(?kind, "outcome forced");
                kind
            }
            None => {
                let (draw, kind) = self.table.roll(rng);
                info!(draw, ?kind, "rolled");
                report.draw = Some(draw);
                kind
            }
        };
        report.outcome = Some(kind);

        let Some(outcome) =
            Outcome::select(kind, &self.profile, self.config.max_quiz_questions, rng)
        else {
            warn!(?kind, "study profile has nothing to draw from, skipping");
            return report;
        };

        match outcome {
            Outcome::Silence => info!("silence is golden"),
            Outcome::Fact { topic } => self.fact(&topic, &mut report).await,
            Outcome::QuizBatch { unit, count } => {
                self.quiz_batch(&unit, count, rng, &mut report).await
            }
            Outcome::MysteryCase { .. } => self.mystery_case(rng, &mut report).await,
        }
        report
    }

    async fn broadcast(&self, text: &str, report: &mut RunReport) -> DeliveryReport {
        report.messages += 1;
        self.broadcaster.deliver(text).await
    }

    /// Deliver the reveal left by the previous run.
    ///
    /// The slot is cleared before delivery, so a crash here loses the reveal
    /// instead of sending it twice.
    async fn flush_pending(&self, report: &mut RunReport) -> bool {
        match self.store.take_pending() {
            Ok(Some(reveal)) => {
                info!("delivering reveal from previous run");
                self.broadcast(&mystery::reveal_message(&reveal), report).await;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "could not read pending reveal");
                false
            }
        }
    }

    async fn fact(&mut self, topic: &str, report: &mut RunReport) {
        let Some(text) = self.generator.generate(&prompts::fact(topic)).await else {
            warn!(%topic, "no response for fact");
            return;
        };
        let message = prompts::fact_message(&render_html(&text));
        self.broadcast(&message, report).await;
    }

    async fn quiz_batch<R: Rng>(
        &mut self,
        unit: &str,
        count: u32,
        rng: &mut R,
        report: &mut RunReport,
    ) {
        let intro = prompts::quiz_intro(prompts::random_quote(rng), count, unit);
        self.broadcast(&intro, report).await;

        let Some(text) = self.generator.generate(&prompts::quiz(count, unit)).await else {
            warn!(%unit, "no response for quiz");
            return;
        };
        let mut questions = match parse_batch(&text) {
            Ok(questions) => questions,
            Err(e) => {
                warn!(error = %e, "quiz batch is not valid JSON");
                return;
            }
        };
        // The intro already announced `count`; keep the labels consistent with it.
        questions.truncate(count as usize);

        let total = questions.len();
        let pacing = Duration::from_millis(self.config.poll_pacing_ms);
        for (i, question) in questions.iter().enumerate() {
            if i > 0 && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
            let delivered = self.broadcaster.deliver_poll(&question.to_poll(i + 1, total)).await;
            report.polls_delivered += delivered.delivered;
        }
        info!(%unit, requested = count, sent = total, "quiz batch done");
    }

    async fn mystery_case<R: Rng>(&mut self, rng: &mut R, report: &mut RunReport) {
        report.mystery_phase = Some(MysteryPhase::Presenting);
        self.broadcast(mystery::INTRO, report).await;

        let Some(text) = self.generator.generate(prompts::MYSTERY).await else {
            self.broadcast(mystery::SYSTEM_FAILURE, report).await;
            return;
        };

        let case = MysteryCase::parse(&text);
        let number: u16 = rng.random_range(1000..=9999);
        self.broadcast(&mystery::case_file(number, &case.presentation), report)
            .await;

        let Some(reveal) = case.reveal else {
            warn!("mystery case has no reveal delimiter");
            self.broadcast(mystery::MISSING_DELIMITER, report).await;
            return;
        };

        match self.config.reveal {
            RevealMode::Immediate => self.reveal_now(&reveal, report).await,
            RevealMode::Deferred => match self.store.save(&DurableState::with_pending(reveal.as_str())) {
                Ok(()) => {
                    info!(case = number, "reveal parked for next run");
                    report.mystery_phase = Some(MysteryPhase::PendingReveal);
                    self.broadcast(mystery::TEASER, report).await;
                }
                Err(e) => {
                    warn!(error = %e, "could not park reveal, delivering it now");
                    self.reveal_now(&reveal, report).await;
                }
            },
        }
    }

    async fn reveal_now(&self, reveal: &str, report: &mut RunReport) {
        let suspense = Duration::from_millis(self.config.suspense_ms);
        self.broadcast(&mystery::suspense_message(suspense.as_secs()), report)
            .await;
        if !suspense.is_zero() {
            tokio::time::sleep(suspense).await;
        }
        self.broadcast(&mystery::reveal_message(reveal), report).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orbit_agent::{
        CredentialPool, GenerationBackend, ModelDescriptor, ModelResolver, ProviderError,
        RetryPolicy,
    };
    use orbit_state::SqliteStateStore;
    use orbit_telegram::{DeliveryBackend, PollMessage, TelegramError};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Mutex;

    /// Returns the same text for every prompt, or fails every call.
    struct Canned(Option<String>);

    #[async_trait]
    impl GenerationBackend for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn list_models(&self, _credential: &str) -> Result<Vec<ModelDescriptor>, ProviderError> {
            Ok(vec![ModelDescriptor::new("models/gemini-1.5-flash", true)])
        }

        async fn generate(&self, _c: &str, _m: &str, _p: &str) -> Result<String, ProviderError> {
            self.0.clone().ok_or(ProviderError::Api {
                status: 500,
                message: "boom".into(),
            })
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Text(String, String),
        Poll(String, String),
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Sent>>);

    impl Recorder {
        fn sent(&self) -> Vec<Sent> {
            self.0.lock().unwrap().clone()
        }

        fn texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Text(_, t) => Some(t),
                    _ => None,
                })
                .collect()
        }

        fn polls_to(&self, dest: &str) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Poll(d, q) if d == dest => Some(q),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl DeliveryBackend for Recorder {
        async fn send_message(&self, dest: &str, text: &str, _rich: bool) -> Result<(), TelegramError> {
            self.0.lock().unwrap().push(Sent::Text(dest.into(), text.into()));
            Ok(())
        }

        async fn send_poll(&self, dest: &str, poll: &PollMessage) -> Result<(), TelegramError> {
            self.0
                .lock()
                .unwrap()
                .push(Sent::Poll(dest.into(), poll.question.clone()));
            Ok(())
        }
    }

    fn profile() -> StudyProfile {
        StudyProfile {
            user_name: Some("Doc".into()),
            interests: vec!["Space".into()],
            current_units: vec!["Renal".into()],
        }
    }

    fn engine(
        reply: Option<&str>,
        delivery: Arc<Recorder>,
        store: Arc<dyn StateStore>,
        reveal: RevealMode,
    ) -> Engine {
        let generator = GeneratorSession::new(
            Arc::new(Canned(reply.map(str::to_string))),
            CredentialPool::new(["k1"]).unwrap(),
            ModelResolver::default(),
            RetryPolicy::without_pauses(2),
        );
        let broadcaster = Broadcaster::new(
            delivery,
            vec!["1".into(), "REPLACE_WITH_CHANNEL_ID".into(), "2".into()],
            4000,
            Duration::ZERO,
        );
        let config = EngineConfig {
            reveal,
            poll_pacing_ms: 0,
            suspense_ms: 0,
            max_quiz_questions: 5,
        };
        Engine::new(generator, broadcaster, store, profile(), config, RollConfig::default())
    }

    fn memory_store() -> Arc<dyn StateStore> {
        Arc::new(SqliteStateStore::in_memory().unwrap())
    }

    const CASE: &str = "<b>PATIENT:</b> 34M, copper-coloured rings\n||REVEAL||\n<b>DIAGNOSIS:</b> <span class=\"tg-spoiler\">Wilson's disease</span>";

    fn question(q: &str) -> String {
        format!(r#"{{"question": "{q}", "options": ["a","b","c","d"], "correct_id": 2, "explanation": "because"}}"#)
    }

    #[tokio::test]
    async fn fact_is_rendered_and_broadcast() {
        let delivery = Arc::new(Recorder::default());
        let mut e = engine(Some("**Neutron stars** spin <p>fast</p>"), delivery.clone(), memory_store(), RevealMode::Deferred);

        let report = e.run(&mut StdRng::seed_from_u64(3), Some(OutcomeKind::Fact)).await;

        assert_eq!(report.outcome, Some(OutcomeKind::Fact));
        assert_eq!(report.draw, None);
        assert_eq!(
            delivery.texts(),
            vec!["🎱 <b>Magic-∞ Fact:</b>\n\nNeutron stars spin fast"; 2]
        );
    }

    #[tokio::test]
    async fn three_questions_become_three_polls_per_destination() {
        let batch = format!("```json\n[{}, {}, {}]\n```", question("Q1"), question("Q2"), question("Q3"));
        let delivery = Arc::new(Recorder::default());
        let mut e = engine(Some(&batch), delivery.clone(), memory_store(), RevealMode::Deferred);

        let mut report = RunReport::default();

        e.quiz_batch("Renal", 3, &mut StdRng::seed_from_u64(9), &mut report)
            .await;

        assert_eq!(report.polls_delivered, 6);
        for dest in ["1", "2"] {
            assert_eq!(delivery.polls_to(dest), vec!["[1/3] Q1", "[2/3] Q2", "[3/3] Q3"]);
        }
        assert!(delivery.polls_to("REPLACE_WITH_CHANNEL_ID").is_empty());
        // Intro goes out before the polls.
        assert!(matches!(&delivery.sent()[0], Sent::Text(_, t) if t.starts_with("🚨 <b>")));
    }

    #[tokio::test]
    async fn surplus_questions_are_cut_to_the_announced_count() {
        let batch = format!(
            "[{}, {}, {}, {}, {}]",
            question("Q1"),
            question("Q2"),
            question("Q3"),
            question("Q4"),
            question("Q5")
        );
        let delivery = Arc::new(Recorder::default());
        let mut e = engine(Some(&batch), delivery.clone(), memory_store(), RevealMode::Deferred);
        let mut report = RunReport::default();

        e.quiz_batch("Renal", 2, &mut StdRng::seed_from_u64(4), &mut report)
            .await;

        assert!(delivery.texts()[0].ends_with("<b>2 Questions on Renal</b>"));
        assert_eq!(delivery.polls_to("1"), vec!["[1/2] Q1", "[2/2] Q2"]);
        assert_eq!(report.polls_delivered, 4);
    }

    #[tokio::test]
    async fn invalid_quiz_json_sends_only_the_intro() {
        let delivery = Arc::new(Recorder::default());
        let mut e = engine(Some("not json"), delivery.clone(), memory_store(), RevealMode::Deferred);

        let report = e.run(&mut StdRng::seed_from_u64(9), Some(OutcomeKind::QuizBatch)).await;

        assert_eq!(report.polls_delivered, 0);
        assert_eq!(report.messages, 1);
    }

    #[tokio::test]
    async fn deferred_reveal_is_delivered_exactly_once_across_runs() {
        let store = memory_store();

        let first = Arc::new(Recorder::default());
        let report = engine(Some(CASE), first.clone(), store.clone(), RevealMode::Deferred)
            .run(&mut StdRng::seed_from_u64(1), Some(OutcomeKind::MysteryCase))
            .await;
        assert_eq!(report.mystery_phase, Some(MysteryPhase::PendingReveal));
        assert!(!first.texts().iter().any(|t| t.contains("DIAGNOSIS REVEALED")));
        assert!(first.texts().iter().any(|t| t.contains("CASE FILE #")));
        assert!(first.texts().iter().all(|t| !t.contains("Wilson")));

        let second = Arc::new(Recorder::default());
        let report = engine(Some(CASE), second.clone(), store.clone(), RevealMode::Deferred)
            .run(&mut StdRng::seed_from_u64(2), Some(OutcomeKind::Silence))
            .await;
        assert!(report.flushed_reveal);
        assert_eq!(
            second.texts(),
            vec![
                "🧬 <b>DIAGNOSIS REVEALED</b>\n\n<b>DIAGNOSIS:</b> <tg-spoiler>Wilson's disease</tg-spoiler>";
                2
            ]
        );

        let third = Arc::new(Recorder::default());
        let report = engine(Some(CASE), third.clone(), store.clone(), RevealMode::Deferred)
            .run(&mut StdRng::seed_from_u64(3), Some(OutcomeKind::Silence))
            .await;
        assert!(!report.flushed_reveal);
        assert!(third.sent().is_empty());
    }

    #[tokio::test]
    async fn old_reveal_is_flushed_before_a_new_mystery_case() {
        let store = memory_store();
        store.save(&DurableState::with_pending("OLD")).unwrap();

        let delivery = Arc::new(Recorder::default());
        let report = engine(Some(CASE), delivery.clone(), store.clone(), RevealMode::Deferred)
            .run(&mut StdRng::seed_from_u64(1), Some(OutcomeKind::MysteryCase))
            .await;

        assert!(report.flushed_reveal);
        assert_eq!(report.mystery_phase, Some(MysteryPhase::PendingReveal));
        assert_eq!(delivery.texts()[0], "🧬 <b>DIAGNOSIS REVEALED</b>\n\nOLD");
        assert_eq!(
            store.load().unwrap().pending_diagnosis.as_deref(),
            Some("<b>DIAGNOSIS:</b> <tg-spoiler>Wilson's disease</tg-spoiler>")
        );
    }

    #[tokio::test]
    async fn immediate_reveal_leaves_state_untouched() {
        let store = memory_store();
        let delivery = Arc::new(Recorder::default());
        let report = engine(Some(CASE), delivery.clone(), store.clone(), RevealMode::Immediate)
            .run(&mut StdRng::seed_from_u64(1), Some(OutcomeKind::MysteryCase))
            .await;

        assert_eq!(report.mystery_phase, Some(MysteryPhase::Presenting));
        // intro, case file, suspense, reveal
        assert_eq!(report.messages, 4);
        assert!(delivery.texts().last().unwrap().contains("Wilson's disease"));
        assert!(!store.load().unwrap().has_pending());
    }

    #[tokio::test]
    async fn missing_delimiter_sends_fallback_and_parks_nothing() {
        let store = memory_store();
        let delivery = Arc::new(Recorder::default());
        engine(Some("a case with no answer"), delivery.clone(), store.clone(), RevealMode::Deferred)
            .run(&mut StdRng::seed_from_u64(1), Some(OutcomeKind::MysteryCase))
            .await;

        assert!(delivery.texts().iter().any(|t| t == mystery::MISSING_DELIMITER));
        assert!(!store.load().unwrap().has_pending());
    }

    #[tokio::test]
    async fn generation_failure_in_mystery_sends_system_failure() {
        let delivery = Arc::new(Recorder::default());
        engine(None, delivery.clone(), memory_store(), RevealMode::Deferred)
            .run(&mut StdRng::seed_from_u64(1), Some(OutcomeKind::MysteryCase))
            .await;

        let texts = delivery.texts();
        assert_eq!(texts.len(), 4);
        assert_eq!(texts[2], mystery::SYSTEM_FAILURE);
    }

    #[tokio::test]
    async fn generation_failure_in_fact_is_silent() {
        let delivery = Arc::new(Recorder::default());
        let report = engine(None, delivery.clone(), memory_store(), RevealMode::Deferred)
            .run(&mut StdRng::seed_from_u64(1), Some(OutcomeKind::Fact))
            .await;

        assert_eq!(report.messages, 0);
        assert!(delivery.sent().is_empty());
    }

    #[tokio::test]
    async fn empty_profile_skips_content() {
        let delivery = Arc::new(Recorder::default());
        let mut e = engine(Some("fact"), delivery.clone(), memory_store(), RevealMode::Deferred);
        e.profile = StudyProfile::default();

        let report = e.run(&mut StdRng::seed_from_u64(1), Some(OutcomeKind::Fact)).await;
        assert_eq!(report.outcome, Some(OutcomeKind::Fact));
        assert!(delivery.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_park_delivers_reveal_now() {
        struct BrokenStore;
        impl StateStore for BrokenStore {
            fn load(&self) -> orbit_state::Result<DurableState> {
                Ok(DurableState::default())
            }
            fn save(&self, _state: &DurableState) -> orbit_state::Result<()> {
                Err(orbit_state::StateError::Poisoned)
            }
        }

        let delivery = Arc::new(Recorder::default());
        let report = engine(Some(CASE), delivery.clone(), Arc::new(BrokenStore), RevealMode::Deferred)
            .run(&mut StdRng::seed_from_u64(1), Some(OutcomeKind::MysteryCase))
            .await;

        assert_eq!(report.mystery_phase, Some(MysteryPhase::Presenting));
        assert!(delivery.texts().last().unwrap().contains("DIAGNOSIS REVEALED"));
    }

    #[tokio::test]
    async fn unforced_run_records_the_draw() {
        let delivery = Arc::new(Recorder::default());
        let mut e = engine(Some("fact"), delivery, memory_store(), RevealMode::Deferred);
        let report = e.run(&mut StdRng::seed_from_u64(5), None).await;

        let draw = report.draw.unwrap();
        assert!((1..=100).contains(&draw));
        assert_eq!(report.outcome, Some(RollTable::default().classify(draw)));
    }
}
