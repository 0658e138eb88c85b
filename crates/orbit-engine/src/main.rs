use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use orbit_agent::{
    CredentialPool, GeminiBackend, GeneratorSession, ModelResolver, ResolverPolicy, RetryPolicy,
};
use orbit_core::{OrbitConfig, StudyProfile};
use orbit_engine::{Engine, OutcomeKind};
use orbit_state::SqliteStateStore;
use orbit_telegram::{Broadcaster, TelegramBackend};

/// Scheduled study-content broadcaster. Each invocation is one run.
#[derive(Parser)]
#[command(name = "orbit", version)]
struct Args {
    /// Path to orbit.toml (falls back to ORBIT_CONFIG, then ~/.orbit/orbit.toml).
    #[arg(long)]
    config: Option<String>,

    /// Skip the draw and produce this outcome.
    #[arg(long, value_enum)]
    force: Option<Force>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Force {
    Silence,
    Fact,
    Quiz,
    Mystery,
}

impl From<Force> for OutcomeKind {
    fn from(f: Force) -> Self {
        match f {
            Force::Silence => OutcomeKind::Silence,
            Force::Fact => OutcomeKind::Fact,
            Force::Quiz => OutcomeKind::QuizBatch,
            Force::Mystery => OutcomeKind::MysteryCase,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "orbit=info,orbit_agent=info,orbit_telegram=info,orbit_engine=info,orbit_state=info"
                    .into()
            }),
        )
        .init();

    let args = Args::parse();

    // explicit path > ORBIT_CONFIG env > ~/.orbit/orbit.toml
    let config_path = args.config.or_else(|| std::env::var("ORBIT_CONFIG").ok());
    let config = OrbitConfig::load(config_path.as_deref()).context("invalid configuration")?;
    config.require_secrets()?;

    let profile = match StudyProfile::load(&config.paths.profile) {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            info!(path = %config.paths.profile, "no study profile, nothing to do");
            return Ok(());
        }
        Err(e) if e.is_fatal() => return Err(e.into()),
        Err(e) => {
            warn!(error = %e, "study profile unreadable, nothing to do");
            return Ok(());
        }
    };

    let gemini = &config.gemini;
    let backend = GeminiBackend::new(
        gemini.base_url.clone(),
        Duration::from_secs(gemini.request_timeout_secs),
    )?;
    let pool = CredentialPool::new(&gemini.api_keys)?;
    info!(credentials = pool.len(), "credential pool ready");
    let generator = GeneratorSession::new(
        Arc::new(backend),
        pool,
        ModelResolver::new(ResolverPolicy::default().with_default_model(gemini.default_model.clone())),
        RetryPolicy::from_config(gemini),
    );

    let telegram = TelegramBackend::new(&config.telegram)?;
    let broadcaster = Broadcaster::from_config(Arc::new(telegram), &config.telegram);
    if broadcaster.destinations().is_empty() {
        warn!("no telegram targets configured, content will not be delivered");
    }

    let store = SqliteStateStore::open(&config.paths.state_db)
        .with_context(|| format!("opening state database {}", config.paths.state_db))?;

    let mut engine = Engine::new(
        generator,
        broadcaster,
        Arc::new(store),
        profile,
        config.engine.clone(),
        config.roll,
    );

    let mut rng = StdRng::from_os_rng();
    let report = engine.run(&mut rng, args.force.map(OutcomeKind::from)).await;
    info!(
        flushed_reveal = report.flushed_reveal,
        draw = ?report.draw,
        outcome = ?report.outcome,
        messages = report.messages,
        polls = report.polls_delivered,
        mystery = ?report.mystery_phase,
        "run complete"
    );
    Ok(())
}
