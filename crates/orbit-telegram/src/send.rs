//! Chunked fan-out delivery.
//!
//! Telegram's message limit is 4096 characters; the configured chunk size
//! (4000 by default) leaves headroom. Each chunk is sent rich (HTML) first and
//! falls back to plain text when Telegram rejects it.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use orbit_core::config::{TelegramConfig, PLACEHOLDER_MARKER};

use crate::adapter::{DeliveryBackend, PollMessage};
use crate::markup::plain_text;

/// Line-boundary splitter.
///
/// Lines keep their trailing `\n`, so concatenating the chunks reproduces
/// `text` exactly. A single line longer than `max` is emitted as its own
/// oversized chunk rather than being cut mid-line.
pub fn split_chunks(text: &str, max: usize) -> Vec<String> {
    if text.len() <= max {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if !current.is_empty() && current.len() + line.len() > max {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Destinations that were never filled in (e.g. `REPLACE_WITH_CHANNEL_ID`).
pub fn is_placeholder(destination: &str) -> bool {
    destination.contains(PLACEHOLDER_MARKER)
}

/// Per-destination outcome of one delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Destinations that received every non-blank chunk.
    pub delivered: usize,
    /// Destinations where at least one chunk was dropped.
    pub failed: usize,
    /// Placeholder destinations that were not contacted.
    pub skipped: usize,
}

impl DeliveryReport {
    fn merge(mut self, other: DeliveryReport) -> Self {
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self
    }
}

enum Outcome {
    Delivered,
    Failed,
    Skipped,
}

impl From<Outcome> for DeliveryReport {
    fn from(o: Outcome) -> Self {
        let mut r = DeliveryReport::default();
        match o {
            Outcome::Delivered => r.delivered = 1,
            Outcome::Failed => r.failed = 1,
            Outcome::Skipped => r.skipped = 1,
        }
        r
    }
}

/// Sends one payload to every configured destination.
pub struct Broadcaster {
    backend: Arc<dyn DeliveryBackend>,
    destinations: Vec<String>,
    chunk_max: usize,
    chunk_gap: Duration,
}

impl Broadcaster {
    pub fn new(
        backend: Arc<dyn DeliveryBackend>,
        destinations: Vec<String>,
        chunk_max: usize,
        chunk_gap: Duration,
    ) -> Self {
        Self {
            backend,
            destinations,
            chunk_max: chunk_max.max(1),
            chunk_gap,
        }
    }

    pub fn from_config(backend: Arc<dyn DeliveryBackend>, config: &TelegramConfig) -> Self {
        Self::new(
            backend,
            config.targets.clone(),
            config.chunk_max,
            Duration::from_millis(config.chunk_gap_ms),
        )
    }

    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    /// Deliver `text` to every destination concurrently.
    ///
    /// Chunks reach a destination in order. A failure at one destination never
    /// affects another; nothing here returns an error.
    pub async fn deliver(&self, text: &str) -> DeliveryReport {
        if text.trim().is_empty() {
            debug!("nothing to deliver");
            return DeliveryReport::default();
        }
        let chunks = split_chunks(text, self.chunk_max);
        let sends = self
            .destinations
            .iter()
            .map(|dest| self.deliver_to(dest, &chunks));
        let report = join_all(sends)
            .await
            .into_iter()
            .map(DeliveryReport::from)
            .fold(DeliveryReport::default(), DeliveryReport::merge);
        info!(
            chunks = chunks.len(),
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "message delivered"
        );
        report
    }

    async fn deliver_to(&self, destination: &str, chunks: &[String]) -> Outcome {
        if is_placeholder(destination) {
            debug!(destination, "skipping placeholder destination");
            return Outcome::Skipped;
        }

        let mut dropped = 0usize;
        let mut first = true;
        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.trim().is_empty() {
                continue;
            }
            if !first && !self.chunk_gap.is_zero() {
                tokio::time::sleep(self.chunk_gap).await;
            }
            first = false;

            let Err(rich_err) = self.backend.send_message(destination, chunk, true).await else {
                continue;
            };
            debug!(destination, chunk_index = i, error = %rich_err, "rich send rejected, retrying as plain text");

            if let Err(e) = self
                .backend
                .send_message(destination, &plain_text(chunk), false)
                .await
            {
                warn!(destination, chunk_index = i, error = %e, "plain-text fallback failed, chunk dropped");
                dropped += 1;
            }
        }

        if dropped == 0 {
            Outcome::Delivered
        } else {
            Outcome::Failed
        }
    }

    /// Send one quiz poll to every destination concurrently.
    pub async fn deliver_poll(&self, poll: &PollMessage) -> DeliveryReport {
        let sends = self.destinations.iter().map(|dest| async move {
            if is_placeholder(dest) {
                return Outcome::Skipped;
            }
            match self.backend.send_poll(dest, poll).await {
                Ok(()) => Outcome::Delivered,
                Err(e) => {
                    warn!(destination = %dest, error = %e, "poll delivery failed");
                    Outcome::Failed
                }
            }
        });
        join_all(sends)
            .await
            .into_iter()
            .map(DeliveryReport::from)
            .fold(DeliveryReport::default(), DeliveryReport::merge)
    }
}
