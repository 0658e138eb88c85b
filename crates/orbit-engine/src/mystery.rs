//! Splitting a generated mystery case into its presentation and reveal.

use orbit_telegram::markup::render_html;

/// The model is asked to separate the two halves with this marker.
pub const REVEAL_DELIMITER: &str = "||REVEAL||";

pub const INTRO: &str = "👑 <b>GOD MODE ACTIVATED: THE HOUSE M.D. PROTOCOL</b> 👑\n\n<i>Searching global medical archives for anomalies...</i>";
pub const TEASER: &str = "🔒 <i>Differentials locked. The diagnosis drops with the next transmission. Make your call.</i>";
pub const MISSING_DELIMITER: &str = "⚠️ <b>Data Corruption:</b> AI forgot the spoiler tag. Diagnosis is in the text above.";
pub const SYSTEM_FAILURE: &str = "⚠️ <b>System Failure:</b> The case files are encrypted. (API Error).";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysteryCase {
    /// Rendered first half.
    pub presentation: String,
    /// Rendered second half; `None` when the delimiter was missing or
    /// nothing followed it.
    pub reveal: Option<String>,
}

impl MysteryCase {
    /// Split on the first delimiter and render both halves.
    pub fn parse(text: &str) -> Self {
        let mut parts = text.splitn(2, REVEAL_DELIMITER);
        let presentation = render_html(parts.next().unwrap_or_default());
        let reveal = parts.next().map(render_html).filter(|r| !r.is_empty());
        Self {
            presentation,
            reveal,
        }
    }
}

pub fn case_file(number: u16, presentation: &str) -> String {
    format!("📋 <b>CASE FILE #{number}: THE UNEXPLAINED</b>\n\n{presentation}")
}

pub fn reveal_message(reveal: &str) -> String {
    format!("🧬 <b>DIAGNOSIS REVEALED</b>\n\n{reveal}")
}

pub fn suspense_message(seconds: u64) -> String {
    format!("<i>⏳ Analyzing differentials... (You have {seconds} seconds to guess)</i>")
}
