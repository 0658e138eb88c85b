//! Prompt texts and the message templates that wrap generated content.

use rand::seq::IndexedRandom;
use rand::Rng;

use orbit_telegram::markup::escape;

/// Shown above a quiz batch.
pub const QUOTES: &[&str] = &[
    "Your stop loss is tighter than your work ethic right now. 🛑💀",
    "Green candles wait for no one. Neither does your rent. 🕯️💸",
    "Market's volatile. Your focus? Non-existent. 📉🥴",
    "Stop staring at the 1-minute chart and start grinding. ⏳😤",
    "Do it for the plot. (And the paycheck). 🎬💰",
    "Standing on business? More like sleeping on business. 🛌📉",
    "Delulu is not the solulu if you don't do the work. 🦄🚫",
    "Academic comeback season starts in 3... 2... never mind, just start. 🎓🏁",
    "Not the academic downfall arc... fix it immediately. 📉🚧",
    "Brain rot is real, and you are patient zero. 🧟📉",
    "Locked in? Or locked out of reality? Focus. 🔒🌍",
];

pub const MYSTERY: &str = r#"ACT AS: A Senior Consultant at a top-tier research hospital.
TASK: Present a "Medical Mystery" case study for a final year student.
TOPIC: A rare, baffling, or catastrophic condition (Any field: Toxicology, Neuro, ID, Genetics).

STRICT FORMATTING RULES:
1. Do NOT use Markdown (no ##, no **, no __).
2. Use only these HTML tags: <b>bold</b>, <i>italic</i>, <u>underline</u>, <span class="tg-spoiler">hidden</span>.
3. Split the response into two distinct parts separated by the text "||REVEAL||".

PART 1 (The Presentation):
- Start with <b>PATIENT DEMOGRAPHICS:</b> (Make it weird).
- <b>VITALS & LABS:</b> Use <u>underline</u> tags to highlight abnormal values or key findings.
- <b>THE DETERIORATION:</b> (Patient gets worse).
- End with: <i>"WHAT IS YOUR DIAGNOSIS?"</i>

PART 2 (The Solution):
- <b>DIAGNOSIS:</b> Wrap the name of the diagnosis in <span class="tg-spoiler">TAGS</span> so it is hidden.
- <b>THE SMOKING GUN:</b> Wrap the key clue in <span class="tg-spoiler">TAGS</span> so it is hidden.
- <b>PATHOPHYSIOLOGY:</b> Explain why this happened.
- <b>SURVIVAL STATUS:</b> Did they make it?

TONE: Intense, professional but baffled ("Doctors were stumped"), academic."#;

pub fn fact(topic: &str) -> String {
    format!("Tell me a mind-blowing, short random fact about {topic}. Keep it under 2 sentences.")
}

pub fn quiz(count: u32, unit: &str) -> String {
    format!(
        r#"Generate {count} multiple-choice questions about {unit} for a 4th Year Student.

Strict JSON format: Return a LIST of objects.
[
    {{"question": "...", "options": ["A","B","C","D"], "correct_id": 0, "explanation": "..."}},
    ...
]

Exactly 4 options per question. Limits: Question < 250 chars, Options < 100 chars, Explanation < 200 chars."#
    )
}

pub fn fact_message(rendered: &str) -> String {
    format!("🎱 <b>Magic-∞ Fact:</b>\n\n{rendered}")
}

pub fn quiz_intro(quote: &str, count: u32, unit: &str) -> String {
    format!(
        "🚨 <b>{}</b>\n\nIncoming Rapid Fire: <b>{count} Questions on {}</b>",
        escape(quote),
        escape(unit)
    )
}

pub fn random_quote<R: Rng>(rng: &mut R) -> &'static str {
    QUOTES.choose(rng).copied().unwrap_or("Focus.")
}
