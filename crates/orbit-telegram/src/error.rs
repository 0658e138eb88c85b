/// Errors produced by the Telegram adapter.
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("teloxide error: {0}")]
    Teloxide(#[from] teloxide::RequestError),

    #[error("no bot token configured")]
    NoToken,

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("delivery rejected: {0}")]
    Rejected(String),
}
