pub mod adapter;
pub mod error;
pub mod markup;
pub mod send;

pub use adapter::{DeliveryBackend, PollMessage, TelegramBackend};
pub use error::TelegramError;
pub use send::{Broadcaster, DeliveryReport};
