/// Telegram delivery channel for search sessions
pub mod channel;
/// Command parsing and message handlers
pub mod handlers;
/// Unauthorized access flood protection
pub mod unauthorized_cache;

pub use channel::TelegramDeliveryChannel;
pub use unauthorized_cache::UnauthorizedCache;
