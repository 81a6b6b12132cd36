/// Command and message handlers
pub mod handlers;
/// Common messaging utilities (split long messages, formatting)
pub mod messaging;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;
/// Unauthorized access flood protection
pub mod unauthorized_cache;

pub use unauthorized_cache::UnauthorizedCache;
