use markpad_core::NoteStore;
use std::sync::Arc;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<NoteStore>,
    /// /api 接口限流（按 IP）
    pub limiter: Arc<crate::app::RateLimiter>,
}
