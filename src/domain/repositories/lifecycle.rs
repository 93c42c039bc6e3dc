//! Engine Lifecycle Port
//!
//! The risk manager stops a user's engine when it enters a risk pause. The
//! hook is wired at composition time; a missing hook is tolerated so risk
//! verdicts never depend on lifecycle plumbing.

use async_trait::async_trait;

#[async_trait]
pub trait EngineLifecycle: Send + Sync {
    async fn stop_engine(&self, user: &str);
}
