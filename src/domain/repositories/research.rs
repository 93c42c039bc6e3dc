//! Research Provider Port

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::signal::ResearchResult;

#[derive(Debug, Error, Clone)]
pub enum ResearchError {
    #[error("Research failed for {symbol}: {message}")]
    Failed { symbol: String, message: String },
}

/// Produces the signal/accuracy snapshot the execution engine acts on.
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    async fn run_research(&self, symbol: &str) -> Result<ResearchResult, ResearchError>;
}
