use std::sync::Arc;

use crate::analyzer::PhaseAnalyzer;
use crate::rate_limit::RateLimiter;
use crate::validation::ValidationLimits;

// app's shared state
pub struct AppState {
    pub app_name: String,
    pub version: String,
    pub rate_limiter: Arc<RateLimiter>, // one per process, shared with the sweeper
    pub analyzer: PhaseAnalyzer,
    pub limits: ValidationLimits,
    pub api_key_hash_length: usize,
}
