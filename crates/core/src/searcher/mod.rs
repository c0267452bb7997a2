//! Provider fan-out orchestration.
//!
//! This module issues bounded-concurrency search calls to all enabled
//! providers for one query, with per-provider rate limiting, caching,
//! circuit breaking, timeouts and retries. A failing provider degrades the
//! result set; it never fails the whole query.

mod orchestrator;
mod rate_limiter;
mod types;

pub use orchestrator::FanoutOrchestrator;
pub use rate_limiter::IntervalLimiter;
pub use types::*;
