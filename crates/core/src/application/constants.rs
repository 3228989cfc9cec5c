// Scheduler constants (no magic values)
use std::time::Duration;

/// Tasks per batch when the request does not say
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Upper bound on a caller-specified concurrency
pub const MAX_CONCURRENCY: usize = 50;

/// Retries per task when the request does not say
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound on a caller-specified retry limit
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Fixed delay between attempts of one task (2s)
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Hard limit on a single generation attempt (2 minutes)
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Words per printed page, used to derive chapter word targets
pub const WORDS_PER_PAGE: u32 = 400;

/// Estimate horizon before any chapter has completed (30 minutes)
pub const DEFAULT_ESTIMATE_HORIZON_MS: i64 = 30 * 60 * 1000;

/// Buffered snapshots per progress channel
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Prompt fallbacks when the request leaves sector/level unset
pub const DEFAULT_SECTOR: &str = "general";
pub const DEFAULT_LEVEL: &str = "beginner";

/// Message recorded on a job cancelled through the API
pub const CANCELLED_MESSAGE: &str = "Cancelled by request";
