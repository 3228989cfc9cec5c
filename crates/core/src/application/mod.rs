// Application Layer - Use Cases and Business Logic

pub mod assembler;
pub mod constants;
pub mod decomposer;
pub mod generation;
pub mod panic_guard;
pub mod progress;
pub mod recovery;
pub mod retry;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports
pub use decomposer::decompose;
pub use generation::{GenerationRequest, GenerationService, SubmitDefaults};
pub use progress::{ProgressSubscription, ProgressTracker};
pub use recovery::{RecoveryMode, RecoveryService};
pub use retry::RetryPolicy;
pub use scheduler::{BatchScheduler, SchedulerConfig};
