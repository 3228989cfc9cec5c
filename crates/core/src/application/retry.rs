// Retry logic for chapter generation
use crate::application::panic_guard::{execute_guarded_async, PanicGuardResult};
use crate::domain::{ChapterTask, TaskStatus};
use crate::error::AppError;
use crate::port::{ContentGenerator, GenerationError, TimeProvider};
use std::time::Duration;
use tracing::{error, info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the task after the given delay
    Retry(Duration),
    /// Retries exhausted, the task has failed permanently
    Exhausted,
}

/// Fixed-delay retry policy with a per-attempt timeout.
///
/// A task gets `max_retries` retries, i.e. `max_retries + 1` attempts. Retries
/// happen in place: the task is never re-queued to a later batch.
pub struct RetryPolicy {
    delay: Duration,
    attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `delay` - Fixed delay between attempts
    /// * `attempt_timeout` - Limit on a single generator call; a timeout is retryable
    pub fn new(delay: Duration, attempt_timeout: Duration) -> Self {
        Self {
            delay,
            attempt_timeout,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Decide whether a task that just failed gets another attempt
    pub fn should_retry(&self, task: &ChapterTask) -> RetryDecision {
        if task.has_retries_left() {
            RetryDecision::Retry(self.delay)
        } else {
            warn!(
                task_id = %task.id,
                retry_count = task.retry_count,
                max_retries = task.max_retries,
                "Max retry attempts reached"
            );
            RetryDecision::Exhausted
        }
    }

    /// Run one task to a terminal state.
    ///
    /// Expects the task in `generating` (the coordinator starts it). Returns
    /// the task `completed` with content, or `failed` with the exhaustion
    /// error recorded. Never touches the store.
    pub async fn run(
        &self,
        generator: &dyn ContentGenerator,
        mut task: ChapterTask,
        time_provider: &dyn TimeProvider,
    ) -> ChapterTask {
        loop {
            let attempt = tokio::time::timeout(self.attempt_timeout, generator.generate(&task));
            let failure = match execute_guarded_async(attempt).await {
                PanicGuardResult::Success(Ok(Ok(generated))) => {
                    let now = time_provider.now_millis();
                    match task.complete(generated, now) {
                        Ok(()) => {
                            info!(
                                task_id = %task.id,
                                chapter = task.chapter_number,
                                retries = task.retry_count,
                                words = task.word_count,
                                "Chapter generated"
                            );
                        }
                        Err(e) => Self::give_up(&mut task, e.to_string(), now),
                    }
                    return task;
                }
                PanicGuardResult::Success(Ok(Err(e))) => e,
                PanicGuardResult::Success(Err(_elapsed)) => {
                    GenerationError::Timeout(self.attempt_timeout.as_millis() as u64)
                }
                PanicGuardResult::Panicked(msg) => GenerationError::Panicked(msg),
            };

            match self.should_retry(&task) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        task_id = %task.id,
                        chapter = task.chapter_number,
                        attempt = task.retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Chapter generation failed, retrying"
                    );
                    if let Err(e) = task.schedule_retry(failure.to_string()) {
                        Self::give_up(&mut task, e.to_string(), time_provider.now_millis());
                        return task;
                    }
                    tokio::time::sleep(delay).await;
                    if let Err(e) = task.begin_attempt(time_provider.now_millis()) {
                        Self::give_up(&mut task, e.to_string(), time_provider.now_millis());
                        return task;
                    }
                }
                RetryDecision::Exhausted => {
                    let exhausted = AppError::GenerationExhausted {
                        chapter: task.chapter_number,
                        attempts: task.retry_count + 1,
                        last_error: failure,
                    };
                    error!(task_id = %task.id, error = %exhausted, "Chapter failed permanently");
                    Self::give_up(&mut task, exhausted.to_string(), time_provider.now_millis());
                    return task;
                }
            }
        }
    }

    fn give_up(task: &mut ChapterTask, message: String, now: i64) {
        if task.fail(message.clone(), now).is_err() {
            // Only reachable from an illegal transition; force the terminal state.
            task.status = TaskStatus::Failed;
            task.error_message = Some(message);
            task.completed_at = Some(now);
        }
    }
}
