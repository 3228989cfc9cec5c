// Content Generator Port
// Abstraction over the external LLM call: generate(task) -> content or error

use crate::domain::{ChapterTask, GeneratedChapter};
use async_trait::async_trait;
use thiserror::Error;

/// Generation errors.
///
/// The scheduler retries every variant identically; the distinction only
/// matters for logs and the recorded error message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Generation timed out after {0}ms")]
    Timeout(u64),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Quota exceeded: {0}")]
    Quota(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Generator panicked: {0}")]
    Panicked(String),
}

/// Content Generator trait
///
/// Implementations:
/// - HttpContentGenerator (infra-system): hosted LLM API
/// - mocks::MockContentGenerator: scripted behaviour for tests
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Attempt to produce structured content for one chapter.
    async fn generate(&self, task: &ChapterTask) -> Result<GeneratedChapter, GenerationError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{ChapterContent, ContentSection};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::watch;

    /// Scripted content generator.
    ///
    /// Succeeds by default; individual chapters can be made to fail always,
    /// fail a fixed number of times, panic, or wait on a gate.
    #[derive(Default)]
    pub struct MockContentGenerator {
        always_failing: HashSet<u32>,
        transient_failures: HashMap<u32, u32>,
        panicking: HashSet<u32>,
        hanging: HashSet<u32>,
        delay: Duration,
        reverse_stagger: bool,
        gate: Option<(u32, watch::Receiver<bool>)>,
        calls: Mutex<HashMap<u32, u32>>,
        completion_order: Mutex<Vec<u32>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    /// Opens a gate created by [`MockContentGenerator::gated_from`].
    pub struct GateHandle(watch::Sender<bool>);

    impl GateHandle {
        pub fn open(&self) {
            let _ = self.0.send(true);
        }
    }

    impl MockContentGenerator {
        pub fn new_success() -> Self {
            Self::default()
        }

        /// Chapter fails on every attempt.
        pub fn failing_chapter(mut self, chapter: u32) -> Self {
            self.always_failing.insert(chapter);
            self
        }

        /// Chapter fails `times` attempts, then succeeds.
        pub fn flaky_chapter(mut self, chapter: u32, times: u32) -> Self {
            self.transient_failures.insert(chapter, times);
            self
        }

        pub fn panicking_chapter(mut self, chapter: u32) -> Self {
            self.panicking.insert(chapter);
            self
        }

        /// Chapter never returns (exercises the per-attempt timeout).
        pub fn hanging_chapter(mut self, chapter: u32) -> Self {
            self.hanging.insert(chapter);
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Higher chapter numbers finish first inside a batch.
        pub fn with_reverse_stagger(mut self) -> Self {
            self.reverse_stagger = true;
            self
        }

        /// Chapters `>= chapter` block until the returned gate is opened.
        pub fn gated_from(mut self, chapter: u32) -> (Self, GateHandle) {
            let (tx, rx) = watch::channel(false);
            self.gate = Some((chapter, rx));
            (self, GateHandle(tx))
        }

        pub fn call_count(&self, chapter: u32) -> u32 {
            self.calls
                .lock()
                .unwrap()
                .get(&chapter)
                .copied()
                .unwrap_or(0)
        }

        pub fn total_calls(&self) -> u32 {
            self.calls.lock().unwrap().values().sum()
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        pub fn completion_order(&self) -> Vec<u32> {
            self.completion_order.lock().unwrap().clone()
        }

        async fn respond(&self, task: &ChapterTask, attempt: u32) -> Result<GeneratedChapter, GenerationError> {
            let chapter = task.chapter_number;

            if let Some((from, rx)) = &self.gate {
                if chapter >= *from {
                    let mut rx = rx.clone();
                    let _ = rx.wait_for(|open| *open).await;
                }
            }

            let delay = if self.reverse_stagger {
                self.delay * (100 - chapter.min(99))
            } else {
                self.delay
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if self.hanging.contains(&chapter) {
                std::future::pending::<()>().await;
            }
            if self.panicking.contains(&chapter) {
                panic!("mock generator panic for chapter {}", chapter);
            }
            if self.always_failing.contains(&chapter) {
                return Err(GenerationError::Malformed(format!(
                    "chapter {} always fails",
                    chapter
                )));
            }
            if let Some(times) = self.transient_failures.get(&chapter) {
                if attempt <= *times {
                    return Err(GenerationError::Quota(format!(
                        "chapter {} attempt {} throttled",
                        chapter, attempt
                    )));
                }
            }

            Ok(GeneratedChapter {
                content: ChapterContent {
                    title: task.title.clone(),
                    summary: format!("Summary of chapter {}", chapter),
                    sections: vec![ContentSection {
                        heading: task.title.clone(),
                        body: "本文です".to_string(),
                    }],
                    vocabulary: vec![],
                    exercises: vec![],
                },
                tokens_used: 100,
                model: task.params.model.clone(),
            })
        }
    }

    /// Decrements the in-flight counter even when the call is dropped by a timeout.
    struct InFlightGuard<'a>(&'a AtomicUsize);

    impl Drop for InFlightGuard<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ContentGenerator for MockContentGenerator {
        async fn generate(&self, task: &ChapterTask) -> Result<GeneratedChapter, GenerationError> {
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                let count = calls.entry(task.chapter_number).or_insert(0);
                *count += 1;
                *count
            };

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlightGuard(&self.in_flight);

            let result = self.respond(task, attempt).await;

            if result.is_ok() {
                self.completion_order
                    .lock()
                    .unwrap()
                    .push(task.chapter_number);
            }
            result
        }
    }
}
