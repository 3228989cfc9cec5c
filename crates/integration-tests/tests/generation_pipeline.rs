//! End-to-end generation against the SQLite store
//!
//! Drives real jobs through decomposition, batching, retries, cancellation
//! and export, then checks what was persisted.

mod common;

use bookgen_core::domain::{JobStatus, TaskStatus};
use bookgen_core::error::AppError;
use bookgen_core::port::content_generator::mocks::MockContentGenerator;
use bookgen_core::port::JobStore;
use common::{request, sqlite_store, stack, wait_for_call};

#[tokio::test]
async fn test_all_chapters_succeed_and_book_is_exported() {
    let out = tempfile::tempdir().unwrap();
    let store = sqlite_store("sqlite::memory:").await;
    let s = stack(store, MockContentGenerator::new_success(), Some(out.path()));
    let mut progress = s.tracker.subscribe_all();

    let job_id = s.service.submit(request(2)).await.unwrap();
    assert_eq!(s.service.wait(&job_id).await.unwrap(), JobStatus::Completed);

    let job = s.store.read_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.chapters_completed, 5);
    assert_eq!(job.chapters_failed, 0);
    assert_eq!(job.progress, 100);
    assert_eq!(job.total_words, 50);
    assert_eq!(job.total_tokens, 500);
    assert!((job.total_cost - 0.01).abs() < 1e-9);
    assert!(job.error_message.is_none());
    assert!(job.completed_at.is_some());

    // Exported files exist on disk
    assert_eq!(job.output_files.len(), 2);
    for file in &job.output_files {
        assert!(std::path::Path::new(file).exists(), "missing {}", file);
    }

    // Chapters are stored in order with their content
    let tasks = s.store.read_tasks_by_job(&job_id).await.unwrap();
    let numbers: Vec<u32> = tasks.iter().map(|t| t.chapter_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
    assert!(tasks.iter().all(|t| t.content.is_some()));
    assert_eq!(tasks[3].part.part_title, "Workplace");
    assert_eq!(tasks[3].part.chapter_in_part, 1);
    assert_eq!(tasks[0].target_word_count, 4000);

    // Progress never moves backwards and ends at 100
    let mut last = 0;
    let mut seen_terminal = false;
    while let Ok(Some(snapshot)) =
        tokio::time::timeout(std::time::Duration::from_millis(50), progress.recv()).await
    {
        assert!(snapshot.progress >= last);
        last = snapshot.progress;
        seen_terminal |= snapshot.status == JobStatus::Completed;
    }
    assert_eq!(last, 100);
    assert!(seen_terminal);

    assert!(s.generator.max_in_flight() <= 2);
}

#[tokio::test]
async fn test_failing_chapter_is_isolated() {
    let store = sqlite_store("sqlite::memory:").await;
    let s = stack(store, MockContentGenerator::new_success().failing_chapter(3), None);

    let job_id = s.service.submit(request(2)).await.unwrap();
    assert_eq!(s.service.wait(&job_id).await.unwrap(), JobStatus::Completed);

    let job = s.store.read_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.chapters_completed, 4);
    assert_eq!(job.chapters_failed, 1);
    assert!(job.error_message.unwrap().contains("1 of 5 chapters failed"));

    // max_retries = 2: one attempt plus two retries
    assert_eq!(s.generator.call_count(3), 3);

    let failed = s
        .store
        .read_tasks_by_job(&job_id)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.chapter_number == 3)
        .unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.retry_count, 2);
    assert!(failed
        .error_message
        .unwrap()
        .contains("Chapter 3 failed after 3 attempts"));
    assert!(failed.content.is_none());
}

#[tokio::test]
async fn test_cancel_after_first_batch_keeps_remaining_tasks_pending() {
    let store = sqlite_store("sqlite::memory:").await;
    let (generator, gate) = MockContentGenerator::new_success().gated_from(3);
    let s = stack(store, generator, None);

    let job_id = s.service.submit(request(2)).await.unwrap();
    wait_for_call(&s.generator, 3).await;

    assert!(s.service.cancel(&job_id).await.unwrap());
    gate.open();
    assert_eq!(s.service.wait(&job_id).await.unwrap(), JobStatus::Cancelled);

    let job = s.store.read_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.chapters_completed, 2);

    let tasks = s.store.read_tasks_by_job(&job_id).await.unwrap();
    assert_eq!(tasks[4].status, TaskStatus::Pending);
    assert_eq!(s.generator.call_count(5), 0);

    // A terminal job cannot be cancelled twice
    assert!(!s.service.cancel(&job_id).await.unwrap());
}

#[tokio::test]
async fn test_unknown_template_schedules_nothing() {
    let store = sqlite_store("sqlite::memory:").await;
    let s = stack(store, MockContentGenerator::new_success(), None);

    let mut req = request(2);
    req.template_id = Some("does-not-exist".to_string());
    let err = s.service.submit(req).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTemplate(_)));

    assert!(s.store.list_jobs(None, 10).await.unwrap().is_empty());
    assert_eq!(s.generator.total_calls(), 0);
}

#[tokio::test]
async fn test_truncated_and_scaled_request() {
    let store = sqlite_store("sqlite::memory:").await;
    let s = stack(store, MockContentGenerator::new_success(), None);

    let mut req = request(3);
    req.target_chapters = Some(4);
    req.target_pages = Some(25);
    let job_id = s.service.submit(req).await.unwrap();
    s.service.wait(&job_id).await.unwrap();

    let tasks = s.store.read_tasks_by_job(&job_id).await.unwrap();
    assert_eq!(tasks.len(), 4);
    // Half the template's 50 pages: 5 pages per chapter
    assert!(tasks.iter().all(|t| t.target_word_count == 2000));

    let book = s.service.get_book(&job_id, 0.02).await.unwrap();
    assert_eq!(book.chapters.len(), 4);
    assert_eq!(book.total_tokens, 400);
}
