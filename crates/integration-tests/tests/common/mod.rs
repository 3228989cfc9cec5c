//! Shared wiring: the real scheduler over a SQLite store with a scripted generator.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bookgen_core::application::{
    BatchScheduler, GenerationRequest, GenerationService, ProgressTracker, SchedulerConfig,
};
use bookgen_core::domain::{BookTemplate, ContentRequirements, GenerationParams, PartTemplate};
use bookgen_core::port::content_generator::mocks::MockContentGenerator;
use bookgen_core::port::id_provider::SequentialIdProvider;
use bookgen_core::port::{InMemoryTemplateCatalog, SystemTimeProvider};
use bookgen_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};
use bookgen_infra_system::FsBookExporter;

pub const TEMPLATE_ID: &str = "it-three-two";

/// Parts of 3 and 2 chapters, 10 pages each chapter.
pub fn template() -> BookTemplate {
    let part = |title: &str, chapters: u32| PartTemplate {
        title: title.to_string(),
        chapters,
        pages: chapters * 10,
        prompt_skeleton: "Chapter {chapter_number} of {book_title}: {chapter_title}".to_string(),
        chapter_titles: vec![],
        requirements: ContentRequirements::default(),
    };
    BookTemplate {
        id: TEMPLATE_ID.to_string(),
        book_type: "ssw".to_string(),
        name: "Integration Book".to_string(),
        description: String::new(),
        parts: vec![part("Foundations", 3), part("Workplace", 2)],
        params: GenerationParams::default(),
    }
}

pub fn request(concurrency: usize) -> GenerationRequest {
    GenerationRequest {
        book_type: "ssw".to_string(),
        template_id: Some(TEMPLATE_ID.to_string()),
        concurrency: Some(concurrency),
        max_retries: Some(2),
        ..Default::default()
    }
}

pub async fn sqlite_store(url: &str) -> Arc<SqliteJobStore> {
    let pool = create_pool(url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(SqliteJobStore::new(pool))
}

pub struct Stack {
    pub store: Arc<SqliteJobStore>,
    pub generator: Arc<MockContentGenerator>,
    pub tracker: Arc<ProgressTracker>,
    pub service: Arc<GenerationService>,
}

pub fn stack(
    store: Arc<SqliteJobStore>,
    generator: MockContentGenerator,
    output_dir: Option<&std::path::Path>,
) -> Stack {
    let time_provider = Arc::new(SystemTimeProvider);
    let generator = Arc::new(generator);
    let tracker = Arc::new(ProgressTracker::new(time_provider.clone()));

    let mut catalog = InMemoryTemplateCatalog::builtin();
    catalog.extend(vec![template()]);

    let mut scheduler = BatchScheduler::new(
        store.clone(),
        generator.clone(),
        tracker.clone(),
        time_provider.clone(),
        SchedulerConfig {
            retry_delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(2),
            cost_per_1k_tokens: 0.02,
        },
    );
    if let Some(dir) = output_dir {
        scheduler = scheduler.with_exporter(Arc::new(FsBookExporter::new(dir)));
    }

    let service = Arc::new(GenerationService::new(
        store.clone(),
        Arc::new(catalog),
        Arc::new(scheduler),
        Arc::new(SequentialIdProvider::default()),
        time_provider,
    ));

    Stack {
        store,
        generator,
        tracker,
        service,
    }
}

/// Poll until the generator has been called for `chapter`.
pub async fn wait_for_call(generator: &MockContentGenerator, chapter: u32) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while generator.call_count(chapter) == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("generator was never called for the chapter");
}
