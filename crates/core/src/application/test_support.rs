// Shared fixtures for application-layer tests

use crate::application::generation::{GenerationRequest, GenerationService};
use crate::application::progress::ProgressTracker;
use crate::application::scheduler::{BatchScheduler, SchedulerConfig};
use crate::domain::{BookTemplate, ContentRequirements, GenerationParams, PartTemplate};
use crate::port::book_exporter::mocks::RecordingExporter;
use crate::port::content_generator::mocks::MockContentGenerator;
use crate::port::id_provider::SequentialIdProvider;
use crate::port::job_store::mocks::InMemoryJobStore;
use crate::port::time_provider::ManualTimeProvider;
use crate::port::InMemoryTemplateCatalog;
use std::sync::Arc;
use std::time::Duration;

pub const FIVE_CHAPTER_TEMPLATE: &str = "ssw-five";

/// Two parts, 3 + 2 chapters, 10 pages per chapter.
pub fn five_chapter_template() -> BookTemplate {
    let part = |title: &str, chapters: u32| PartTemplate {
        title: title.to_string(),
        chapters,
        pages: chapters * 10,
        prompt_skeleton: "Write chapter {chapter_number}: {chapter_title} ({word_count} words)"
            .to_string(),
        chapter_titles: vec![],
        requirements: ContentRequirements::default(),
    };
    BookTemplate {
        id: FIVE_CHAPTER_TEMPLATE.to_string(),
        book_type: "ssw".to_string(),
        name: "Five Chapter Book".to_string(),
        description: String::new(),
        parts: vec![part("Basics", 3), part("Practice", 2)],
        params: GenerationParams::default(),
    }
}

pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        retry_delay: Duration::from_millis(1),
        attempt_timeout: Duration::from_millis(500),
        cost_per_1k_tokens: 0.01,
    }
}

pub fn request(concurrency: usize) -> GenerationRequest {
    GenerationRequest {
        book_type: "ssw".to_string(),
        template_id: Some(FIVE_CHAPTER_TEMPLATE.to_string()),
        concurrency: Some(concurrency),
        max_retries: Some(3),
        ..Default::default()
    }
}

pub struct Harness {
    pub store: Arc<InMemoryJobStore>,
    pub generator: Arc<MockContentGenerator>,
    pub exporter: Arc<RecordingExporter>,
    pub tracker: Arc<ProgressTracker>,
    pub clock: Arc<ManualTimeProvider>,
    pub service: GenerationService,
}

pub fn harness(generator: MockContentGenerator) -> Harness {
    harness_with(generator, RecordingExporter::new(), fast_config())
}

pub fn harness_with(
    generator: MockContentGenerator,
    exporter: RecordingExporter,
    config: SchedulerConfig,
) -> Harness {
    let store = Arc::new(InMemoryJobStore::new());
    let generator = Arc::new(generator);
    let exporter = Arc::new(exporter);
    let clock = Arc::new(ManualTimeProvider::new(1_000_000));
    let tracker = Arc::new(ProgressTracker::new(clock.clone()));

    let mut catalog = InMemoryTemplateCatalog::builtin();
    catalog.extend(vec![five_chapter_template()]);

    let scheduler = BatchScheduler::new(
        store.clone(),
        generator.clone(),
        tracker.clone(),
        clock.clone(),
        config,
    )
    .with_exporter(exporter.clone());

    let service = GenerationService::new(
        store.clone(),
        Arc::new(catalog),
        Arc::new(scheduler),
        Arc::new(SequentialIdProvider::default()),
        clock.clone(),
    );

    Harness {
        store,
        generator,
        exporter,
        tracker,
        clock,
        service,
    }
}
