// Task Decomposer - template + job -> ordered chapter tasks
use crate::application::constants::{DEFAULT_LEVEL, DEFAULT_SECTOR, WORDS_PER_PAGE};
use crate::domain::{
    BookTemplate, ChapterTask, GenerationJob, PartInfo, PartTemplate, TaskStatus,
};

/// Build the chapter tasks of a job.
///
/// Pure: identical template and job yield identical tasks. Parts are walked
/// in order and chapter numbers run sequentially across the whole book.
/// Output stops after `job.chapters_total` chapters, so a smaller target
/// truncates the template.
pub fn decompose(template: &BookTemplate, job: &GenerationJob) -> Vec<ChapterTask> {
    let template_pages = template.total_pages();
    let page_scale = if template_pages == 0 {
        1.0
    } else {
        job.target_pages as f64 / template_pages as f64
    };

    let mut tasks = Vec::with_capacity(job.chapters_total as usize);
    let mut chapter_number = 0u32;

    'parts: for (part_index, part) in template.parts.iter().enumerate() {
        if part.chapters == 0 {
            continue;
        }
        let pages_per_chapter = part.pages as f64 * page_scale / part.chapters as f64;
        let target_word_count = (pages_per_chapter * WORDS_PER_PAGE as f64).round() as u32;

        for chapter_in_part in 1..=part.chapters {
            if chapter_number >= job.chapters_total {
                break 'parts;
            }
            chapter_number += 1;

            let title = chapter_title(part, chapter_in_part);
            let prompt = render_prompt(part, job, chapter_number, &title, target_word_count);

            tasks.push(ChapterTask {
                id: task_id(&job.id, chapter_number),
                job_id: job.id.clone(),
                chapter_number,
                title,
                part: PartInfo {
                    part_number: part_index as u32 + 1,
                    part_title: part.title.clone(),
                    chapter_in_part,
                },
                target_word_count,
                prompt,
                params: template.params.clone(),
                status: TaskStatus::Pending,
                retry_count: 0,
                max_retries: job.max_retries,
                content: None,
                word_count: 0,
                tokens_used: 0,
                started_at: None,
                completed_at: None,
                error_message: None,
            });
        }
    }

    tasks
}

pub fn task_id(job_id: &str, chapter_number: u32) -> String {
    format!("{}-ch{:03}", job_id, chapter_number)
}

fn chapter_title(part: &PartTemplate, chapter_in_part: u32) -> String {
    part.chapter_titles
        .get(chapter_in_part as usize - 1)
        .cloned()
        .unwrap_or_else(|| format!("{} {}", part.title, chapter_in_part))
}

fn render_prompt(
    part: &PartTemplate,
    job: &GenerationJob,
    chapter_number: u32,
    chapter_title: &str,
    word_count: u32,
) -> String {
    let req = &part.requirements;
    let value = |key: &str| -> Option<String> {
        Some(match key {
            "chapter_number" => chapter_number.to_string(),
            "chapter_title" => chapter_title.to_string(),
            "book_title" => job.title.clone(),
            "part_title" => part.title.clone(),
            "word_count" => word_count.to_string(),
            "vocabulary_count" => req.vocabulary.to_string(),
            "exercise_count" => req.exercises.to_string(),
            "dialogue_count" => req.dialogues.to_string(),
            "sector" => job.sector.clone().unwrap_or_else(|| DEFAULT_SECTOR.to_string()),
            "level" => job.level.clone().unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
            _ => return None,
        })
    };

    // Single pass: substituted values are never scanned for placeholders
    let skeleton = part.prompt_skeleton.as_str();
    let mut prompt = String::with_capacity(skeleton.len());
    let mut rest = skeleton;
    while let Some(open) = rest.find('{') {
        prompt.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}').and_then(|close| Some((close, value(&after[..close])?))) {
            Some((close, replacement)) => {
                prompt.push_str(&replacement);
                rest = &after[close + 1..];
            }
            None => {
                // Unknown placeholder or stray brace stays as written
                prompt.push('{');
                rest = after;
            }
        }
    }
    prompt.push_str(rest);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{InMemoryTemplateCatalog, TemplateCatalog};

    fn job_for(template: &BookTemplate, target_pages: u32, chapters: u32) -> GenerationJob {
        let mut job = GenerationJob::new(
            "job-1",
            0,
            template.book_type.clone(),
            template.id.clone(),
            template.name.clone(),
            target_pages,
            chapters,
            2,
            3,
        );
        job.sector = Some("nursing care".to_string());
        job.level = Some("N4".to_string());
        job
    }

    #[test]
    fn test_chapters_numbered_across_parts() {
        let template = InMemoryTemplateCatalog::builtin().get("ssw-workplace").unwrap();
        let job = job_for(&template, template.total_pages(), template.total_chapters());
        let tasks = decompose(&template, &job);

        assert_eq!(tasks.len(), 10);
        let numbers: Vec<u32> = tasks.iter().map(|t| t.chapter_number).collect();
        assert_eq!(numbers, (1..=10).collect::<Vec<_>>());

        let fifth = &tasks[4];
        assert_eq!(fifth.part.part_number, 2);
        assert_eq!(fifth.part.chapter_in_part, 1);
        assert_eq!(fifth.title, "Reporting and Consulting");
        assert_eq!(fifth.id, "job-1-ch005");

        // Part 3 has no explicit titles
        assert_eq!(tasks[9].title, "Life in Japan 2");
    }

    #[test]
    fn test_word_budget_follows_pages() {
        let template = InMemoryTemplateCatalog::builtin().get("ssw-workplace").unwrap();
        let job = job_for(&template, template.total_pages(), template.total_chapters());
        let tasks = decompose(&template, &job);
        // 40 pages / 4 chapters * 400 words
        assert_eq!(tasks[0].target_word_count, 4000);
        // 48 / 4 * 400
        assert_eq!(tasks[4].target_word_count, 4800);

        // Half the pages, half the words
        let half = job_for(&template, template.total_pages() / 2, template.total_chapters());
        assert_eq!(decompose(&template, &half)[0].target_word_count, 2000);
    }

    #[test]
    fn test_prompt_placeholders_substituted() {
        let template = InMemoryTemplateCatalog::builtin().get("ssw-workplace").unwrap();
        let job = job_for(&template, template.total_pages(), template.total_chapters());
        let task = &decompose(&template, &job)[0];

        assert!(task.prompt.contains("chapter 1 \"Greetings and Introductions\""));
        assert!(task.prompt.contains("nursing care"));
        assert!(task.prompt.contains("level N4"));
        assert!(task.prompt.contains("15 vocabulary entries"));
        assert!(!task.prompt.contains("{word_count}"));
    }

    #[test]
    fn test_substituted_values_are_not_expanded_again() {
        let mut template = InMemoryTemplateCatalog::builtin().get("jlpt-n5").unwrap();
        template.parts[0].prompt_skeleton =
            "{book_title} / {level} / {unknown} / {open".to_string();
        let mut job = job_for(&template, template.total_pages(), 1);
        job.title = "{level} book".to_string();
        job.level = Some("N5".to_string());

        let task = &decompose(&template, &job)[0];
        assert_eq!(task.prompt, "{level} book / N5 / {unknown} / {open");
    }

    #[test]
    fn test_truncates_to_target_chapters() {
        let template = InMemoryTemplateCatalog::builtin().get("jlpt-n5").unwrap();
        let job = job_for(&template, template.total_pages(), 7);
        let tasks = decompose(&template, &job);
        assert_eq!(tasks.len(), 7);
        assert_eq!(tasks[6].part.part_number, 2);
        assert_eq!(tasks[6].part.chapter_in_part, 1);
    }

    #[test]
    fn test_decomposition_is_deterministic() {
        let template = InMemoryTemplateCatalog::builtin().get("jlpt-n3").unwrap();
        let job = job_for(&template, 100, template.total_chapters());
        assert_eq!(decompose(&template, &job), decompose(&template, &job));
    }

    #[test]
    fn test_tasks_start_pending_with_job_retry_budget() {
        let template = InMemoryTemplateCatalog::builtin().get("jlpt-n5").unwrap();
        let job = job_for(&template, template.total_pages(), template.total_chapters());
        for task in decompose(&template, &job) {
            assert_eq!(task.status, TaskStatus::Pending);
            assert_eq!(task.max_retries, 3);
            assert_eq!(task.job_id, "job-1");
            assert_eq!(task.params.temperature, 0.5);
        }
    }
}
