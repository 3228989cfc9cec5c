// Book assembly from finished chapter tasks
use crate::domain::{AssembledBook, AssembledChapter, ChapterTask, GenerationJob, TaskStatus};

/// Collect completed chapters in ascending chapter order and sum the totals.
///
/// Output order depends only on chapter numbers, never on completion order.
pub fn assemble_book(job: &GenerationJob, tasks: &[ChapterTask], cost_per_1k_tokens: f64) -> AssembledBook {
    let mut sorted: Vec<&ChapterTask> = tasks.iter().collect();
    sorted.sort_by_key(|t| t.chapter_number);

    let mut chapters = Vec::new();
    let mut failed_chapters = Vec::new();
    for task in sorted {
        match (&task.status, &task.content) {
            (TaskStatus::Completed, Some(content)) => chapters.push(AssembledChapter {
                chapter_number: task.chapter_number,
                title: task.title.clone(),
                part_title: task.part.part_title.clone(),
                word_count: task.word_count,
                content: content.clone(),
            }),
            (TaskStatus::Failed, _) => failed_chapters.push(task.chapter_number),
            _ => {}
        }
    }

    let total_words = chapters.iter().map(|c| c.word_count as u64).sum();
    let total_tokens: u64 = tasks.iter().map(|t| t.tokens_used).sum();

    AssembledBook {
        job_id: job.id.clone(),
        title: job.title.clone(),
        chapters,
        failed_chapters,
        total_words,
        total_tokens,
        total_cost: total_tokens as f64 / 1000.0 * cost_per_1k_tokens,
    }
}

/// `"N of M chapters failed: chapter a, b"`, or `None` when nothing failed.
pub fn failure_summary(failed_chapters: &[u32], chapters_total: u32) -> Option<String> {
    if failed_chapters.is_empty() {
        return None;
    }
    let list = failed_chapters
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!(
        "{} of {} chapters failed: chapter {}",
        failed_chapters.len(),
        chapters_total,
        list
    ))
}
