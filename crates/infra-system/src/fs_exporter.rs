// Filesystem Book Exporter
// Writes {output_dir}/{job_id}/book.json and book.md

use async_trait::async_trait;
use bookgen_core::domain::AssembledBook;
use bookgen_core::error::Result;
use bookgen_core::port::BookExporter;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::info;

pub struct FsBookExporter {
    output_dir: PathBuf,
}

impl FsBookExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl BookExporter for FsBookExporter {
    async fn export(&self, book: &AssembledBook) -> Result<Vec<String>> {
        let book_dir = self.output_dir.join(&book.job_id);
        tokio::fs::create_dir_all(&book_dir).await?;

        let json_path = book_dir.join("book.json");
        tokio::fs::write(&json_path, serde_json::to_vec_pretty(book)?).await?;

        let md_path = book_dir.join("book.md");
        tokio::fs::write(&md_path, render_markdown(book)).await?;

        info!(
            job_id = %book.job_id,
            dir = %book_dir.display(),
            chapters = book.chapters.len(),
            "Book exported"
        );

        Ok(vec![
            json_path.to_string_lossy().into_owned(),
            md_path.to_string_lossy().into_owned(),
        ])
    }
}

/// Render the book as Markdown, one `##` heading per part.
pub fn render_markdown(book: &AssembledBook) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", book.title);

    let mut current_part: Option<&str> = None;
    for chapter in &book.chapters {
        if current_part != Some(chapter.part_title.as_str()) {
            let _ = writeln!(out, "## {}\n", chapter.part_title);
            current_part = Some(chapter.part_title.as_str());
        }

        let content = &chapter.content;
        let _ = writeln!(out, "### Chapter {}: {}\n", chapter.chapter_number, chapter.title);
        if !content.summary.is_empty() {
            let _ = writeln!(out, "_{}_\n", content.summary);
        }

        for section in &content.sections {
            let _ = writeln!(out, "#### {}\n\n{}\n", section.heading, section.body);
        }

        if !content.vocabulary.is_empty() {
            out.push_str("#### Vocabulary\n\n| Term | Reading | Meaning |\n|---|---|---|\n");
            for entry in &content.vocabulary {
                let _ = writeln!(out, "| {} | {} | {} |", entry.term, entry.reading, entry.meaning);
            }
            out.push('\n');
        }

        if !content.exercises.is_empty() {
            out.push_str("#### Exercises\n\n");
            for (i, exercise) in content.exercises.iter().enumerate() {
                let _ = writeln!(out, "{}. {}", i + 1, exercise.question);
                if !exercise.answer.is_empty() {
                    let _ = writeln!(out, "   - Answer: {}", exercise.answer);
                }
            }
            out.push('\n');
        }
    }

    if !book.failed_chapters.is_empty() {
        let missing: Vec<String> = book.failed_chapters.iter().map(|n| n.to_string()).collect();
        let _ = writeln!(out, "---\n\nMissing chapters: {}", missing.join(", "));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookgen_core::domain::{
        AssembledChapter, ChapterContent, ContentSection, Exercise, VocabularyEntry,
    };

    fn chapter(number: u32, part: &str) -> AssembledChapter {
        AssembledChapter {
            chapter_number: number,
            title: format!("Topic {}", number),
            part_title: part.to_string(),
            word_count: 4,
            content: ChapterContent {
                title: format!("Topic {}", number),
                summary: "Short summary".to_string(),
                sections: vec![ContentSection {
                    heading: "Dialogue".to_string(),
                    body: "こんにちは".to_string(),
                }],
                vocabulary: vec![VocabularyEntry {
                    term: "介護".to_string(),
                    reading: "かいご".to_string(),
                    meaning: "care".to_string(),
                }],
                exercises: vec![Exercise {
                    question: "Translate care".to_string(),
                    answer: "介護".to_string(),
                }],
            },
        }
    }

    fn book() -> AssembledBook {
        AssembledBook {
            job_id: "job-7".to_string(),
            title: "Care Work Japanese".to_string(),
            chapters: vec![chapter(1, "Basics"), chapter(2, "Basics"), chapter(4, "Practice")],
            failed_chapters: vec![3],
            total_words: 12,
            total_tokens: 3000,
            total_cost: 0.03,
        }
    }

    #[test]
    fn test_render_markdown_groups_parts() {
        let md = render_markdown(&book());
        assert!(md.starts_with("# Care Work Japanese\n"));
        assert_eq!(md.matches("## Basics").count(), 1);
        assert_eq!(md.matches("## Practice").count(), 1);
        assert!(md.contains("### Chapter 4: Topic 4"));
        assert!(md.contains("| 介護 | かいご | care |"));
        assert!(md.contains("1. Translate care"));
        assert!(md.trim_end().ends_with("Missing chapters: 3"));

        let basics = md.find("## Basics").unwrap();
        let practice = md.find("## Practice").unwrap();
        assert!(basics < practice);
    }

    #[tokio::test]
    async fn test_export_writes_json_and_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = FsBookExporter::new(dir.path());

        let files = exporter.export(&book()).await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("job-7/book.json"));
        assert!(files[1].ends_with("job-7/book.md"));

        let json = tokio::fs::read_to_string(&files[0]).await.unwrap();
        let parsed: AssembledBook = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, book());

        let md = tokio::fs::read_to_string(&files[1]).await.unwrap();
        assert!(md.contains("Care Work Japanese"));
    }

    #[tokio::test]
    async fn test_export_into_file_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let exporter = FsBookExporter::new(&blocker);
        let err = exporter.export(&book()).await.unwrap_err();
        assert!(matches!(err, bookgen_core::AppError::Io(_)));
    }
}
