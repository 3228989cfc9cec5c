// Template Catalog Port
// Pure data lookup: book type / template id -> BookTemplate

use crate::domain::{BookTemplate, ContentRequirements, GenerationParams, PartTemplate};
use crate::error::{AppError, Result};
use std::collections::HashMap;

pub trait TemplateCatalog: Send + Sync {
    fn get(&self, template_id: &str) -> Option<BookTemplate>;

    /// Template used when a request names only a book type.
    fn default_for(&self, book_type: &str) -> Option<BookTemplate>;

    fn list(&self) -> Vec<BookTemplate>;

    /// Resolve a request to a template or fail with `InvalidTemplate`.
    fn resolve(&self, book_type: &str, template_id: Option<&str>) -> Result<BookTemplate> {
        let template = match template_id {
            Some(id) => self
                .get(id)
                .ok_or_else(|| AppError::InvalidTemplate(format!("unknown template '{}'", id)))?,
            None => self.default_for(book_type).ok_or_else(|| {
                AppError::InvalidTemplate(format!("unknown book type '{}'", book_type))
            })?,
        };
        if template.book_type != book_type {
            return Err(AppError::InvalidTemplate(format!(
                "template '{}' is a {} template, not {}",
                template.id, template.book_type, book_type
            )));
        }
        if template.parts.is_empty() || template.total_chapters() == 0 {
            return Err(AppError::InvalidTemplate(format!(
                "template '{}' has no chapters",
                template.id
            )));
        }
        Ok(template)
    }
}

/// Catalog backed by a fixed list of templates.
///
/// The first template registered for a book type is its default.
pub struct InMemoryTemplateCatalog {
    templates: Vec<BookTemplate>,
    defaults: HashMap<String, String>,
}

impl InMemoryTemplateCatalog {
    pub fn new(templates: Vec<BookTemplate>) -> Self {
        let mut defaults = HashMap::new();
        for t in &templates {
            defaults
                .entry(t.book_type.clone())
                .or_insert_with(|| t.id.clone());
        }
        Self {
            templates,
            defaults,
        }
    }

    /// Built-in SSW workplace textbook and JLPT study book templates.
    pub fn builtin() -> Self {
        Self::new(builtin_templates())
    }

    /// Add templates; an id that already exists is replaced.
    pub fn extend(&mut self, templates: Vec<BookTemplate>) {
        for t in templates {
            self.defaults
                .entry(t.book_type.clone())
                .or_insert_with(|| t.id.clone());
            match self.templates.iter_mut().find(|e| e.id == t.id) {
                Some(existing) => *existing = t,
                None => self.templates.push(t),
            }
        }
    }
}

impl TemplateCatalog for InMemoryTemplateCatalog {
    fn get(&self, template_id: &str) -> Option<BookTemplate> {
        self.templates.iter().find(|t| t.id == template_id).cloned()
    }

    fn default_for(&self, book_type: &str) -> Option<BookTemplate> {
        self.defaults
            .get(book_type)
            .and_then(|id| self.get(id))
    }

    fn list(&self) -> Vec<BookTemplate> {
        self.templates.clone()
    }
}

const SSW_SKELETON: &str = "You are writing chapter {chapter_number} \"{chapter_title}\" of the \
workplace Japanese textbook \"{book_title}\" for Specified Skilled Worker candidates in the \
{sector} sector, level {level}. Part: {part_title}. Write about {word_count} words. Include \
{vocabulary_count} vocabulary entries with readings, {dialogue_count} workplace dialogues and \
{exercise_count} exercises. Reply with JSON only: {\"title\", \"summary\", \"sections\": \
[{\"heading\", \"body\"}], \"vocabulary\": [{\"term\", \"reading\", \"meaning\"}], \
\"exercises\": [{\"question\", \"answer\"}]}.";

const JLPT_SKELETON: &str = "You are writing chapter {chapter_number} \"{chapter_title}\" of the \
JLPT {level} study book \"{book_title}\". Part: {part_title}. Write about {word_count} words \
covering grammar and reading practice. Include {vocabulary_count} vocabulary entries and \
{exercise_count} exam-style questions with answers. Reply with JSON only: {\"title\", \
\"summary\", \"sections\": [{\"heading\", \"body\"}], \"vocabulary\": [{\"term\", \"reading\", \
\"meaning\"}], \"exercises\": [{\"question\", \"answer\"}]}.";

fn part(
    title: &str,
    chapters: u32,
    pages: u32,
    skeleton: &str,
    titles: &[&str],
    requirements: ContentRequirements,
) -> PartTemplate {
    PartTemplate {
        title: title.to_string(),
        chapters,
        pages,
        prompt_skeleton: skeleton.to_string(),
        chapter_titles: titles.iter().map(|s| s.to_string()).collect(),
        requirements,
    }
}

fn builtin_templates() -> Vec<BookTemplate> {
    let ssw_params = GenerationParams {
        model: "default".to_string(),
        temperature: 0.7,
        max_tokens: 8192,
    };
    let jlpt_params = GenerationParams {
        temperature: 0.5,
        ..ssw_params.clone()
    };

    vec![
        BookTemplate {
            id: "ssw-workplace".to_string(),
            book_type: "ssw".to_string(),
            name: "SSW Workplace Japanese".to_string(),
            description: "Workplace textbook for Specified Skilled Worker candidates".to_string(),
            parts: vec![
                part(
                    "Getting Started at Work",
                    4,
                    40,
                    SSW_SKELETON,
                    &["Greetings and Introductions", "Workplace Rules", "Safety Signs", "Asking for Help"],
                    ContentRequirements { vocabulary: 15, exercises: 5, dialogues: 2 },
                ),
                part(
                    "Daily Operations",
                    4,
                    48,
                    SSW_SKELETON,
                    &["Reporting and Consulting", "Shift Handover", "Tools and Equipment", "Handling Mistakes"],
                    ContentRequirements { vocabulary: 20, exercises: 6, dialogues: 2 },
                ),
                part(
                    "Life in Japan",
                    2,
                    20,
                    SSW_SKELETON,
                    &[],
                    ContentRequirements { vocabulary: 12, exercises: 4, dialogues: 1 },
                ),
            ],
            params: ssw_params.clone(),
        },
        BookTemplate {
            id: "jlpt-n5".to_string(),
            book_type: "jlpt".to_string(),
            name: "JLPT N5 Study Book".to_string(),
            description: "Beginner grammar, vocabulary and reading".to_string(),
            parts: vec![
                part(
                    "Grammar Foundations",
                    6,
                    48,
                    JLPT_SKELETON,
                    &[],
                    ContentRequirements { vocabulary: 20, exercises: 10, dialogues: 0 },
                ),
                part(
                    "Reading Practice",
                    4,
                    32,
                    JLPT_SKELETON,
                    &[],
                    ContentRequirements { vocabulary: 10, exercises: 8, dialogues: 0 },
                ),
            ],
            params: jlpt_params.clone(),
        },
        BookTemplate {
            id: "jlpt-n3".to_string(),
            book_type: "jlpt".to_string(),
            name: "JLPT N3 Study Book".to_string(),
            description: "Intermediate grammar, vocabulary and reading".to_string(),
            parts: vec![
                part(
                    "Intermediate Grammar",
                    8,
                    80,
                    JLPT_SKELETON,
                    &[],
                    ContentRequirements { vocabulary: 25, exercises: 12, dialogues: 0 },
                ),
                part(
                    "Reading Comprehension",
                    4,
                    48,
                    JLPT_SKELETON,
                    &[],
                    ContentRequirements { vocabulary: 15, exercises: 10, dialogues: 0 },
                ),
            ],
            params: jlpt_params,
        },
    ]
}
