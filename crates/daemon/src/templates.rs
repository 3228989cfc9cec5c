//! Template file loading
//!
//! A TOML file of `[[templates]]` tables, merged over the built-in catalog.

use anyhow::{Context, Result};
use bookgen_core::domain::BookTemplate;
use bookgen_core::port::InMemoryTemplateCatalog;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(default)]
    templates: Vec<BookTemplate>,
}

/// Built-in catalog, extended with the templates in `path` when given.
pub fn build_catalog(path: Option<&Path>) -> Result<InMemoryTemplateCatalog> {
    let mut catalog = InMemoryTemplateCatalog::builtin();
    if let Some(path) = path {
        let templates = load_templates(path)?;
        info!(path = %path.display(), count = templates.len(), "Loaded custom templates");
        catalog.extend(templates);
    }
    Ok(catalog)
}

pub fn load_templates(path: &Path) -> Result<Vec<BookTemplate>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read templates file {}", path.display()))?;
    let file: TemplateFile = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse templates file {}", path.display()))?;

    for template in &file.templates {
        if template.parts.is_empty() {
            anyhow::bail!("template '{}' has no parts", template.id);
        }
        if let Some(part) = template.parts.iter().find(|p| p.chapters == 0 || p.pages == 0) {
            anyhow::bail!(
                "template '{}': part '{}' needs at least one chapter and one page",
                template.id,
                part.title
            );
        }
    }
    Ok(file.templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookgen_core::port::TemplateCatalog;

    const CUSTOM: &str = r#"
[[templates]]
id = "ssw-food-service"
book_type = "ssw"
name = "Food Service Japanese"

[[templates.parts]]
title = "Kitchen Basics"
chapters = 2
pages = 20
prompt_skeleton = "Chapter {chapter_number}: {chapter_title} for {sector}"
chapter_titles = ["Hygiene", "Knives"]

[[templates.parts]]
title = "Front of House"
chapters = 1
pages = 8
prompt_skeleton = "Chapter {chapter_number}: {chapter_title}"
"#;

    #[test]
    fn test_load_templates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.toml");
        std::fs::write(&path, CUSTOM).unwrap();

        let templates = load_templates(&path).unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].total_chapters(), 3);
        assert_eq!(templates[0].total_pages(), 28);
        assert_eq!(templates[0].parts[0].chapter_titles, vec!["Hygiene", "Knives"]);

        let catalog = build_catalog(Some(&path)).unwrap();
        assert!(catalog.get("ssw-food-service").is_some());
        // Built-ins stay the default for their book type
        assert_ne!(catalog.default_for("ssw").unwrap().id, "ssw-food-service");
    }

    #[test]
    fn test_rejects_part_without_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.toml");
        std::fs::write(&path, CUSTOM.replace("chapters = 1", "chapters = 0")).unwrap();

        let err = load_templates(&path).unwrap_err();
        assert!(err.to_string().contains("Front of House"));
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_templates(Path::new("/nonexistent/templates.toml")).is_err());
        assert!(build_catalog(None).is_ok());
    }
}
