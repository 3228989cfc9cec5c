// Book Template Domain Model
//
// Static structural definition of a book type: ordered parts, each with a
// chapter count, page budget and prompt skeleton.

use crate::domain::task::GenerationParams;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookTemplate {
    pub id: String,
    pub book_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parts: Vec<PartTemplate>,
    #[serde(default)]
    pub params: GenerationParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartTemplate {
    pub title: String,
    pub chapters: u32,
    pub pages: u32,
    pub prompt_skeleton: String,
    /// Optional explicit chapter titles, indexed by position inside the part.
    #[serde(default)]
    pub chapter_titles: Vec<String>,
    #[serde(default)]
    pub requirements: ContentRequirements,
}

/// Counts substituted into the prompt skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRequirements {
    pub vocabulary: u32,
    pub exercises: u32,
    pub dialogues: u32,
}

impl Default for ContentRequirements {
    fn default() -> Self {
        Self {
            vocabulary: 10,
            exercises: 5,
            dialogues: 1,
        }
    }
}

impl BookTemplate {
    pub fn total_chapters(&self) -> u32 {
        self.parts.iter().map(|p| p.chapters).sum()
    }

    pub fn total_pages(&self) -> u32 {
        self.parts.iter().map(|p| p.pages).sum()
    }
}
