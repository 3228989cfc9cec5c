// Generated chapter content

use serde::{Deserialize, Serialize};

/// Structured content of one chapter, as returned by the content generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterContent {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub sections: Vec<ContentSection>,
    #[serde(default)]
    pub vocabulary: Vec<VocabularyEntry>,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSection {
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub term: String,
    #[serde(default)]
    pub reading: String,
    pub meaning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

impl ChapterContent {
    /// Word count over summary, section bodies and exercises.
    pub fn word_count(&self) -> u32 {
        let mut total = count_words(&self.summary);
        for section in &self.sections {
            total += count_words(&section.heading) + count_words(&section.body);
        }
        for exercise in &self.exercises {
            total += count_words(&exercise.question) + count_words(&exercise.answer);
        }
        total
    }
}

/// Output of one successful generator call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedChapter {
    pub content: ChapterContent,
    pub tokens_used: u64,
    pub model: String,
}

/// Counts words in mixed Japanese/Latin text.
///
/// Each kana or kanji counts as one unit; runs of other non-whitespace
/// characters count as one word.
pub fn count_words(text: &str) -> u32 {
    let mut count = 0;
    let mut in_word = false;
    for c in text.chars() {
        if is_cjk(c) {
            count += 1;
            in_word = false;
        } else if c.is_whitespace() || is_cjk_punctuation(c) {
            in_word = false;
        } else if !in_word {
            count += 1;
            in_word = true;
        }
    }
    count
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{309F}' // hiragana
        | '\u{30A0}'..='\u{30FF}' // katakana
        | '\u{4E00}'..='\u{9FFF}' // CJK unified ideographs
        | '\u{3400}'..='\u{4DBF}')
}

fn is_cjk_punctuation(c: char) -> bool {
    matches!(c, '\u{3000}'..='\u{303F}' | '\u{FF01}'..='\u{FF0F}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_words_latin() {
        assert_eq!(count_words("wash your hands  before work"), 5);
        assert_eq!(count_words(""), 0);
    }

    #[test]
    fn test_count_words_japanese_counts_characters() {
        assert_eq!(count_words("手を洗う"), 4);
        assert_eq!(count_words("はい。 OK"), 3);
    }

    #[test]
    fn test_content_word_count_sums_parts() {
        let content = ChapterContent {
            title: "Hygiene".to_string(),
            summary: "one two".to_string(),
            sections: vec![ContentSection {
                heading: "Intro".to_string(),
                body: "three four five".to_string(),
            }],
            vocabulary: vec![],
            exercises: vec![Exercise {
                question: "why".to_string(),
                answer: "because".to_string(),
            }],
        };
        assert_eq!(content.word_count(), 8);
    }
}
