pub mod parser;

pub use parser::parse_vocabulary;

pub const NO_TRANSCRIPTION: &str = "[-]";

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VocabularyEntry {
    pub word: String,
    pub transcription: String,
    pub translation: String,
    pub example_en: String,
    pub example_ru: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VocabularySet {
    pub topic: String,
    pub entries: Vec<VocabularyEntry>,
}

impl VocabularySet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
