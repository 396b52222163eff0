//! Bidirectional word/id index built from the dump's word blob.

use crate::WordId;
use ahash::{AHashMap, AHashSet};

/// Case folding applied to every word at load time and to every query word.
pub fn fold(word: &str) -> String {
    word.to_lowercase()
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Surface spelling for each id, original casing.
    words: Vec<String>,
    /// Folded spelling to id.
    ids: AHashMap<String, WordId>,
    surface: AHashSet<String>,
    sentence_start: Option<WordId>,
    sentence_end: Option<WordId>,
}

impl Vocabulary {
    /// Indexes `words` by position.
    ///
    /// Folded collisions resolve to the highest id. The sentence markers are
    /// matched against the original, unfolded spelling.
    pub fn build(words: Vec<String>, sentence_start: &str, sentence_end: &str) -> Self {
        let mut ids = AHashMap::with_capacity(words.len());
        let mut start_id = None;
        let mut end_id = None;

        for (id, word) in words.iter().enumerate() {
            let id = id as WordId;
            if word == sentence_start {
                start_id = Some(id);
            } else if word == sentence_end {
                end_id = Some(id);
            }
            if let Some(previous) = ids.insert(fold(word), id) {
                tracing::warn!(word = %word, previous, id, "duplicate folded word, keeping last id");
            }
        }

        if start_id.is_none() {
            tracing::warn!(marker = sentence_start, "sentence start marker not in vocabulary");
        }
        if end_id.is_none() {
            tracing::warn!(marker = sentence_end, "sentence end marker not in vocabulary");
        }

        let surface = words.iter().cloned().collect();
        Self {
            words,
            ids,
            surface,
            sentence_start: start_id,
            sentence_end: end_id,
        }
    }

    /// Case-insensitive lookup.
    pub fn id(&self, word: &str) -> Option<WordId> {
        self.ids.get(&fold(word)).copied()
    }

    pub fn word(&self, id: WordId) -> Option<&str> {
        self.words.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Every surface word in the model.
    pub fn words(&self) -> &AHashSet<String> {
        &self.surface
    }

    pub fn sentence_start(&self) -> Option<WordId> {
        self.sentence_start
    }

    pub fn sentence_end(&self) -> Option<WordId> {
        self.sentence_end
    }
}
