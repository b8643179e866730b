use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::OcrError;
use crate::types::{LabelSequence, LABEL_PAD};

/// Where the CTC blank sits among the class indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlankPosition {
    /// Blank is class 0, characters occupy `1..=n`.
    First,
    /// Blank is class `n`, characters occupy `0..n`.
    #[default]
    Last,
}

/// Fixed character set shared by label encoding and CTC decoding.
#[derive(Debug, Clone)]
pub struct Alphabet {
    chars: Vec<char>,
    index: HashMap<char, usize>,
    blank_position: BlankPosition,
}

impl Alphabet {
    pub const DEFAULT_LEXICON: &'static str = "0123456789abcdefghijklmnopqrstuvwxyz";

    pub fn new(
        chars: impl IntoIterator<Item = char>,
        blank_position: BlankPosition,
    ) -> Result<Self, OcrError> {
        let chars: Vec<char> = chars.into_iter().collect();
        let offset = match blank_position {
            BlankPosition::First => 1,
            BlankPosition::Last => 0,
        };
        let mut index = HashMap::with_capacity(chars.len());
        for (i, &c) in chars.iter().enumerate() {
            if index.insert(c, i + offset).is_some() {
                return Err(OcrError::invalid_input(format!(
                    "duplicate character {c:?} in alphabet"
                )));
            }
        }
        Ok(Self {
            chars,
            index,
            blank_position,
        })
    }

    pub fn default_lexicon(blank_position: BlankPosition) -> Result<Self, OcrError> {
        Self::new(Self::DEFAULT_LEXICON.chars(), blank_position)
    }

    /// Loads a lexicon file holding one character per line.
    ///
    /// Lines that are empty or hold more than one character are skipped.
    pub fn from_lexicon_file(path: &Path, blank_position: BlankPosition) -> Result<Self, OcrError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| OcrError::io(format!("read lexicon '{}'", path.display()), e))?;
        let chars = data.lines().filter_map(|line| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let mut it = line.chars();
            let c = it.next()?;
            if it.next().is_some() {
                tracing::debug!(line, "skipping multi-character lexicon entry");
                return None;
            }
            Some(c)
        });
        let alphabet = Self::new(chars, blank_position)?;
        if alphabet.is_empty() {
            return Err(OcrError::invalid_input(format!(
                "lexicon '{}' contains no characters",
                path.display()
            )));
        }
        Ok(alphabet)
    }

    pub fn blank(&self) -> usize {
        match self.blank_position {
            BlankPosition::First => 0,
            BlankPosition::Last => self.chars.len(),
        }
    }

    pub fn blank_position(&self) -> BlankPosition {
        self.blank_position
    }

    /// Character classes plus the blank.
    pub fn num_classes(&self) -> usize {
        self.chars.len() + 1
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn class_of(&self, c: char) -> Option<usize> {
        self.index.get(&c).copied()
    }

    /// `None` for the blank and for indices outside the alphabet.
    pub fn char_of(&self, class: usize) -> Option<char> {
        match self.blank_position {
            BlankPosition::First => class.checked_sub(1).and_then(|i| self.chars.get(i)),
            BlankPosition::Last => self.chars.get(class),
        }
        .copied()
    }

    /// Maps collapsed, blank-free class indices back to text.
    pub fn classes_to_text(&self, classes: &[usize]) -> Result<String, OcrError> {
        classes
            .iter()
            .map(|&class| {
                self.char_of(class).ok_or_else(|| {
                    OcrError::invalid_input(format!(
                        "class index {class} does not map to a character (alphabet has {} classes)",
                        self.num_classes()
                    ))
                })
            })
            .collect()
    }

    /// Encodes a transcription and pads it to `max_len` with [`LABEL_PAD`].
    ///
    /// Letters are folded to the alphabet's case when it only has one case.
    /// Labels longer than `max_len` are truncated.
    pub fn encode_label(&self, text: &str, max_len: usize) -> Result<LabelSequence, OcrError> {
        let normalized = self.normalize_case(text);
        let mut padded = Vec::with_capacity(max_len);
        for c in normalized.chars() {
            if padded.len() == max_len {
                break;
            }
            let class = self.class_of(c).ok_or_else(|| {
                OcrError::invalid_input(format!(
                    "character {c:?} in label {text:?} is not in the alphabet"
                ))
            })?;
            padded.push(class as i32);
        }
        let length = padded.len();
        padded.resize(max_len, LABEL_PAD);
        Ok(LabelSequence { padded, length })
    }

    /// Inverse of [`Alphabet::encode_label`]; padding and blanks are dropped.
    pub fn labels_to_text(&self, label: &LabelSequence) -> String {
        label.classes().filter_map(|class| self.char_of(class)).collect()
    }

    fn normalize_case(&self, text: &str) -> String {
        let mut has_upper = false;
        let mut has_lower = false;
        for c in self.chars.iter().filter(|c| c.is_alphabetic()) {
            if c.is_uppercase() {
                has_upper = true;
            }
            if c.is_lowercase() {
                has_lower = true;
            }
        }
        match (has_upper, has_lower) {
            (true, false) => text.to_uppercase(),
            (false, true) => text.to_lowercase(),
            _ => text.to_string(),
        }
    }
}
