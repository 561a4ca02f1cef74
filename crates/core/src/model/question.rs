use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{AnswerId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("unknown section: {0}")]
    UnknownSection(String),

    #[error("unknown question type: {0}")]
    UnknownType(String),

    #[error("question needs at least two options, got {got}")]
    TooFewOptions { got: usize },

    #[error("single-choice question must have exactly one correct option, got {got}")]
    SingleChoiceCorrectCount { got: usize },

    #[error("multi-choice question must have at least two correct options, got {got}")]
    MultiChoiceCorrectCount { got: usize },
}

//
// ─── SECTION ───────────────────────────────────────────────────────────────────
//

/// One of the four fixed question categories an exam draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Objects,
    Classes,
    Builtins,
    #[serde(rename = "advfunc")]
    AdvFunc,
}

impl Section {
    /// All sections, in the canonical reporting order.
    pub const ALL: [Section; 4] = [
        Section::Objects,
        Section::Classes,
        Section::Builtins,
        Section::AdvFunc,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Objects => "objects",
            Section::Classes => "classes",
            Section::Builtins => "builtins",
            Section::AdvFunc => "advfunc",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "objects" => Ok(Section::Objects),
            "classes" => Ok(Section::Classes),
            "builtins" => Ok(Section::Builtins),
            "advfunc" => Ok(Section::AdvFunc),
            other => Err(QuestionError::UnknownSection(other.to_owned())),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Whether a question has exactly one correct option or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Single,
    Multi,
}

impl QuestionType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Single => "single",
            QuestionType::Multi => "multi",
        }
    }
}

impl FromStr for QuestionType {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(QuestionType::Single),
            "multi" => Ok(QuestionType::Multi),
            other => Err(QuestionError::UnknownType(other.to_owned())),
        }
    }
}

/// A question from the bank. Read-mostly; the engine never mutates these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: QuestionId,
    pub section: Section,
    pub qtype: QuestionType,
    pub text: String,
    pub code_snippet: Option<String>,
    pub explanation: Option<String>,
    pub is_active: bool,
}

/// One answer option of a question, with its correctness flag and a stable
/// ordering index for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    pub id: AnswerId,
    pub question_id: QuestionId,
    pub text: String,
    pub is_correct: bool,
    pub order_index: u32,
}

impl Question {
    /// Checks the bank invariant for this question against its options:
    /// at least two options, exactly one correct for `single`, two or more
    /// correct for `multi`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` describing the violated invariant.
    pub fn validate_options(&self, options: &[AnswerOption]) -> Result<(), QuestionError> {
        if options.len() < 2 {
            return Err(QuestionError::TooFewOptions { got: options.len() });
        }
        let correct = options.iter().filter(|o| o.is_correct).count();
        match self.qtype {
            QuestionType::Single if correct != 1 => {
                Err(QuestionError::SingleChoiceCorrectCount { got: correct })
            }
            QuestionType::Multi if correct < 2 => {
                Err(QuestionError::MultiChoiceCorrectCount { got: correct })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(id: i64, correct: bool) -> AnswerOption {
        AnswerOption {
            id: AnswerId::new(id),
            question_id: QuestionId::new(1),
            text: format!("option {id}"),
            is_correct: correct,
            order_index: u32::try_from(id).unwrap(),
        }
    }

    fn question(qtype: QuestionType) -> Question {
        Question {
            id: QuestionId::new(1),
            section: Section::Objects,
            qtype,
            text: "What does `this` refer to?".into(),
            code_snippet: None,
            explanation: None,
            is_active: true,
        }
    }

    #[test]
    fn section_roundtrip() {
        for section in Section::ALL {
            assert_eq!(section.as_str().parse::<Section>().unwrap(), section);
        }
    }

    #[test]
    fn single_choice_requires_exactly_one_correct() {
        let q = question(QuestionType::Single);
        assert!(q.validate_options(&[option(1, true), option(2, false)]).is_ok());
        assert_eq!(
            q.validate_options(&[option(1, true), option(2, true)]),
            Err(QuestionError::SingleChoiceCorrectCount { got: 2 })
        );
    }

    #[test]
    fn multi_choice_requires_two_correct() {
        let q = question(QuestionType::Multi);
        assert!(
            q.validate_options(&[option(1, true), option(2, true), option(3, false)])
                .is_ok()
        );
        assert_eq!(
            q.validate_options(&[option(1, true), option(2, false)]),
            Err(QuestionError::MultiChoiceCorrectCount { got: 1 })
        );
    }

    #[test]
    fn two_options_minimum() {
        let q = question(QuestionType::Single);
        assert_eq!(
            q.validate_options(&[option(1, true)]),
            Err(QuestionError::TooFewOptions { got: 1 })
        );
    }
}
