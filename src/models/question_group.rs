use serde::{Deserialize, Serialize};

/// One quiz question with its four options and resolved answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionGroup {
    question: String,
    options: [String; 4],
    answer: String,
}

impl QuestionGroup {
    pub(crate) fn new(question: String, options: [String; 4], answer: String) -> Self {
        Self {
            question,
            options,
            answer,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn options(&self) -> &[String; 4] {
        &self.options
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }
}

/// Question groups in presentation order plus the verbatim answer-key tail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuiz {
    question_groups: Vec<QuestionGroup>,
    answer_key_raw: String,
}

impl ParsedQuiz {
    pub(crate) fn new(question_groups: Vec<QuestionGroup>, answer_key_raw: String) -> Self {
        Self {
            question_groups,
            answer_key_raw,
        }
    }

    pub fn question_groups(&self) -> &[QuestionGroup] {
        &self.question_groups
    }

    pub fn answer_key_raw(&self) -> &str {
        &self.answer_key_raw
    }

    pub fn into_question_groups(self) -> Vec<QuestionGroup> {
        self.question_groups
    }
}
