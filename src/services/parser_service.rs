use crate::models::language::Language;
use crate::models::question_group::{ParsedQuiz, QuestionGroup};
use regex::Regex;
use std::sync::OnceLock;

pub const NO_ANSWER_PROVIDED: &str = "No answer provided";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("model response has no answer key section")]
    MissingAnswerKey,

    #[error("model response contains no recognizable questions")]
    NoQuestionsFound,
}

fn question_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(\d+\.\s+[^\n]+)\n\s*(A\.\s+[^\n]+)\n\s*(B\.\s+[^\n]+)\n\s*(C\.\s+[^\n]+)\n\s*(D\.\s+[^\n]+)\n?",
        )
        .expect("question pattern is valid")
    })
}

fn answer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)\.\s*([^\n]+)").expect("answer pattern is valid"))
}

/// Turns the model's free-text quiz into question groups.
///
/// The text is split at the last occurrence of the language's answer-key
/// delimiter. Answers are bound to questions by position in the answer key,
/// not by the number printed in front of them; questions beyond the end of the
/// answer key get [`NO_ANSWER_PROVIDED`].
pub fn parse_response(raw_text: &str, language: Language) -> Result<ParsedQuiz, ParseError> {
    let (question_block, answer_block) = raw_text
        .rsplit_once(language.answer_key_delimiter())
        .ok_or(ParseError::MissingAnswerKey)?;

    let answer_key = answer_block.trim();
    if answer_key.is_empty() {
        return Err(ParseError::MissingAnswerKey);
    }

    let answers = parse_answers(answer_key);
    let mut groups = Vec::new();

    for (idx, caps) in question_pattern()
        .captures_iter(question_block.trim())
        .enumerate()
    {
        let question = caps[1].trim().to_string();
        let options = [
            caps[2].trim().to_string(),
            caps[3].trim().to_string(),
            caps[4].trim().to_string(),
            caps[5].trim().to_string(),
        ];
        let answer = answers
            .get(idx)
            .cloned()
            .unwrap_or_else(|| NO_ANSWER_PROVIDED.to_string());

        groups.push(QuestionGroup::new(question, options, answer));
    }

    if groups.is_empty() {
        return Err(ParseError::NoQuestionsFound);
    }

    if answers.len() < groups.len() {
        tracing::warn!(
            questions = groups.len(),
            answers = answers.len(),
            "answer key shorter than question list"
        );
    }

    Ok(ParsedQuiz::new(groups, answer_key.to_string()))
}

fn parse_answers(answer_key: &str) -> Vec<String> {
    answer_pattern()
        .captures_iter(answer_key)
        .map(|caps| caps[2].trim().to_string())
        .collect()
}
