use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Languages a quiz can be generated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en", alias = "EN")]
    En,
    #[serde(rename = "bg", alias = "BG")]
    Bg,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Bg => "bg",
        }
    }

    /// Literal separating the question block from the answer key in model output.
    /// It is also the heading of the answer-key page.
    pub fn answer_key_delimiter(&self) -> &'static str {
        match self {
            Language::En => "Answer Key:",
            Language::Bg => "Ключ за отговори:",
        }
    }

    pub fn title_prefix(&self) -> &'static str {
        match self {
            Language::En => "Quiz Title: ",
            Language::Bg => "Заглавие на теста: ",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "bg" => Ok(Language::Bg),
            other => Err(format!("Unknown language code: {}", other)),
        }
    }
}
