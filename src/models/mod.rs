pub mod language;
pub mod question_group;
pub mod quiz;
