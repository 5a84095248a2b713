//! Interviewer trait and built-in implementations for operator interaction.
//!
//! The executor asks exactly one question: whether to restart a pipeline
//! whose checkpoint says it already finished.

use std::io::Write;

use async_trait::async_trait;
use hana_types::{HanaError, Result};

#[derive(Debug, Clone)]
pub struct Question {
    pub prompt: String,
    pub choices: Vec<String>,
    pub default: Option<String>,
}

impl Question {
    /// A yes/no question answered with `y` or `n`.
    pub fn yes_no(prompt: impl Into<String>, default: Option<bool>) -> Self {
        Self {
            prompt: prompt.into(),
            choices: vec!["y".into(), "n".into()],
            default: default.map(|yes| if yes { "y".into() } else { "n".into() }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub choice: String,
    pub custom_text: Option<String>,
}

impl Answer {
    pub fn new(choice: impl Into<String>) -> Self {
        Self {
            choice: choice.into(),
            custom_text: None,
        }
    }

    /// True for `y`/`yes` in any case.
    pub fn is_yes(&self) -> bool {
        matches!(self.choice.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

#[async_trait]
pub trait Interviewer: Send + Sync {
    async fn ask(&self, question: &Question) -> Result<Answer>;
}

// ---------------------------------------------------------------------------
// AutoApproveInterviewer
// ---------------------------------------------------------------------------

/// Answers with the question's default, or its first choice.
pub struct AutoApproveInterviewer;

#[async_trait]
impl Interviewer for AutoApproveInterviewer {
    async fn ask(&self, question: &Question) -> Result<Answer> {
        let choice = question
            .default
            .clone()
            .or_else(|| question.choices.first().cloned())
            .unwrap_or_default();
        Ok(Answer::new(choice))
    }
}

// ---------------------------------------------------------------------------
// ConsoleInterviewer
// ---------------------------------------------------------------------------

pub struct ConsoleInterviewer;

#[async_trait]
impl Interviewer for ConsoleInterviewer {
    async fn ask(&self, question: &Question) -> Result<Answer> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{} [{}] ", question.prompt, question.choices.join("/"))
            .and_then(|_| stdout.flush())
            .map_err(HanaError::Io)?;

        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(HanaError::Io)?;
        let trimmed = input.trim();
        if trimmed.is_empty() {
            if let Some(default) = &question.default {
                return Ok(Answer::new(default.clone()));
            }
        }
        if let Some(choice) = question
            .choices
            .iter()
            .find(|c| c.eq_ignore_ascii_case(trimmed))
        {
            return Ok(Answer::new(choice.clone()));
        }
        Ok(Answer {
            choice: trimmed.to_string(),
            custom_text: Some(trimmed.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingInterviewer
// ---------------------------------------------------------------------------

/// Replays scripted answers in order and records every question asked.
pub struct RecordingInterviewer {
    answers: std::sync::Mutex<Vec<Answer>>,
    questions: std::sync::Mutex<Vec<Question>>,
}

impl RecordingInterviewer {
    pub fn new(answers: Vec<Answer>) -> Self {
        let mut reversed = answers;
        reversed.reverse();
        Self {
            answers: std::sync::Mutex::new(reversed),
            questions: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<Question> {
        self.questions
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Interviewer for RecordingInterviewer {
    async fn ask(&self, question: &Question) -> Result<Answer> {
        if let Ok(mut questions) = self.questions.lock() {
            questions.push(question.clone());
        }
        let scripted = self.answers.lock().ok().and_then(|mut a| a.pop());
        Ok(scripted.unwrap_or_else(|| {
            Answer::new(question.choices.first().cloned().unwrap_or_default())
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auto_approve_picks_first_choice() {
        let question = Question::yes_no("Restart?", None);
        let answer = AutoApproveInterviewer.ask(&question).await.unwrap();
        assert_eq!(answer.choice, "y");
        assert!(answer.is_yes());
        assert!(answer.custom_text.is_none());
    }

    #[tokio::test]
    async fn auto_approve_picks_default_when_set() {
        let question = Question::yes_no("Restart?", Some(false));
        let answer = AutoApproveInterviewer.ask(&question).await.unwrap();
        assert_eq!(answer.choice, "n");
        assert!(!answer.is_yes());
    }

    #[tokio::test]
    async fn recording_replays_in_order_and_records() {
        let interviewer = RecordingInterviewer::new(vec![Answer::new("n"), Answer::new("YES")]);
        let q = Question::yes_no("Restart?", None);

        assert!(!interviewer.ask(&q).await.unwrap().is_yes());
        assert!(interviewer.ask(&q).await.unwrap().is_yes());
        // exhausted: falls back to the first choice
        assert_eq!(interviewer.ask(&q).await.unwrap().choice, "y");

        let asked = interviewer.questions();
        assert_eq!(asked.len(), 3);
        assert_eq!(asked[0].prompt, "Restart?");
    }

    #[test]
    fn yes_no_question_shape() {
        let q = Question::yes_no("Pipeline complete, restart?", Some(true));
        assert_eq!(q.choices, vec!["y", "n"]);
        assert_eq!(q.default.as_deref(), Some("y"));
    }
}
