use serde::{Deserialize, Serialize};
use uuid::Uuid;

// === Answer values ===
// What a participant submits (and what answerFeedback echoes back as the
// correct answer): an option index, a boolean, or free text, depending on
// the question type. `null` means the client auto-submitted at local zero.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Index(usize),
    Flag(bool),
    Text(String),
}

// === Question options ===
// Multiple-choice options are either plain strings or media objects of the
// shape {type: "image", url, description}.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaOption {
    #[serde(rename = "type")]
    pub media: MediaKind,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerOption {
    Media(MediaOption),
    Text(String),
}

impl AnswerOption {
    fn is_empty(&self) -> bool {
        match self {
            AnswerOption::Text(text) => text.trim().is_empty(),
            AnswerOption::Media(media) => media.url.trim().is_empty(),
        }
    }
}

// === Question content ===
// Ordered supplementary items shown alongside the prompt.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ContentItem {
    Text { text: String },
    Image { url: String },
    Audio { url: String },
    Video { url: String },
}

// === Question ===
// Discriminated by `type`; the kind carries the correct answer (and the
// options, for multiple-choice).

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum QuestionKind {
    #[serde(rename_all = "camelCase")]
    MultipleChoice {
        options: Vec<AnswerOption>,
        correct_answer: usize,
    },
    #[serde(rename_all = "camelCase")]
    TrueFalse { correct_answer: bool },
    #[serde(rename_all = "camelCase")]
    ShortAnswer { correct_answer: String },
    #[serde(rename_all = "camelCase")]
    FillInTheBlank { correct_answer: String },
}

impl QuestionKind {
    pub fn correct_answer(&self) -> AnswerValue {
        match self {
            QuestionKind::MultipleChoice { correct_answer, .. } => {
                AnswerValue::Index(*correct_answer)
            }
            QuestionKind::TrueFalse { correct_answer } => AnswerValue::Flag(*correct_answer),
            QuestionKind::ShortAnswer { correct_answer }
            | QuestionKind::FillInTheBlank { correct_answer } => {
                AnswerValue::Text(correct_answer.clone())
            }
        }
    }

    /// Grade a submitted value against this question's key.
    /// Text answers compare case-insensitively after trimming.
    pub fn is_correct(&self, submitted: &AnswerValue) -> bool {
        match (self, submitted) {
            (QuestionKind::MultipleChoice { correct_answer, .. }, AnswerValue::Index(i)) => {
                i == correct_answer
            }
            (QuestionKind::TrueFalse { correct_answer }, AnswerValue::Flag(b)) => {
                b == correct_answer
            }
            (QuestionKind::ShortAnswer { correct_answer }, AnswerValue::Text(s))
            | (QuestionKind::FillInTheBlank { correct_answer }, AnswerValue::Text(s)) => {
                s.trim().eq_ignore_ascii_case(correct_answer.trim())
            }
            _ => false,
        }
    }
}

pub const DEFAULT_QUESTION_POINTS: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default = "new_id")]
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentItem>,
    #[serde(flatten)]
    pub kind: QuestionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
    #[serde(default = "default_points")]
    pub points: u32,
}

fn default_points() -> u32 {
    DEFAULT_QUESTION_POINTS
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl Question {
    /// Seconds participants get for this question.
    pub fn duration(&self, quiz_default: u32) -> u32 {
        self.time_limit.unwrap_or(quiz_default)
    }
}

// === Public question view ===
// What gets broadcast to the room: never the correct answer or the
// explanation. Those travel only inside answerFeedback.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<AnswerOption>,
    pub points: u32,
}

impl Question {
    pub fn public_view(&self) -> QuestionView {
        let (question_type, options) = match &self.kind {
            QuestionKind::MultipleChoice { options, .. } => {
                ("multiple-choice", options.clone())
            }
            QuestionKind::TrueFalse { .. } => ("true-false", Vec::new()),
            QuestionKind::ShortAnswer { .. } => ("short-answer", Vec::new()),
            QuestionKind::FillInTheBlank { .. } => ("fill-in-the-blank", Vec::new()),
        };
        QuestionView {
            id: self.id.clone(),
            text: self.text.clone(),
            question_type: question_type.to_string(),
            content: self.content.clone(),
            options,
            points: self.points,
        }
    }
}

// === Quiz settings ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSettings {
    pub seconds_per_question: u32,
    pub max_attempts: u32,
    pub randomize_questions: bool,
    pub show_feedback: bool,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            seconds_per_question: 30,
            max_attempts: 1,
            randomize_questions: false,
            show_feedback: true,
        }
    }
}

// === Quiz ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    #[serde(default = "new_id")]
    pub id: String,
    pub host_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: String,
    pub difficulty: Difficulty,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub settings: QuizSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub published: bool,
}

impl Quiz {
    /// Validate a draft for publishing. Returns every problem found so the
    /// editor can surface them all at once.
    pub fn validate_for_publish(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.title.trim().is_empty() {
            problems.push("quiz title must not be empty".to_string());
        }
        if self.questions.is_empty() {
            problems.push("quiz must contain at least one question".to_string());
        }

        for (i, question) in self.questions.iter().enumerate() {
            let n = i + 1;
            if question.text.trim().is_empty() {
                problems.push(format!("question {n}: text must not be empty"));
            }
            if question.duration(self.settings.seconds_per_question) == 0 {
                problems.push(format!("question {n}: time limit must be at least 1 second"));
            }
            match &question.kind {
                QuestionKind::MultipleChoice {
                    options,
                    correct_answer,
                } => {
                    if options.is_empty() {
                        problems.push(format!("question {n}: needs at least one option"));
                    } else if *correct_answer >= options.len() {
                        problems.push(format!(
                            "question {n}: correctAnswer {correct_answer} is out of range for {} options",
                            options.len()
                        ));
                    }
                    for (j, option) in options.iter().enumerate() {
                        if option.is_empty() {
                            problems.push(format!("question {n}: option {} is empty", j + 1));
                        }
                    }
                }
                QuestionKind::ShortAnswer { correct_answer }
                | QuestionKind::FillInTheBlank { correct_answer } => {
                    if correct_answer.trim().is_empty() {
                        problems.push(format!("question {n}: correctAnswer must not be empty"));
                    }
                }
                QuestionKind::TrueFalse { .. } => {}
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}
