use log::{debug, error};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::model::quiz::{AnswerValue, QuestionView};
use crate::model::session::{LeaderboardEntry, ParticipantView, SubmittedAnswer};
use crate::server::Tx;

/// Structured error classification. Clients match on `kind`, never on
/// message wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    SessionNotFound,
    QuizNotFound,
    NotHost,
    InvalidCommand,
    InvalidQuestionIndex,
    EmptyLobby,
    NotStarted,
    AlreadyAnswered,
    SubmissionsClosed,
    ParticipantNotFound,
    AlreadyExists,
    Validation,
    Parse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeaveReason {
    Left,
    Disconnected,
    Removed,
}

/// Events the server pushes to the room. Wire names match what the web
/// client listens for (`quizStarted`, `leaderboardUpdate`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    ParticipantJoined {
        participant: ParticipantView,
        participants: Vec<ParticipantView>,
    },

    #[serde(rename_all = "camelCase")]
    ParticipantLeft {
        user_id: String,
        reason: LeaveReason,
        participants: Vec<ParticipantView>,
    },

    #[serde(rename_all = "camelCase")]
    CountdownStarted { countdown: u32 },

    CountdownStopped,

    #[serde(rename_all = "camelCase")]
    CountdownUpdated { countdown: u32 },

    #[serde(rename_all = "camelCase")]
    QuizStarted {
        question: QuestionView,
        index: usize,
        countdown: u32,
    },

    #[serde(rename_all = "camelCase")]
    QuizPaused { countdown: u32 },

    #[serde(rename_all = "camelCase")]
    QuizResumed { countdown: u32 },

    #[serde(rename_all = "camelCase")]
    NextQuestion {
        question: QuestionView,
        index: usize,
        countdown: u32,
    },

    #[serde(rename_all = "camelCase")]
    AnswerFeedback {
        is_correct: bool,
        correct_answer: AnswerValue,
        #[serde(skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
        points: u32,
        time_taken: u32,
        selected_option: Option<AnswerValue>,
    },

    #[serde(rename_all = "camelCase")]
    AllAnswersSubmitted { answers: Vec<SubmittedAnswer> },

    #[serde(rename_all = "camelCase")]
    LeaderboardUpdate { leaderboard: Vec<LeaderboardEntry> },

    #[serde(rename_all = "camelCase")]
    AllQuestionsCompleted { reason: String },

    #[serde(rename_all = "camelCase")]
    SessionEnded { reason: String },

    #[serde(rename_all = "camelCase")]
    Removed { message: String },

    #[serde(rename_all = "camelCase")]
    Error { kind: ErrorKind, message: String },
}

impl ServerMessage {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            kind,
            message: message.into(),
        }
    }
}

pub fn send_msg(tx: &Tx, msg: ServerMessage) {
    debug!("Sending server message: {msg:?}");
    let msg = serde_json::to_string(&msg)
        .unwrap_or_else(|e| format!("Failed to serialize outgoing event: {e}"));
    tx.send(Message::text(&msg)).unwrap_or_else(|e| {
        error!("Delivery channel rejected outgoing event: {e}");
        error!("Undelivered event: {msg}");
    })
}
