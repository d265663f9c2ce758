use serde::{Deserialize, Serialize};

use crate::model::quiz::AnswerValue;

/// Commands clients emit over the session socket. Event names on the wire
/// match the web client exactly (`startQuiz`, `submitAnswer`, ...).
///
/// Every command carries its sessionId; host commands additionally carry
/// the adminId they claim to act as, which is checked against the session's
/// host before anything mutates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ClientMessage {
    /// Idempotent join, re-sent by clients on every (re)connect. A userId
    /// equal to the session's host id attaches the host channel.
    #[serde(rename_all = "camelCase")]
    JoinSession {
        session_id: String,
        user_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        avatar: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    StartQuiz { session_id: String, admin_id: String },

    #[serde(rename_all = "camelCase")]
    StartQuizCountdown {
        session_id: String,
        admin_id: String,
        countdown: u32,
    },

    #[serde(rename_all = "camelCase")]
    StopQuizCountdown { session_id: String, admin_id: String },

    #[serde(rename_all = "camelCase")]
    PauseQuiz { session_id: String, admin_id: String },

    #[serde(rename_all = "camelCase")]
    ResumeQuiz { session_id: String, admin_id: String },

    #[serde(rename_all = "camelCase")]
    NextQuestion {
        session_id: String,
        admin_id: String,
        question_index: usize,
    },

    #[serde(rename_all = "camelCase")]
    RestartQuestion {
        session_id: String,
        admin_id: String,
        question_id: String,
    },

    #[serde(rename_all = "camelCase")]
    SkipQuestion { session_id: String, admin_id: String },

    #[serde(rename_all = "camelCase")]
    EndQuiz { session_id: String, admin_id: String },

    #[serde(rename_all = "camelCase")]
    RemoveParticipant {
        session_id: String,
        admin_id: String,
        user_id: String,
    },

    #[serde(rename_all = "camelCase")]
    SubmitAnswer {
        session_id: String,
        user_id: String,
        question_id: String,
        selected_option: Option<AnswerValue>,
    },

    #[serde(rename = "leave-quiz", rename_all = "camelCase")]
    LeaveQuiz { session_id: String, user_id: String },
}

impl ClientMessage {
    pub fn session_id(&self) -> &str {
        match self {
            ClientMessage::JoinSession { session_id, .. }
            | ClientMessage::StartQuiz { session_id, .. }
            | ClientMessage::StartQuizCountdown { session_id, .. }
            | ClientMessage::StopQuizCountdown { session_id, .. }
            | ClientMessage::PauseQuiz { session_id, .. }
            | ClientMessage::ResumeQuiz { session_id, .. }
            | ClientMessage::NextQuestion { session_id, .. }
            | ClientMessage::RestartQuestion { session_id, .. }
            | ClientMessage::SkipQuestion { session_id, .. }
            | ClientMessage::EndQuiz { session_id, .. }
            | ClientMessage::RemoveParticipant { session_id, .. }
            | ClientMessage::SubmitAnswer { session_id, .. }
            | ClientMessage::LeaveQuiz { session_id, .. } => session_id,
        }
    }

    /// The adminId a host command claims to act as.
    pub fn admin_id(&self) -> Option<&str> {
        match self {
            ClientMessage::StartQuiz { admin_id, .. }
            | ClientMessage::StartQuizCountdown { admin_id, .. }
            | ClientMessage::StopQuizCountdown { admin_id, .. }
            | ClientMessage::PauseQuiz { admin_id, .. }
            | ClientMessage::ResumeQuiz { admin_id, .. }
            | ClientMessage::NextQuestion { admin_id, .. }
            | ClientMessage::RestartQuestion { admin_id, .. }
            | ClientMessage::SkipQuestion { admin_id, .. }
            | ClientMessage::EndQuiz { admin_id, .. }
            | ClientMessage::RemoveParticipant { admin_id, .. } => Some(admin_id),
            _ => None,
        }
    }

    /// Host-issued commands require the sender to own the host channel.
    pub fn is_host_command(&self) -> bool {
        matches!(
            self,
            ClientMessage::StartQuiz { .. }
                | ClientMessage::StartQuizCountdown { .. }
                | ClientMessage::StopQuizCountdown { .. }
                | ClientMessage::PauseQuiz { .. }
                | ClientMessage::ResumeQuiz { .. }
                | ClientMessage::NextQuestion { .. }
                | ClientMessage::RestartQuestion { .. }
                | ClientMessage::SkipQuestion { .. }
                | ClientMessage::EndQuiz { .. }
                | ClientMessage::RemoveParticipant { .. }
        )
    }
}
