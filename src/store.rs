use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::model::quiz::{Quiz, new_id};
use crate::model::session::{LeaderboardEntry, LiveSession};

// === Archived results ===
// Written once per session, when it completes or the host ends it. The
// analytics endpoints read these; live state never leaves the session map.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStat {
    pub question_id: String,
    pub index: usize,
    pub text: String,
    pub answers_count: usize,
    pub correct_count: usize,
    pub average_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub session_id: String,
    pub code: String,
    pub quiz_id: String,
    pub quiz_title: String,
    pub host_id: String,
    pub reason: String,
    pub ended_at: DateTime<Utc>,
    pub participants_count: usize,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub question_stats: Vec<QuestionStat>,
}

impl SessionResult {
    pub fn from_session(session: &LiveSession, reason: &str) -> Self {
        let asked = session.current_index.map(|i| i + 1).unwrap_or(0);
        let question_stats = (0..asked)
            .filter_map(|index| {
                let question = session.question_at(index)?;
                let records: Vec<_> = session
                    .participants
                    .iter()
                    .filter_map(|p| p.answers.get(&index))
                    .collect();
                let answers_count = records.len();
                let correct_count = records.iter().filter(|r| r.is_correct).count();
                let total_time: u32 = records.iter().map(|r| r.time_taken).sum();
                Some(QuestionStat {
                    question_id: question.id.clone(),
                    index,
                    text: question.text.clone(),
                    answers_count,
                    correct_count,
                    average_time: if answers_count == 0 {
                        0.0
                    } else {
                        total_time as f64 / answers_count as f64
                    },
                })
            })
            .collect();

        Self {
            session_id: session.session_id.clone(),
            code: session.code.clone(),
            quiz_id: session.quiz.id.clone(),
            quiz_title: session.quiz.title.clone(),
            host_id: session.host_id.clone(),
            reason: reason.to_string(),
            ended_at: Utc::now(),
            participants_count: session.participants.len(),
            leaderboard: session.leaderboard(),
            question_stats,
        }
    }
}

// === Feedback & schedules ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub session_id: String,
    pub user_id: String,
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSession {
    pub id: String,
    pub quiz_id: String,
    pub host_id: String,
    pub start_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// === Store ===
// In-memory document store behind a single lock. Quizzes are the editor's
// documents; results, feedback and schedules accumulate over the server's
// lifetime.

#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    quizzes: HashMap<String, Quiz>,
    results: Vec<SessionResult>,
    feedback: Vec<Feedback>,
    schedules: Vec<ScheduledSession>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // --- quizzes ---

    pub async fn insert_quiz(&self, quiz: Quiz) {
        self.inner.lock().await.quizzes.insert(quiz.id.clone(), quiz);
    }

    pub async fn get_quiz(&self, id: &str) -> Option<Quiz> {
        self.inner.lock().await.quizzes.get(id).cloned()
    }

    pub async fn list_quizzes(&self, host_id: Option<&str>) -> Vec<Quiz> {
        let inner = self.inner.lock().await;
        let mut quizzes: Vec<Quiz> = inner
            .quizzes
            .values()
            .filter(|q| host_id.is_none_or(|h| q.host_id == h))
            .cloned()
            .collect();
        quizzes.sort_by(|a, b| a.title.cmp(&b.title));
        quizzes
    }

    /// Replace an existing quiz document. Returns false when the id is
    /// unknown.
    pub async fn update_quiz(&self, id: &str, mut quiz: Quiz) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.quizzes.contains_key(id) {
            return false;
        }
        quiz.id = id.to_string();
        inner.quizzes.insert(id.to_string(), quiz);
        true
    }

    pub async fn delete_quiz(&self, id: &str) -> bool {
        self.inner.lock().await.quizzes.remove(id).is_some()
    }

    pub async fn mark_published(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.quizzes.get_mut(id) {
            Some(quiz) => {
                quiz.published = true;
                true
            }
            None => false,
        }
    }

    // --- results ---

    pub async fn archive_result(&self, result: SessionResult) {
        self.inner.lock().await.results.push(result);
    }

    pub async fn list_results(&self, host_id: Option<&str>) -> Vec<SessionResult> {
        self.inner
            .lock()
            .await
            .results
            .iter()
            .filter(|r| host_id.is_none_or(|h| r.host_id == h))
            .cloned()
            .collect()
    }

    pub async fn result_for_session(&self, session_id: &str) -> Option<SessionResult> {
        self.inner
            .lock()
            .await
            .results
            .iter()
            .find(|r| r.session_id == session_id)
            .cloned()
    }

    // --- feedback ---

    /// At most one feedback entry per participant per session. Returns
    /// false on a duplicate.
    pub async fn add_feedback(&self, feedback: Feedback) -> bool {
        let mut inner = self.inner.lock().await;
        let duplicate = inner
            .feedback
            .iter()
            .any(|f| f.session_id == feedback.session_id && f.user_id == feedback.user_id);
        if duplicate {
            return false;
        }
        inner.feedback.push(feedback);
        true
    }

    pub async fn feedback_for_session(&self, session_id: &str) -> Vec<Feedback> {
        self.inner
            .lock()
            .await
            .feedback
            .iter()
            .filter(|f| f.session_id == session_id)
            .cloned()
            .collect()
    }

    // --- schedules ---

    pub async fn add_schedule(
        &self,
        quiz_id: String,
        host_id: String,
        start_at: DateTime<Utc>,
        note: Option<String>,
    ) -> ScheduledSession {
        let schedule = ScheduledSession {
            id: new_id(),
            quiz_id,
            host_id,
            start_at,
            note,
        };
        self.inner.lock().await.schedules.push(schedule.clone());
        schedule
    }

    pub async fn schedules_for_host(&self, host_id: &str) -> Vec<ScheduledSession> {
        let mut schedules: Vec<ScheduledSession> = self
            .inner
            .lock()
            .await
            .schedules
            .iter()
            .filter(|s| s.host_id == host_id)
            .cloned()
            .collect();
        schedules.sort_by_key(|s| s.start_at);
        schedules
    }
}
