use crate::model::quiz::{AnswerValue, Question, Quiz};
use crate::model::server_message::{ServerMessage, send_msg};
use crate::server::Tx;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Lobby,
    Active,
    Paused,
    Ended,
}

// === Answer records ===
// One per participant per question, written exactly once. A `None`
// selection is the client's auto-submission at local zero (or the server
// filling in for a non-submitter at countdown expiry).

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub selected_option: Option<AnswerValue>,
    pub is_correct: bool,
    pub points: u32,
    pub time_taken: u32,
}

/// Why record_answer refused a submission. Mapped to a wire ErrorKind by
/// the participant handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    NotActive,
    WrongQuestion,
    AlreadyAnswered,
    SubmissionsClosed,
    NotParticipant,
}

// === Participants ===

#[derive(Debug)]
pub struct Participant {
    pub user_id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub score: u32,
    pub disconnected: bool,
    pub answers: HashMap<usize, AnswerRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub user_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub score: u32,
    pub disconnected: bool,
    pub answers_submitted: usize,
}

impl Participant {
    pub fn view(&self) -> ParticipantView {
        ParticipantView {
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            score: self.score,
            disconnected: self.disconnected,
            answers_submitted: self.answers.len(),
        }
    }
}

// === Wire projections ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub name: String,
    pub score: u32,
    /// Fraction of answered questions that were correct, 0.0–1.0.
    pub accuracy: f64,
    pub answers_count: usize,
    pub correct_answers: usize,
    /// Mean seconds per recorded answer.
    pub average_time: f64,
}

/// One row of the allAnswersSubmitted aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub user_id: String,
    pub name: String,
    pub selected_option: Option<AnswerValue>,
    pub is_correct: bool,
    pub points: u32,
    pub time_taken: u32,
}

/// REST projection of a session document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: String,
    pub code: String,
    pub quiz_id: String,
    pub quiz_title: String,
    pub host_id: String,
    pub status: SessionStatus,
    pub current_question: CurrentQuestion,
    pub participants: Vec<ParticipantView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentQuestion {
    pub index: Option<usize>,
}

/// Correct answer earns the question's points plus a speed bonus:
/// half the points, scaled by how much of the countdown was left.
/// Points and time limits are quiz-author input, so the bonus is
/// computed in u64 and the total saturates.
pub fn score_answer(points: u32, remaining: u32, duration: u32) -> u32 {
    if duration == 0 {
        return points;
    }
    let bonus = u64::from(points) * u64::from(remaining) / (u64::from(duration) * 2);
    points.saturating_add(u32::try_from(bonus).unwrap_or(u32::MAX))
}

// === Live session ===
// The authoritative session document plus the room's channels and the
// countdown bookkeeping. Everything here is mutated under the sessions
// lock; broadcasts happen through the stored senders.

pub struct LiveSession {
    pub session_id: String,
    pub code: String,
    pub quiz: Quiz,
    pub host_id: String,
    pub status: SessionStatus,
    /// Presentation order: indexes into quiz.questions, shuffled when the
    /// quiz asks for randomization.
    pub order: Vec<usize>,
    pub current_index: Option<usize>,
    /// Whether the current question still accepts submissions.
    pub question_open: bool,
    pub countdown_remaining: Option<u32>,
    pub countdown_running: bool,
    pub countdown_task: Option<AbortHandle>,
    pub lobby_countdown_remaining: Option<u32>,
    pub lobby_countdown_task: Option<AbortHandle>,
    pub host_tx: Option<Tx>,
    pub participant_txs: HashMap<String, Tx>,
    pub participants: Vec<Participant>,
    /// Set once the session's results have been written to the store, so
    /// completion followed by an explicit endQuiz doesn't archive twice.
    pub archived: bool,
}

impl LiveSession {
    pub fn new(session_id: String, code: String, quiz: Quiz, host_id: String) -> Self {
        let mut order: Vec<usize> = (0..quiz.questions.len()).collect();
        if quiz.settings.randomize_questions {
            order.shuffle(&mut rand::rng());
        }
        Self {
            session_id,
            code,
            quiz,
            host_id,
            status: SessionStatus::Lobby,
            order,
            current_index: None,
            question_open: false,
            countdown_remaining: None,
            countdown_running: false,
            countdown_task: None,
            lobby_countdown_remaining: None,
            lobby_countdown_task: None,
            host_tx: None,
            participant_txs: HashMap::new(),
            participants: Vec::new(),
            archived: false,
        }
    }

    pub fn question_count(&self) -> usize {
        self.order.len()
    }

    pub fn question_at(&self, index: usize) -> Option<&Question> {
        self.order
            .get(index)
            .and_then(|&i| self.quiz.questions.get(i))
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current_index.and_then(|i| self.question_at(i))
    }

    pub fn current_duration(&self) -> u32 {
        self.current_question()
            .map(|q| q.duration(self.quiz.settings.seconds_per_question))
            .unwrap_or(self.quiz.settings.seconds_per_question)
    }

    // --- roster ---

    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    /// Idempotent join: a known userId reconnects (score and answers kept),
    /// an unknown one is appended to the roster. Returns true on rejoin.
    pub fn join_participant(
        &mut self,
        user_id: &str,
        name: String,
        avatar: Option<String>,
        tx: Tx,
    ) -> bool {
        self.participant_txs.insert(user_id.to_string(), tx);
        if let Some(existing) = self.participant_mut(user_id) {
            existing.disconnected = false;
            true
        } else {
            self.participants.push(Participant {
                user_id: user_id.to_string(),
                name,
                avatar,
                score: 0,
                disconnected: false,
                answers: HashMap::new(),
            });
            false
        }
    }

    pub fn mark_disconnected(&mut self, user_id: &str) {
        self.participant_txs.remove(user_id);
        if let Some(participant) = self.participant_mut(user_id) {
            participant.disconnected = true;
        }
    }

    /// Drop a participant entirely (voluntary leave or host eviction).
    /// Returns their sender so the caller can deliver a final message.
    pub fn remove_participant(&mut self, user_id: &str) -> Option<Tx> {
        self.participants.retain(|p| p.user_id != user_id);
        self.participant_txs.remove(user_id)
    }

    pub fn connected_participants(&self) -> usize {
        self.participants.iter().filter(|p| !p.disconnected).count()
    }

    // --- answers ---

    /// Record a participant's answer for the current question. Enforces the
    /// at-most-one invariant and the submissions-open window; grades and
    /// scores against the authoritative countdown.
    pub fn record_answer(
        &mut self,
        user_id: &str,
        question_id: &str,
        selected: Option<AnswerValue>,
    ) -> Result<AnswerRecord, SubmitError> {
        if self.status != SessionStatus::Active {
            return Err(SubmitError::NotActive);
        }
        if !self.question_open {
            return Err(SubmitError::SubmissionsClosed);
        }
        let Some(index) = self.current_index else {
            return Err(SubmitError::NotActive);
        };
        let duration = self.current_duration();
        let remaining = self.countdown_remaining.unwrap_or(0);
        let question = match self.question_at(index) {
            Some(q) if q.id == question_id => q,
            _ => return Err(SubmitError::WrongQuestion),
        };

        let is_correct = selected
            .as_ref()
            .map(|value| question.kind.is_correct(value))
            .unwrap_or(false);
        let points = if is_correct {
            score_answer(question.points, remaining, duration)
        } else {
            0
        };
        let record = AnswerRecord {
            selected_option: selected,
            is_correct,
            points,
            time_taken: duration.saturating_sub(remaining),
        };

        let Some(participant) = self.participant_mut(user_id) else {
            return Err(SubmitError::NotParticipant);
        };
        if participant.answers.contains_key(&index) {
            return Err(SubmitError::AlreadyAnswered);
        }
        participant.score += record.points;
        participant.answers.insert(index, record.clone());
        Ok(record)
    }

    /// True once every connected participant has answered the current
    /// question; triggers early resolution.
    pub fn all_connected_answered(&self) -> bool {
        let Some(index) = self.current_index else {
            return false;
        };
        self.participants
            .iter()
            .filter(|p| !p.disconnected)
            .all(|p| p.answers.contains_key(&index))
    }

    /// Close the current question: non-submitters get a null record, and
    /// the per-question aggregate is returned for broadcast.
    pub fn resolve_current_question(&mut self) -> Vec<SubmittedAnswer> {
        let Some(index) = self.current_index else {
            return Vec::new();
        };
        let duration = self.current_duration();
        self.question_open = false;
        self.countdown_running = false;
        if let Some(handle) = self.countdown_task.take() {
            handle.abort();
        }

        for participant in &mut self.participants {
            participant.answers.entry(index).or_insert(AnswerRecord {
                selected_option: None,
                is_correct: false,
                points: 0,
                time_taken: duration,
            });
        }

        self.participants
            .iter()
            .map(|p| {
                let record = &p.answers[&index];
                SubmittedAnswer {
                    user_id: p.user_id.clone(),
                    name: p.name.clone(),
                    selected_option: record.selected_option.clone(),
                    is_correct: record.is_correct,
                    points: record.points,
                    time_taken: record.time_taken,
                }
            })
            .collect()
    }

    /// Clear the current question's answers so it can be replayed after a
    /// host restartQuestion.
    pub fn clear_current_answers(&mut self) {
        let Some(index) = self.current_index else {
            return;
        };
        for participant in &mut self.participants {
            if let Some(record) = participant.answers.remove(&index) {
                participant.score = participant.score.saturating_sub(record.points);
            }
        }
    }

    // --- projections ---

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .participants
            .iter()
            .map(|p| {
                let answers_count = p.answers.len();
                let correct_answers = p.answers.values().filter(|a| a.is_correct).count();
                let total_time: u32 = p.answers.values().map(|a| a.time_taken).sum();
                LeaderboardEntry {
                    user_id: p.user_id.clone(),
                    name: p.name.clone(),
                    score: p.score,
                    accuracy: if answers_count == 0 {
                        0.0
                    } else {
                        correct_answers as f64 / answers_count as f64
                    },
                    answers_count,
                    correct_answers,
                    average_time: if answers_count == 0 {
                        0.0
                    } else {
                        total_time as f64 / answers_count as f64
                    },
                }
            })
            .collect();
        // Ties break by lower average time; join order is stable beyond that.
        entries.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.average_time.total_cmp(&b.average_time))
        });
        entries
    }

    pub fn participant_views(&self) -> Vec<ParticipantView> {
        self.participants.iter().map(|p| p.view()).collect()
    }

    pub fn to_session_view(&self) -> SessionView {
        SessionView {
            id: self.session_id.clone(),
            code: self.code.clone(),
            quiz_id: self.quiz.id.clone(),
            quiz_title: self.quiz.title.clone(),
            host_id: self.host_id.clone(),
            status: self.status,
            current_question: CurrentQuestion {
                index: self.current_index,
            },
            participants: self.participant_views(),
        }
    }

    // --- room delivery ---

    pub fn broadcast(&self, msg: &ServerMessage) {
        if let Some(host_tx) = &self.host_tx {
            send_msg(host_tx, msg.clone());
        }
        for tx in self.participant_txs.values() {
            send_msg(tx, msg.clone());
        }
    }

    pub fn send_to_participant(&self, user_id: &str, msg: ServerMessage) {
        if let Some(tx) = self.participant_txs.get(user_id) {
            send_msg(tx, msg);
        }
    }

    /// Abort any running countdown tasks. Called when the session ends so
    /// no tick fires against a disposed session.
    pub fn abort_timers(&mut self) {
        if let Some(handle) = self.countdown_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.lobby_countdown_task.take() {
            handle.abort();
        }
        self.countdown_running = false;
    }
}
