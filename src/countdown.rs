use crate::model::server_message::ServerMessage;
use crate::model::session::{LiveSession, SessionStatus};
use crate::server::AppState;
use log::{error, info};
use std::sync::Arc;

/// Transition a lobby session to active on question 0 and start its
/// countdown. Returns the quizStarted event for the caller to broadcast,
/// or None when the quiz has no questions. Called while holding the
/// sessions lock.
pub fn begin_quiz(session: &mut LiveSession, app_state: &Arc<AppState>) -> Option<ServerMessage> {
    let question = session.question_at(0).map(|q| q.public_view())?;

    if let Some(handle) = session.lobby_countdown_task.take() {
        handle.abort();
    }
    session.lobby_countdown_remaining = None;
    session.status = SessionStatus::Active;
    session.current_index = Some(0);
    session.countdown_remaining = None;

    start_question_countdown(session, app_state);

    Some(ServerMessage::QuizStarted {
        question,
        index: 0,
        countdown: session.countdown_remaining.unwrap_or(0),
    })
}

/// Start/resume the current question's countdown and spawn the tick task.
/// Called while holding the sessions lock; does not broadcast. The caller
/// announces the transition (quizStarted / nextQuestion / quizResumed).
pub fn start_question_countdown(session: &mut LiveSession, app_state: &Arc<AppState>) {
    if let Some(handle) = session.countdown_task.take() {
        handle.abort();
    }

    // Keep the remaining time across pause/resume; seed from the question's
    // duration otherwise.
    if session.countdown_remaining.is_none() || session.countdown_remaining == Some(0) {
        session.countdown_remaining = Some(session.current_duration());
    }

    session.countdown_running = true;
    session.question_open = true;

    if session.countdown_remaining.unwrap_or(0) == 0 {
        return;
    }

    let app_state = app_state.clone();
    let session_id = session.session_id.clone();

    let task = tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;

            let mut sessions = app_state.sessions.lock().await;
            let Some(session) = sessions.get_mut(&session_id) else {
                break; // Session was disposed
            };

            if !session.countdown_running {
                error!("Tried to tick countdown for {session_id}, but it isn't running");
                break;
            }

            let Some(remaining) = session.countdown_remaining else {
                error!("Tried to tick countdown for {session_id}, but no value was seeded");
                break;
            };
            if remaining == 0 {
                break;
            }

            let remaining = remaining - 1;
            session.countdown_remaining = Some(remaining);

            if remaining == 0 {
                // Expiry: close submissions and resolve the question with
                // null records for everyone who didn't answer.
                session.countdown_task = None;
                let answers = session.resolve_current_question();
                session.broadcast(&ServerMessage::CountdownUpdated { countdown: 0 });
                session.broadcast(&ServerMessage::AllAnswersSubmitted { answers });
                session.broadcast(&ServerMessage::LeaderboardUpdate {
                    leaderboard: session.leaderboard(),
                });
                break;
            }

            session.broadcast(&ServerMessage::CountdownUpdated {
                countdown: remaining,
            });
        }
    });

    session.countdown_task = Some(task.abort_handle());
}

/// Freeze the countdown and close submissions. Called while holding the
/// sessions lock.
pub fn pause_question_countdown(session: &mut LiveSession) {
    if let Some(handle) = session.countdown_task.take() {
        handle.abort();
    }
    session.countdown_running = false;
    session.question_open = false;
}

/// Reset the countdown to the current question's full duration without
/// starting it. Called while holding the sessions lock.
pub fn reset_question_countdown(session: &mut LiveSession) {
    if let Some(handle) = session.countdown_task.take() {
        handle.abort();
    }
    session.countdown_remaining = Some(session.current_duration());
    session.countdown_running = false;
    session.question_open = false;
}

/// Pre-start auto-launch: tick the lobby countdown once per second and
/// begin the quiz at zero. Skipped (countdownStopped) when the lobby is
/// still empty at expiry. Called while holding the sessions lock; the
/// caller broadcasts countdownStarted.
pub fn start_lobby_countdown(session: &mut LiveSession, app_state: &Arc<AppState>, countdown: u32) {
    if let Some(handle) = session.lobby_countdown_task.take() {
        handle.abort();
    }
    session.lobby_countdown_remaining = Some(countdown);

    let app_state = app_state.clone();
    let session_id = session.session_id.clone();

    let task = tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;

            let mut sessions = app_state.sessions.lock().await;
            let Some(session) = sessions.get_mut(&session_id) else {
                break;
            };
            if session.status != SessionStatus::Lobby {
                break;
            }

            let Some(remaining) = session.lobby_countdown_remaining else {
                break;
            };
            if remaining == 0 {
                break;
            }

            let remaining = remaining - 1;
            session.lobby_countdown_remaining = Some(remaining);

            if remaining == 0 {
                session.lobby_countdown_task = None;
                if session.connected_participants() == 0 {
                    info!("Lobby countdown for {session_id} expired with an empty lobby");
                    session.lobby_countdown_remaining = None;
                    session.broadcast(&ServerMessage::CountdownStopped);
                } else {
                    match begin_quiz(session, &app_state) {
                        Some(started) => session.broadcast(&started),
                        None => session.broadcast(&ServerMessage::CountdownStopped),
                    }
                }
                break;
            }

            session.broadcast(&ServerMessage::CountdownUpdated {
                countdown: remaining,
            });
        }
    });

    session.lobby_countdown_task = Some(task.abort_handle());
}

/// Cancel a pending auto-launch. Called while holding the sessions lock.
pub fn stop_lobby_countdown(session: &mut LiveSession) {
    if let Some(handle) = session.lobby_countdown_task.take() {
        handle.abort();
    }
    session.lobby_countdown_remaining = None;
}
