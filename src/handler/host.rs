use crate::{
    countdown::{
        begin_quiz, pause_question_countdown, reset_question_countdown,
        start_lobby_countdown, start_question_countdown, stop_lobby_countdown,
    },
    model::{
        client_message::ClientMessage,
        server_message::{ErrorKind, LeaveReason, ServerMessage, send_msg},
        session::{LiveSession, SessionStatus},
    },
    server::{AppState, Heartbeat, PING_INTERVAL, Rx, Tx},
    store::SessionResult,
};
use futures_util::{SinkExt, StreamExt};
use log::*;
use std::sync::Arc;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};

/// Attach the host channel to an existing session (created via REST).
/// Rejects when another host connection is already active.
pub async fn attach_host(
    app_state: Arc<AppState>,
    mut ws_stream: WebSocketStream<TcpStream>,
    session_id: String,
    admin_id: String,
) {
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    {
        let mut sessions = app_state.sessions.lock().await;
        let Some(session) = sessions.get_mut(&session_id) else {
            drop(sessions);
            let error = ServerMessage::error(
                ErrorKind::SessionNotFound,
                format!("Session {session_id} not found"),
            );
            let msg = serde_json::to_string(&error).unwrap_or_default();
            let _ = ws_stream.send(Message::text(msg)).await;
            return;
        };
        if session.host_tx.is_some() {
            info!("Rejecting host attach for {session_id}: host already connected");
            drop(sessions);
            let error = ServerMessage::error(
                ErrorKind::AlreadyExists,
                "Session already has an active host",
            );
            let msg = serde_json::to_string(&error).unwrap_or_default();
            let _ = ws_stream.send(Message::text(msg)).await;
            return;
        }
        info!("Host {admin_id} attached to session {session_id}");
        session.host_tx = Some(tx.clone());
    }

    handle_host(ws_stream, app_state, rx, tx, session_id).await;
}

/// Effects that must run after the sessions lock is released.
enum PostAction {
    /// Session completed or was ended: write results to the store.
    Archive(SessionResult),
    /// endQuiz: archive (when not already done) and dispose the session.
    Dispose(Option<SessionResult>),
}

/// Apply a host command to the session. Runs while holding the sessions
/// lock; room broadcasts go out through the stored senders (unbounded, so
/// sending under the lock never blocks).
fn apply_host_command(
    action: ClientMessage,
    session: &mut LiveSession,
    app_state: &Arc<AppState>,
    host_tx: &Tx,
) -> Option<PostAction> {
    let error = |kind, message: &str| {
        send_msg(host_tx, ServerMessage::error(kind, message));
    };

    match action {
        ClientMessage::StartQuiz { .. } => {
            if session.status != SessionStatus::Lobby {
                error(ErrorKind::InvalidCommand, "Quiz already started");
                return None;
            }
            if session.connected_participants() == 0 {
                error(ErrorKind::EmptyLobby, "No participants have joined yet");
                return None;
            }
            let Some(started) = begin_quiz(session, app_state) else {
                error(ErrorKind::Validation, "Quiz has no questions");
                return None;
            };
            session.broadcast(&started);
        }

        ClientMessage::StartQuizCountdown { countdown, .. } => {
            if session.status != SessionStatus::Lobby {
                error(ErrorKind::InvalidCommand, "Quiz already started");
                return None;
            }
            let max = app_state.config.max_lobby_countdown;
            if countdown == 0 || countdown > max {
                error(
                    ErrorKind::Validation,
                    &format!("countdown must be between 1 and {max} seconds"),
                );
                return None;
            }
            start_lobby_countdown(session, app_state, countdown);
            session.broadcast(&ServerMessage::CountdownStarted { countdown });
        }

        ClientMessage::StopQuizCountdown { .. } => {
            stop_lobby_countdown(session);
            session.broadcast(&ServerMessage::CountdownStopped);
        }

        ClientMessage::PauseQuiz { .. } => {
            if session.status != SessionStatus::Active {
                error(ErrorKind::InvalidCommand, "Quiz is not active");
                return None;
            }
            // A resolved question must not be paused: resuming would reseed
            // the countdown and resolve it a second time.
            if !session.question_open {
                error(ErrorKind::InvalidCommand, "No open question to pause");
                return None;
            }
            pause_question_countdown(session);
            session.status = SessionStatus::Paused;
            session.broadcast(&ServerMessage::QuizPaused {
                countdown: session.countdown_remaining.unwrap_or(0),
            });
        }

        ClientMessage::ResumeQuiz { .. } => {
            if session.status != SessionStatus::Paused {
                error(ErrorKind::InvalidCommand, "Quiz is not paused");
                return None;
            }
            session.status = SessionStatus::Active;
            start_question_countdown(session, app_state);
            session.broadcast(&ServerMessage::QuizResumed {
                countdown: session.countdown_remaining.unwrap_or(0),
            });
        }

        ClientMessage::NextQuestion { question_index, .. } => {
            return advance(session, app_state, host_tx, Some(question_index), true);
        }

        ClientMessage::SkipQuestion { .. } => {
            return advance(session, app_state, host_tx, None, false);
        }

        ClientMessage::RestartQuestion { question_id, .. } => {
            if session.status != SessionStatus::Active && session.status != SessionStatus::Paused {
                error(ErrorKind::NotStarted, "Quiz has not started");
                return None;
            }
            let current = session.current_question().map(|q| (q.id.clone(), q.public_view()));
            let Some((id, question)) = current else {
                error(ErrorKind::NotStarted, "No current question");
                return None;
            };
            if id != question_id {
                error(
                    ErrorKind::InvalidQuestionIndex,
                    "questionId does not match the current question",
                );
                return None;
            }
            // Replay: forget this question's answers and reseed the timer.
            session.clear_current_answers();
            reset_question_countdown(session);
            session.status = SessionStatus::Active;
            start_question_countdown(session, app_state);
            session.broadcast(&ServerMessage::NextQuestion {
                question,
                index: session.current_index.unwrap_or(0),
                countdown: session.countdown_remaining.unwrap_or(0),
            });
        }

        ClientMessage::EndQuiz { .. } => {
            session.abort_timers();
            let result = if session.archived {
                None
            } else {
                session.archived = true;
                Some(SessionResult::from_session(session, "ended"))
            };
            session.status = SessionStatus::Ended;
            session.broadcast(&ServerMessage::SessionEnded {
                reason: "Quiz ended by host".to_string(),
            });
            return Some(PostAction::Dispose(result));
        }

        ClientMessage::RemoveParticipant { user_id, .. } => {
            if session.participant(&user_id).is_none() {
                error(
                    ErrorKind::ParticipantNotFound,
                    &format!("Participant {user_id} not found"),
                );
                return None;
            }
            let evicted_tx = session.remove_participant(&user_id);
            if let Some(tx) = evicted_tx {
                send_msg(
                    &tx,
                    ServerMessage::Removed {
                        message: "You have been removed from the session by the host".to_string(),
                    },
                );
                // The connection loop sends the close frame after the
                // removed message and then shuts the socket down.
                let _ = tx.send(Message::Close(None));
            }
            session.broadcast(&ServerMessage::ParticipantLeft {
                user_id,
                reason: LeaveReason::Removed,
                participants: session.participant_views(),
            });
        }

        ClientMessage::JoinSession { .. } => {
            error(ErrorKind::InvalidCommand, "Session already joined");
        }

        ClientMessage::SubmitAnswer { .. } | ClientMessage::LeaveQuiz { .. } => {
            error(
                ErrorKind::InvalidCommand,
                "Participant command on host connection",
            );
        }
    }
    None
}

/// Advance to the next question (nextQuestion validates the index, skip
/// doesn't). Resolves the current question first when it is still open;
/// past the last question the session completes.
fn advance(
    session: &mut LiveSession,
    app_state: &Arc<AppState>,
    host_tx: &Tx,
    requested_index: Option<usize>,
    announce_resolution: bool,
) -> Option<PostAction> {
    if session.status != SessionStatus::Active && session.status != SessionStatus::Paused {
        send_msg(
            host_tx,
            ServerMessage::error(ErrorKind::NotStarted, "Quiz has not started"),
        );
        return None;
    }
    let Some(current) = session.current_index else {
        send_msg(
            host_tx,
            ServerMessage::error(ErrorKind::NotStarted, "Quiz has not started"),
        );
        return None;
    };

    let expected = current + 1;
    if let Some(requested) = requested_index {
        if requested != expected {
            send_msg(
                host_tx,
                ServerMessage::error(
                    ErrorKind::InvalidQuestionIndex,
                    format!("Expected questionIndex {expected}, got {requested}"),
                ),
            );
            return None;
        }
    }

    if session.question_open {
        let answers = session.resolve_current_question();
        if announce_resolution {
            session.broadcast(&ServerMessage::AllAnswersSubmitted { answers });
        }
        session.broadcast(&ServerMessage::LeaderboardUpdate {
            leaderboard: session.leaderboard(),
        });
    }

    if expected >= session.question_count() {
        session.abort_timers();
        session.status = SessionStatus::Ended;
        session.broadcast(&ServerMessage::AllQuestionsCompleted {
            reason: "All questions have been completed".to_string(),
        });
        if !session.archived {
            session.archived = true;
            return Some(PostAction::Archive(SessionResult::from_session(
                session,
                "completed",
            )));
        }
        return None;
    }

    session.current_index = Some(expected);
    session.countdown_remaining = None;
    session.status = SessionStatus::Active;
    start_question_countdown(session, app_state);

    let question = session
        .current_question()
        .map(|q| q.public_view())
        .expect("index checked against question_count");
    session.broadcast(&ServerMessage::NextQuestion {
        question,
        index: expected,
        countdown: session.countdown_remaining.unwrap_or(0),
    });
    None
}

async fn process_host_message(
    text: &str,
    app_state: &Arc<AppState>,
    session_id: &str,
    host_tx: &Tx,
) {
    // Parse before taking the lock
    let action = match serde_json::from_str::<ClientMessage>(text) {
        Ok(action) => action,
        Err(e) => {
            warn!("Failed to parse host message: {e}");
            send_msg(
                host_tx,
                ServerMessage::error(ErrorKind::Parse, format!("Invalid JSON: {e}")),
            );
            return;
        }
    };

    if action.session_id() != session_id {
        send_msg(
            host_tx,
            ServerMessage::error(
                ErrorKind::InvalidCommand,
                "sessionId does not match this connection",
            ),
        );
        return;
    }

    let post = {
        let mut sessions = app_state.sessions.lock().await;
        let Some(session) = sessions.get_mut(session_id) else {
            send_msg(
                host_tx,
                ServerMessage::error(
                    ErrorKind::SessionNotFound,
                    format!("Session {session_id} not found"),
                ),
            );
            return;
        };

        if let Some(admin_id) = action.admin_id() {
            if admin_id != session.host_id {
                send_msg(
                    host_tx,
                    ServerMessage::error(ErrorKind::NotHost, "adminId is not the session host"),
                );
                return;
            }
        }

        let post = apply_host_command(action, session, app_state, host_tx);
        if matches!(post, Some(PostAction::Dispose(_))) {
            info!("Disposing session {session_id}");
            sessions.remove(session_id);
        }
        post
    };
    // Lock released here

    match post {
        Some(PostAction::Archive(result)) | Some(PostAction::Dispose(Some(result))) => {
            app_state.store.archive_result(result).await;
        }
        _ => {}
    }
}

async fn handle_host(
    ws_stream: WebSocketStream<TcpStream>,
    app_state: Arc<AppState>,
    mut rx: Rx,
    host_tx: Tx,
    session_id: String,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let mut heartbeat = Heartbeat::new();
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);

    loop {
        tokio::select! {
            // Outgoing messages from channel
            Some(msg) = rx.recv() => {
                let closing = matches!(msg, Message::Close(_));
                if ws_write.send(msg).await.is_err() {
                    break;
                }
                if closing {
                    break;
                }
            }

            // Incoming messages from WebSocket
            msg_result = ws_read.next() => {
                match msg_result {
                    Some(Ok(Message::Pong(_))) => {
                        heartbeat.record_pong();
                    }
                    Some(Ok(Message::Text(text))) => {
                        if text.is_empty() {
                            warn!("Received empty message");
                            continue;
                        }
                        debug!("Received host message: {text}");
                        process_host_message(&text, &app_state, &session_id, &host_tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(_)) => {
                        break;
                    }
                    _ => {} // Ignore Ping (auto-handled by tungstenite), Binary
                }
            }

            // Heartbeat ping timer
            _ = ping_interval.tick() => {
                if !heartbeat.is_alive() {
                    info!("Host connection for {session_id} timed out (no pong received)");
                    break;
                }
                if ws_write.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
        }
    }

    // The session survives a host disconnect; a reconnecting host
    // re-attaches via joinSession.
    info!("Host disconnected from session {session_id}, clearing host channel");
    if let Some(session) = app_state.sessions.lock().await.get_mut(&session_id) {
        session.host_tx = None;
    }
}
