use crate::{
    model::{
        client_message::ClientMessage,
        quiz::AnswerValue,
        server_message::{ErrorKind, LeaveReason, ServerMessage, send_msg},
        session::{LiveSession, SubmitError},
    },
    server::{AppState, Heartbeat, PING_INTERVAL, Rx, Tx},
};
use futures_util::{SinkExt, StreamExt};
use log::*;
use std::sync::Arc;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};

/// Join (or rejoin) a session as a participant. Idempotent per userId: a
/// reconnect restores the existing roster entry with score and answers
/// intact.
pub async fn join_session(
    app_state: Arc<AppState>,
    mut ws_stream: WebSocketStream<TcpStream>,
    session_id: String,
    user_id: String,
    name: Option<String>,
    avatar: Option<String>,
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

        let name = name.unwrap_or_else(|| format!("Player {}", session.participants.len() + 1));
        let rejoined = session.join_participant(&user_id, name, avatar, tx.clone());
        info!(
            "Participant {user_id} {} session {session_id}",
            if rejoined { "rejoined" } else { "joined" }
        );

        let participant = session
            .participant(&user_id)
            .expect("participant was just inserted")
            .view();
        session.broadcast(&ServerMessage::ParticipantJoined {
            participant,
            participants: session.participant_views(),
        });
    }

    handle_participant(ws_stream, app_state, rx, tx, session_id, user_id).await;
}

/// Apply a participant command. Runs while holding the sessions lock.
/// Returns false when the connection should close (voluntary leave).
fn apply_participant_command(
    action: ClientMessage,
    session: &mut LiveSession,
    user_id: &str,
    participant_tx: &Tx,
) -> bool {
    let error = |kind, message: String| {
        warn!("Rejecting participant command from {user_id}: {message}");
        send_msg(participant_tx, ServerMessage::error(kind, message));
    };

    match action {
        ClientMessage::SubmitAnswer {
            user_id: claimed,
            question_id,
            selected_option,
            ..
        } => {
            if claimed != user_id {
                error(
                    ErrorKind::InvalidCommand,
                    "userId does not match this connection".to_string(),
                );
                return true;
            }
            submit_answer(session, user_id, &question_id, selected_option, participant_tx);
        }

        ClientMessage::LeaveQuiz { .. } => {
            info!("Participant {user_id} left session {}", session.session_id);
            session.remove_participant(user_id);
            session.broadcast(&ServerMessage::ParticipantLeft {
                user_id: user_id.to_string(),
                reason: LeaveReason::Left,
                participants: session.participant_views(),
            });
            return false;
        }

        ClientMessage::JoinSession { .. } => {
            error(
                ErrorKind::InvalidCommand,
                "Session already joined".to_string(),
            );
        }

        other if other.is_host_command() => {
            error(
                ErrorKind::NotHost,
                "Host command on participant connection".to_string(),
            );
        }

        _ => {
            error(ErrorKind::InvalidCommand, "Unexpected command".to_string());
        }
    }
    true
}

fn submit_answer(
    session: &mut LiveSession,
    user_id: &str,
    question_id: &str,
    selected_option: Option<AnswerValue>,
    participant_tx: &Tx,
) {
    // Grab the key and explanation before the mutable borrow below.
    let question_meta = session
        .current_question()
        .map(|q| (q.kind.correct_answer(), q.explanation.clone()));
    let show_feedback = session.quiz.settings.show_feedback;

    match session.record_answer(user_id, question_id, selected_option) {
        Ok(record) => {
            let (correct_answer, explanation) =
                question_meta.expect("record_answer validated the current question");
            send_msg(
                participant_tx,
                ServerMessage::AnswerFeedback {
                    is_correct: record.is_correct,
                    correct_answer,
                    explanation: if show_feedback { explanation } else { None },
                    points: record.points,
                    time_taken: record.time_taken,
                    selected_option: record.selected_option,
                },
            );

            // Early resolution: everyone connected has answered.
            if session.all_connected_answered() {
                let answers = session.resolve_current_question();
                session.broadcast(&ServerMessage::AllAnswersSubmitted { answers });
                session.broadcast(&ServerMessage::LeaderboardUpdate {
                    leaderboard: session.leaderboard(),
                });
            }
        }
        Err(e) => {
            let (kind, message) = match e {
                SubmitError::NotActive => (ErrorKind::NotStarted, "Quiz is not active"),
                SubmitError::WrongQuestion => (
                    ErrorKind::InvalidQuestionIndex,
                    "questionId does not match the current question",
                ),
                SubmitError::AlreadyAnswered => {
                    (ErrorKind::AlreadyAnswered, "Answer already submitted")
                }
                SubmitError::SubmissionsClosed => (
                    ErrorKind::SubmissionsClosed,
                    "Submissions are closed for this question",
                ),
                SubmitError::NotParticipant => {
                    (ErrorKind::ParticipantNotFound, "Not part of this session")
                }
            };
            warn!("Rejecting answer from {user_id}: {message}");
            send_msg(participant_tx, ServerMessage::error(kind, message));
        }
    }
}

/// Returns false when the connection should close.
async fn process_participant_message(
    text: &str,
    app_state: &Arc<AppState>,
    session_id: &str,
    user_id: &str,
    participant_tx: &Tx,
) -> bool {
    // Parse before taking the lock
    let action = match serde_json::from_str::<ClientMessage>(text) {
        Ok(action) => action,
        Err(e) => {
            warn!("Failed to parse participant message: {e}");
            send_msg(
                participant_tx,
                ServerMessage::error(ErrorKind::Parse, format!("Invalid JSON: {e}")),
            );
            return true;
        }
    };

    if action.session_id() != session_id {
        send_msg(
            participant_tx,
            ServerMessage::error(
                ErrorKind::InvalidCommand,
                "sessionId does not match this connection",
            ),
        );
        return true;
    }

    let mut sessions = app_state.sessions.lock().await;
    let Some(session) = sessions.get_mut(session_id) else {
        send_msg(
            participant_tx,
            ServerMessage::error(
                ErrorKind::SessionNotFound,
                format!("Session {session_id} not found"),
            ),
        );
        return true;
    };
    apply_participant_command(action, session, user_id, participant_tx)
}

async fn handle_participant(
    ws_stream: WebSocketStream<TcpStream>,
    app_state: Arc<AppState>,
    mut rx: Rx,
    participant_tx: Tx,
    session_id: String,
    user_id: String,
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
                        debug!("Received participant message: {text}");
                        if !process_participant_message(
                            &text, &app_state, &session_id, &user_id, &participant_tx,
                        ).await {
                            break;
                        }
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
                    info!("Participant {user_id} connection timed out (no pong received)");
                    break;
                }
                if ws_write.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Disconnect without leave-quiz: keep the roster entry (score and
    // answers intact) but flag it so the host sees the drop.
    let mut sessions = app_state.sessions.lock().await;
    if let Some(session) = sessions.get_mut(&session_id) {
        if session.participant(&user_id).is_some() {
            info!("Participant {user_id} disconnected from session {session_id}");
            session.mark_disconnected(&user_id);
            session.broadcast(&ServerMessage::ParticipantLeft {
                user_id: user_id.clone(),
                reason: LeaveReason::Disconnected,
                participants: session.participant_views(),
            });
        }
    }
}
