use crate::{TestClient, TestServer, setup_live_session};
use quizlive::model::client_message::ClientMessage;
use quizlive::model::quiz::{AnswerValue, Quiz};
use quizlive::model::server_message::{ErrorKind, ServerMessage};
use serde_json::json;

async fn start_quiz(host: &mut TestClient, participant: &mut TestClient, session_id: &str) {
    host.send_json(&ClientMessage::StartQuiz {
        session_id: session_id.to_string(),
        admin_id: "host-1".to_string(),
    })
    .await;
    let _: ServerMessage = host.recv_json().await;
    let _: ServerMessage = participant.recv_json().await;
}

#[tokio::test]
async fn correct_answer_earns_points_with_speed_bonus() {
    let server = TestServer::start().await;
    let (mut host, mut participant, session, quiz) = setup_live_session(&server, 30).await;
    start_quiz(&mut host, &mut participant, &session.id).await;

    participant
        .send_json(&ClientMessage::SubmitAnswer {
            session_id: session.id.clone(),
            user_id: "user-1".to_string(),
            question_id: quiz.questions[0].id.clone(),
            selected_option: Some(AnswerValue::Index(1)),
        })
        .await;

    match participant.recv_skipping_ticks().await {
        ServerMessage::AnswerFeedback {
            is_correct,
            correct_answer,
            explanation,
            points,
            time_taken,
            selected_option,
        } => {
            assert!(is_correct);
            assert_eq!(correct_answer, AnswerValue::Index(1));
            assert!(explanation.is_some());
            // Full speed bonus: 100 base + 100 * 30 / 60
            assert_eq!(points, 150);
            assert_eq!(time_taken, 0);
            assert_eq!(selected_option, Some(AnswerValue::Index(1)));
        }
        other => panic!("Expected answerFeedback, got {other:?}"),
    }

    // Everyone connected has answered, so the question resolves early
    match participant.recv_skipping_ticks().await {
        ServerMessage::AllAnswersSubmitted { answers } => {
            assert_eq!(answers.len(), 1);
            assert!(answers[0].is_correct);
        }
        other => panic!("Expected allAnswersSubmitted, got {other:?}"),
    }
    match participant.recv_skipping_ticks().await {
        ServerMessage::LeaderboardUpdate { leaderboard } => {
            assert_eq!(leaderboard[0].score, 150);
        }
        other => panic!("Expected leaderboardUpdate, got {other:?}"),
    }
}

#[tokio::test]
async fn wrong_answer_scores_zero_but_reveals_the_key() {
    let server = TestServer::start().await;
    let (mut host, mut participant, session, quiz) = setup_live_session(&server, 30).await;
    start_quiz(&mut host, &mut participant, &session.id).await;

    participant
        .send_json(&ClientMessage::SubmitAnswer {
            session_id: session.id.clone(),
            user_id: "user-1".to_string(),
            question_id: quiz.questions[0].id.clone(),
            selected_option: Some(AnswerValue::Index(0)),
        })
        .await;

    match participant.recv_skipping_ticks().await {
        ServerMessage::AnswerFeedback {
            is_correct,
            correct_answer,
            points,
            ..
        } => {
            assert!(!is_correct);
            assert_eq!(correct_answer, AnswerValue::Index(1));
            assert_eq!(points, 0);
        }
        other => panic!("Expected answerFeedback, got {other:?}"),
    }
}

#[tokio::test]
async fn null_submission_is_recorded_as_incorrect() {
    let server = TestServer::start().await;
    let (mut host, mut participant, session, quiz) = setup_live_session(&server, 30).await;
    start_quiz(&mut host, &mut participant, &session.id).await;

    participant
        .send_json(&ClientMessage::SubmitAnswer {
            session_id: session.id.clone(),
            user_id: "user-1".to_string(),
            question_id: quiz.questions[0].id.clone(),
            selected_option: None,
        })
        .await;

    match participant.recv_skipping_ticks().await {
        ServerMessage::AnswerFeedback {
            is_correct,
            points,
            selected_option,
            ..
        } => {
            assert!(!is_correct);
            assert_eq!(points, 0);
            assert!(selected_option.is_none());
        }
        other => panic!("Expected answerFeedback, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_submission_is_rejected() {
    let server = TestServer::start().await;
    let (mut host, mut participant, session, quiz) = setup_live_session(&server, 30).await;

    // A second participant keeps the first submit from resolving the question
    let mut second = TestClient::connect(&server.ws_url()).await;
    second.join_session(&session.id, "user-2", "Grace").await;
    let _: ServerMessage = host.recv_json().await;
    let _: ServerMessage = participant.recv_json().await;

    start_quiz(&mut host, &mut participant, &session.id).await;
    let _: ServerMessage = second.recv_json().await;

    participant
        .send_json(&ClientMessage::SubmitAnswer {
            session_id: session.id.clone(),
            user_id: "user-1".to_string(),
            question_id: quiz.questions[0].id.clone(),
            selected_option: Some(AnswerValue::Index(1)),
        })
        .await;
    match participant.recv_skipping_ticks().await {
        ServerMessage::AnswerFeedback { .. } => {}
        other => panic!("Expected answerFeedback, got {other:?}"),
    }

    participant
        .send_json(&ClientMessage::SubmitAnswer {
            session_id: session.id.clone(),
            user_id: "user-1".to_string(),
            question_id: quiz.questions[0].id.clone(),
            selected_option: Some(AnswerValue::Index(0)),
        })
        .await;
    match participant.recv_skipping_ticks().await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::AlreadyAnswered),
        other => panic!("Expected alreadyAnswered error, got {other:?}"),
    }
}

#[tokio::test]
async fn question_resolves_early_once_everyone_answered() {
    let server = TestServer::start().await;
    let (mut host, mut participant, session, quiz) = setup_live_session(&server, 30).await;

    let mut second = TestClient::connect(&server.ws_url()).await;
    second.join_session(&session.id, "user-2", "Grace").await;
    let _: ServerMessage = host.recv_json().await;
    let _: ServerMessage = participant.recv_json().await;

    start_quiz(&mut host, &mut participant, &session.id).await;
    let _: ServerMessage = second.recv_json().await;

    participant
        .send_json(&ClientMessage::SubmitAnswer {
            session_id: session.id.clone(),
            user_id: "user-1".to_string(),
            question_id: quiz.questions[0].id.clone(),
            selected_option: Some(AnswerValue::Index(1)),
        })
        .await;
    let _: ServerMessage = participant.recv_skipping_ticks().await; // answerFeedback

    second
        .send_json(&ClientMessage::SubmitAnswer {
            session_id: session.id.clone(),
            user_id: "user-2".to_string(),
            question_id: quiz.questions[0].id.clone(),
            selected_option: Some(AnswerValue::Index(0)),
        })
        .await;
    let _: ServerMessage = second.recv_skipping_ticks().await; // answerFeedback

    // The last submission triggers the aggregate for the whole room
    match host.recv_skipping_ticks().await {
        ServerMessage::AllAnswersSubmitted { answers } => {
            assert_eq!(answers.len(), 2);
        }
        other => panic!("Expected allAnswersSubmitted, got {other:?}"),
    }
    match host.recv_skipping_ticks().await {
        ServerMessage::LeaderboardUpdate { leaderboard } => {
            assert_eq!(leaderboard[0].user_id, "user-1");
            assert!(leaderboard[0].score > 0);
            assert_eq!(leaderboard[1].user_id, "user-2");
            assert_eq!(leaderboard[1].score, 0);
        }
        other => panic!("Expected leaderboardUpdate, got {other:?}"),
    }
}

#[tokio::test]
async fn submission_for_wrong_question_is_rejected() {
    let server = TestServer::start().await;
    let (mut host, mut participant, session, quiz) = setup_live_session(&server, 30).await;
    start_quiz(&mut host, &mut participant, &session.id).await;

    participant
        .send_json(&ClientMessage::SubmitAnswer {
            session_id: session.id.clone(),
            user_id: "user-1".to_string(),
            question_id: quiz.questions[1].id.clone(),
            selected_option: Some(AnswerValue::Flag(true)),
        })
        .await;
    match participant.recv_skipping_ticks().await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::InvalidQuestionIndex),
        other => panic!("Expected invalidQuestionIndex error, got {other:?}"),
    }
}

#[tokio::test]
async fn feedback_omits_explanation_when_disabled() {
    let server = TestServer::start().await;

    let mut body = crate::sample_quiz_body("host-1", 30);
    body["settings"] = json!({
        "secondsPerQuestion": 30,
        "maxAttempts": 1,
        "randomizeQuestions": false,
        "showFeedback": false
    });
    let quiz: Quiz = server
        .http
        .post(server.http_url("/api/quiz/create"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    server
        .http
        .post(server.http_url(&format!("/api/quiz/{}/publish", quiz.id)))
        .send()
        .await
        .unwrap();
    let session = server.create_session(&quiz.id, "host-1").await;

    let mut host = TestClient::connect(&server.ws_url()).await;
    host.join_as_host(&session.id, "host-1").await;
    let mut participant = TestClient::connect(&server.ws_url()).await;
    participant.join_session(&session.id, "user-1", "Ada").await;
    let _: ServerMessage = host.recv_json().await;

    start_quiz(&mut host, &mut participant, &session.id).await;

    participant
        .send_json(&ClientMessage::SubmitAnswer {
            session_id: session.id.clone(),
            user_id: "user-1".to_string(),
            question_id: quiz.questions[0].id.clone(),
            selected_option: Some(AnswerValue::Index(1)),
        })
        .await;
    match participant.recv_skipping_ticks().await {
        ServerMessage::AnswerFeedback {
            is_correct,
            explanation,
            ..
        } => {
            assert!(is_correct);
            assert!(explanation.is_none());
        }
        other => panic!("Expected answerFeedback, got {other:?}"),
    }
}
