use crate::{TestClient, TestServer, setup_live_session};
use quizlive::model::client_message::ClientMessage;
use quizlive::model::server_message::{ErrorKind, ServerMessage};

#[tokio::test]
async fn first_message_must_be_join_session() {
    let server = TestServer::start().await;
    let quiz = server.create_published_quiz("host-1", 30).await;
    let session = server.create_session(&quiz.id, "host-1").await;

    let mut client = TestClient::connect(&server.ws_url()).await;
    client
        .send_json(&ClientMessage::StartQuiz {
            session_id: session.id.clone(),
            admin_id: "host-1".to_string(),
        })
        .await;
    match client.recv_json().await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::InvalidCommand),
        other => panic!("Expected invalidCommand error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_first_message_is_a_parse_error() {
    let server = TestServer::start().await;

    let mut client = TestClient::connect(&server.ws_url()).await;
    client.send_raw_text("this is not json").await;
    match client.recv_json().await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::Parse),
        other => panic!("Expected parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn joining_unknown_session_is_rejected() {
    let server = TestServer::start().await;

    let mut client = TestClient::connect(&server.ws_url()).await;
    client
        .send_json(&ClientMessage::JoinSession {
            session_id: "no-such-session".to_string(),
            user_id: "user-1".to_string(),
            name: Some("Ada".to_string()),
            avatar: None,
        })
        .await;
    match client.recv_json().await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::SessionNotFound),
        other => panic!("Expected sessionNotFound error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_message_after_join_is_a_parse_error() {
    let server = TestServer::start().await;
    let (_host, mut participant, _session, _quiz) = setup_live_session(&server, 30).await;

    participant.send_raw_text("{\"type\": \"noSuchCommand\"}").await;
    match participant.recv_json().await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::Parse),
        other => panic!("Expected parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn session_id_mismatch_is_rejected() {
    let server = TestServer::start().await;
    let (_host, mut participant, _session, quiz) = setup_live_session(&server, 30).await;

    participant
        .send_json(&ClientMessage::SubmitAnswer {
            session_id: "some-other-session".to_string(),
            user_id: "user-1".to_string(),
            question_id: quiz.questions[0].id.clone(),
            selected_option: None,
        })
        .await;
    match participant.recv_json().await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::InvalidCommand),
        other => panic!("Expected invalidCommand error, got {other:?}"),
    }
}

#[tokio::test]
async fn host_commands_from_participants_are_rejected() {
    let server = TestServer::start().await;
    let (_host, mut participant, session, _quiz) = setup_live_session(&server, 30).await;

    participant
        .send_json(&ClientMessage::PauseQuiz {
            session_id: session.id.clone(),
            admin_id: "user-1".to_string(),
        })
        .await;
    match participant.recv_json().await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::NotHost),
        other => panic!("Expected notHost error, got {other:?}"),
    }
}

#[tokio::test]
async fn wrong_admin_id_is_rejected() {
    let server = TestServer::start().await;
    let (mut host, _participant, session, _quiz) = setup_live_session(&server, 30).await;

    host.send_json(&ClientMessage::StartQuiz {
        session_id: session.id.clone(),
        admin_id: "impostor".to_string(),
    })
    .await;
    match host.recv_json().await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::NotHost),
        other => panic!("Expected notHost error, got {other:?}"),
    }
}

#[tokio::test]
async fn next_question_requires_the_successor_index() {
    let server = TestServer::start().await;
    let (mut host, mut participant, session, _quiz) = setup_live_session(&server, 30).await;

    host.send_json(&ClientMessage::StartQuiz {
        session_id: session.id.clone(),
        admin_id: "host-1".to_string(),
    })
    .await;
    let _: ServerMessage = host.recv_json().await;
    let _: ServerMessage = participant.recv_json().await;

    host.send_json(&ClientMessage::NextQuestion {
        session_id: session.id.clone(),
        admin_id: "host-1".to_string(),
        question_index: 5,
    })
    .await;
    match host.recv_skipping_ticks().await {
        ServerMessage::Error { kind, message } => {
            assert_eq!(kind, ErrorKind::InvalidQuestionIndex);
            assert!(message.contains("Expected questionIndex 1"));
        }
        other => panic!("Expected invalidQuestionIndex error, got {other:?}"),
    }
}

#[tokio::test]
async fn quiz_commands_before_start_are_rejected() {
    let server = TestServer::start().await;
    let (mut host, _participant, session, _quiz) = setup_live_session(&server, 30).await;

    host.send_json(&ClientMessage::NextQuestion {
        session_id: session.id.clone(),
        admin_id: "host-1".to_string(),
        question_index: 1,
    })
    .await;
    match host.recv_json().await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::NotStarted),
        other => panic!("Expected notStarted error, got {other:?}"),
    }

    host.send_json(&ClientMessage::PauseQuiz {
        session_id: session.id.clone(),
        admin_id: "host-1".to_string(),
    })
    .await;
    match host.recv_json().await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::InvalidCommand),
        other => panic!("Expected invalidCommand error, got {other:?}"),
    }
}

#[tokio::test]
async fn submit_for_another_user_is_rejected() {
    let server = TestServer::start().await;
    let (mut host, mut participant, session, quiz) = setup_live_session(&server, 30).await;

    host.send_json(&ClientMessage::StartQuiz {
        session_id: session.id.clone(),
        admin_id: "host-1".to_string(),
    })
    .await;
    let _: ServerMessage = host.recv_json().await;
    let _: ServerMessage = participant.recv_json().await;

    participant
        .send_json(&ClientMessage::SubmitAnswer {
            session_id: session.id.clone(),
            user_id: "someone-else".to_string(),
            question_id: quiz.questions[0].id.clone(),
            selected_option: None,
        })
        .await;
    match participant.recv_skipping_ticks().await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::InvalidCommand),
        other => panic!("Expected invalidCommand error, got {other:?}"),
    }
}
