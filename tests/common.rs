use std::sync::Arc;
use std::time::Duration;

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use quizlive::config::Config;
use quizlive::http;
use quizlive::model::client_message::ClientMessage;
use quizlive::model::quiz::Quiz;
use quizlive::model::server_message::ServerMessage;
use quizlive::model::session::SessionView;
use quizlive::server::{AppState, start_ws_server};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};


pub struct TestServer {
    pub ws_port: u16,
    pub http_port: u16,
    pub http: reqwest::Client,
}

impl TestServer {
    pub async fn start() -> Self {
        let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_port = ws_listener.local_addr().unwrap().port();
        let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http_port = http_listener.local_addr().unwrap().port();

        let app_state = Arc::new(AppState::new(Config::default()));
        let api = http::router(app_state.clone());

        tokio::spawn(async move {
            start_ws_server(ws_listener, app_state).await;
        });
        tokio::spawn(async move {
            axum::serve(http_listener, api).await.unwrap();
        });

        // Give the server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Self {
            ws_port,
            http_port,
            http: reqwest::Client::new(),
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.ws_port)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.http_port)
    }

    /// Create a two-question multiple-choice quiz and publish it.
    pub async fn create_published_quiz(&self, host_id: &str, seconds: u32) -> Quiz {
        let body = sample_quiz_body(host_id, seconds);
        let quiz: Quiz = self
            .http
            .post(self.http_url("/api/quiz/create"))
            .json(&body)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let response = self
            .http
            .post(self.http_url(&format!("/api/quiz/{}/publish", quiz.id)))
            .send()
            .await
            .unwrap();
        assert!(
            response.status().is_success(),
            "publish failed: {}",
            response.text().await.unwrap()
        );
        self.http
            .get(self.http_url(&format!("/api/quiz/{}", quiz.id)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    pub async fn create_session(&self, quiz_id: &str, host_id: &str) -> SessionView {
        let response = self
            .http
            .post(self.http_url("/api/quiz-session/create"))
            .json(&json!({ "quizId": quiz_id, "hostId": host_id }))
            .send()
            .await
            .unwrap();
        assert!(
            response.status().is_success(),
            "session create failed: {}",
            response.text().await.unwrap()
        );
        response.json().await.unwrap()
    }
}

pub fn sample_quiz_body(host_id: &str, seconds: u32) -> serde_json::Value {
    json!({
        "hostId": host_id,
        "title": "Capitals",
        "description": "A quick geography check",
        "subject": "geography",
        "difficulty": "easy",
        "questions": [
            {
                "text": "What is the capital of France?",
                "type": "multiple-choice",
                "options": ["Lyon", "Paris", "Marseille"],
                "correctAnswer": 1,
                "explanation": "Paris has been the capital since 987.",
                "timeLimit": seconds,
                "points": 100
            },
            {
                "text": "Canberra is the capital of Australia.",
                "type": "true-false",
                "correctAnswer": true,
                "timeLimit": seconds,
                "points": 100
            }
        ]
    })
}

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestClient {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

impl TestClient {
    pub async fn connect(url: &str) -> Self {
        let (ws_stream, _) = connect_async(url).await.expect("Failed to connect");
        let (write, read) = ws_stream.split();
        Self { write, read }
    }

    pub async fn send_json<T: Serialize>(&mut self, msg: &T) {
        let json = serde_json::to_string(msg).unwrap();
        self.write.send(Message::text(json)).await.unwrap();
    }

    pub async fn send_raw_text(&mut self, text: &str) {
        self.write.send(Message::text(text)).await.unwrap();
    }

    pub async fn recv_json<T: DeserializeOwned>(&mut self) -> T {
        let timeout_duration = Duration::from_secs(2);
        loop {
            match tokio::time::timeout(timeout_duration, self.read.next()).await {
                Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
                Ok(Some(Ok(msg))) => {
                    return serde_json::from_str(msg.to_text().unwrap()).unwrap();
                }
                Ok(Some(Err(e))) => panic!("WebSocket error: {e}"),
                Ok(None) => panic!("WebSocket stream closed"),
                Err(_) => {
                    panic!("Timeout waiting for message from server (waited {timeout_duration:?})")
                }
            }
        }
    }

    /// Receive the next server message that is not a countdownUpdated tick.
    /// Timed tests use this so a tick racing a command doesn't flake them.
    pub async fn recv_skipping_ticks(&mut self) -> ServerMessage {
        loop {
            match self.recv_json().await {
                ServerMessage::CountdownUpdated { .. } => continue,
                other => return other,
            }
        }
    }

    /// Assert that the server closes this connection.
    pub async fn expect_closed(&mut self) {
        let result = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match self.read.next().await {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        })
        .await;
        assert!(result.is_ok(), "Expected the server to close the connection");
    }

    /// Assert that no server message arrives within the given window.
    pub async fn expect_silence(&mut self, window: Duration) {
        let result = tokio::time::timeout(window, async {
            loop {
                match self.read.next().await {
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    other => break other,
                }
            }
        })
        .await;
        assert!(result.is_err(), "Expected silence, got {result:?}");
    }

    /// Send joinSession as a participant and consume the participantJoined
    /// broadcast echoed back to the joiner.
    pub async fn join_session(&mut self, session_id: &str, user_id: &str, name: &str) {
        self.send_json(&ClientMessage::JoinSession {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            name: Some(name.to_string()),
            avatar: None,
        })
        .await;

        let response: ServerMessage = self.recv_json().await;
        match response {
            ServerMessage::ParticipantJoined { participant, .. } => {
                assert_eq!(participant.user_id, user_id, "User ids should match");
            }
            other => panic!("Expected participantJoined message, got {other:?}"),
        }
    }

    /// Send joinSession as the session host. The host channel gets no ack;
    /// ordering with later commands is guaranteed per connection.
    pub async fn join_as_host(&mut self, session_id: &str, host_id: &str) {
        self.send_json(&ClientMessage::JoinSession {
            session_id: session_id.to_string(),
            user_id: host_id.to_string(),
            name: None,
            avatar: None,
        })
        .await;
    }
}

/// Spin up a published quiz, a lobby session, an attached host and one
/// joined participant. Most live-session tests open this way.
pub async fn setup_live_session(
    server: &TestServer,
    seconds: u32,
) -> (TestClient, TestClient, SessionView, Quiz) {
    let quiz = server.create_published_quiz("host-1", seconds).await;
    let session = server.create_session(&quiz.id, "host-1").await;

    let mut host = TestClient::connect(&server.ws_url()).await;
    host.join_as_host(&session.id, "host-1").await;

    let mut participant = TestClient::connect(&server.ws_url()).await;
    participant.join_session(&session.id, "user-1", "Ada").await;

    // Consume the participantJoined broadcast on the host channel
    let _: ServerMessage = host.recv_json().await;

    (host, participant, session, quiz)
}
