use std::env;

/// Runtime configuration, read once from the environment at startup
/// (a local `.env` is loaded by main before this runs).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub ws_port: u16,
    pub http_port: u16,
    /// Upper bound for startQuizCountdown requests, in seconds.
    pub max_lobby_countdown: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            ws_port: env::var("WS_PORT")
                .unwrap_or_else(|_| "9002".to_string())
                .parse()
                .expect("Invalid WS_PORT"),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("Invalid HTTP_PORT"),
            max_lobby_countdown: env::var("MAX_LOBBY_COUNTDOWN")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .expect("Invalid MAX_LOBBY_COUNTDOWN"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            ws_port: 9002,
            http_port: 8080,
            max_lobby_countdown: 300,
        }
    }
}
