use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("notification API error (status {status}): {msg}")]
    NotificationApi { status: u16, msg: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
