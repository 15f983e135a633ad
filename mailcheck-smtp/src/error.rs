//! Error types for the SMTP probe client.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse SMTP response: {0}")]
    Parse(String),

    #[error("SMTP error: {code} - {message}")]
    Response { code: u16, message: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    #[error("timed out waiting for a response")]
    Timeout,

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, SmtpError>;
