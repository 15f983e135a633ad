//! A bare SMTP client connection used to drive the verification probe.
//!
//! Unlike a full client library this only ever speaks the fixed
//! EHLO/HELO → MAIL FROM → RCPT TO → QUIT dialogue the probe needs, with an
//! optional STARTTLS upgrade partway through.

use std::sync::Arc;
use std::time::Duration;

use mailcheck_common::tracing;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use crate::error::{Result, SmtpError};
use crate::response::Response;

const BUFFER_SIZE: usize = 8192;
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

enum ClientConnection {
    Plain(TcpStream),
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(SmtpError::ConnectionClosed);
        }
        Ok(n)
    }

    /// Upgrades a plain connection via STARTTLS, pinned to TLS 1.3 with
    /// certificate verification disabled (per the probe's contract — we're
    /// testing deliverability, not authenticity) and SNI set to `domain`.
    async fn upgrade_to_tls(self, domain: &str) -> Result<Self> {
        match self {
            Self::Plain(stream) => {
                let config = ClientConfig::builder_with_protocol_versions(&[
                    &tokio_rustls::rustls::version::TLS13,
                ])
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth();

                let connector = TlsConnector::from(Arc::new(config));
                let server_name = ServerName::try_from(domain.to_string())
                    .map_err(|e| SmtpError::Tls(format!("invalid domain for SNI: {e}")))?;

                let tls_stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| SmtpError::Tls(e.to_string()))?;

                Ok(Self::Tls(tls_stream))
            }
            Self::Tls(_) => Err(SmtpError::Tls("connection is already TLS".to_string())),
        }
    }
}

/// Accepts any certificate. The probe is measuring deliverability, not
/// verifying server identity, so a self-signed or expired certificate on the
/// remote MX must not abort the check.
#[derive(Debug)]
struct NoVerifier;

impl tokio_rustls::rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[tokio_rustls::rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: tokio_rustls::rustls::pki_types::UnixTime,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::ServerCertVerified,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<tokio_rustls::rustls::SignatureScheme> {
        vec![
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA256,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            tokio_rustls::rustls::SignatureScheme::ED25519,
        ]
    }
}

/// A single connection to one MX host, driving exactly one probe session.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    responses: Vec<Response>,
    server_domain: String,
}

impl SmtpClient {
    /// Opens a TCP connection to `addr`, bounded by `connect_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SmtpError::Timeout`] if the connection doesn't complete in
    /// time, or [`SmtpError::Io`] on a connection-level failure.
    pub async fn connect(addr: &str, server_domain: String, connect_timeout: Duration) -> Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SmtpError::Timeout)??;

        Ok(Self {
            connection: Some(ClientConnection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            responses: Vec::new(),
            server_domain,
        })
    }

    /// Reads the initial `220` server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self, read_timeout: Duration) -> Result<Response> {
        self.read_response(read_timeout).await
    }

    async fn send_command(&mut self, command: &str) -> Result<()> {
        mailcheck_common::outgoing!("{} -> {command}", self.server_domain);
        let data = format!("{command}\r\n");
        self.connection
            .as_mut()
            .ok_or(SmtpError::ConnectionClosed)?
            .send(data.as_bytes())
            .await
    }

    async fn command(&mut self, command: &str, read_timeout: Duration) -> Result<Response> {
        self.send_command(command).await?;
        self.read_response(read_timeout).await
    }

    pub async fn ehlo(&mut self, domain: &str, read_timeout: Duration) -> Result<Response> {
        self.command(&format!("EHLO {domain}"), read_timeout).await
    }

    pub async fn helo(&mut self, domain: &str, read_timeout: Duration) -> Result<Response> {
        self.command(&format!("HELO {domain}"), read_timeout).await
    }

    pub async fn mail_from(&mut self, from: &str, read_timeout: Duration) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>"), read_timeout).await
    }

    pub async fn rcpt_to(&mut self, to: &str, read_timeout: Duration) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>"), read_timeout).await
    }

    /// Sends STARTTLS and, on success, upgrades the connection in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the TLS handshake fails.
    pub async fn starttls(&mut self, read_timeout: Duration) -> Result<Response> {
        let response = self.command("STARTTLS", read_timeout).await?;

        if response.is_success() {
            let domain = self.server_domain.clone();
            let old = self.connection.take().ok_or(SmtpError::ConnectionClosed)?;
            self.connection = Some(old.upgrade_to_tls(&domain).await?);
        }

        Ok(response)
    }

    pub async fn quit(&mut self, read_timeout: Duration) -> Result<Response> {
        self.command("QUIT", read_timeout).await
    }

    #[must_use]
    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    async fn read_response(&mut self, read_timeout: Duration) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;
                mailcheck_common::incoming!("{} <- {} {}", self.server_domain, response.code, response.message());
                self.responses.push(response.clone());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(SmtpError::Parse(format!(
                        "response exceeds {MAX_BUFFER_SIZE} bytes"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self.connection.as_mut().ok_or(SmtpError::ConnectionClosed)?;
            let n = timeout(read_timeout, connection.read(&mut self.buffer[self.buffer_pos..]))
                .await
                .map_err(|_| SmtpError::Timeout)??;
            self.buffer_pos += n;
        }
    }
}

impl Drop for SmtpClient {
    fn drop(&mut self) {
        if self.connection.is_some() {
            tracing::trace!(domain = %self.server_domain, "smtp connection dropped without a clean QUIT");
        }
    }
}
