use lettre::{
    Message, SmtpTransport, Transport,
    address::AddressError,
    message::{Mailbox, header::ContentType},
};
use thiserror::Error;
use tracing::info;

use crate::domain::DigestFormat;

pub const SMTP_HOST: &str = "localhost";
pub const SMTP_PORT: u16 = 25;
pub const FROM_ADDRESS: &str = "github-notifications@local";
pub const SUBJECT: &str = "Some Github issues need attention";

pub trait DigestMailer {
    fn deliver(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        format: DigestFormat,
    ) -> Result<(), DeliveryError>;
}

/// Unauthenticated, unencrypted submission to the local relay.
pub struct LocalRelay {
    transport: SmtpTransport,
}

impl LocalRelay {
    pub fn new() -> Self {
        Self {
            transport: SmtpTransport::builder_dangerous(SMTP_HOST)
                .port(SMTP_PORT)
                .build(),
        }
    }
}

impl DigestMailer for LocalRelay {
    fn deliver(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        format: DigestFormat,
    ) -> Result<(), DeliveryError> {
        let message = build_message(to, subject, body, format)?;
        self.transport.send(&message)?;
        info!("digest sent to {to} via {SMTP_HOST}:{SMTP_PORT}");
        Ok(())
    }
}

pub fn build_message(
    to: &str,
    subject: &str,
    body: &str,
    format: DigestFormat,
) -> Result<Message, DeliveryError> {
    let from: Mailbox = FROM_ADDRESS.parse()?;
    let to: Mailbox = to.parse()?;
    let content_type = match format {
        DigestFormat::Html => ContentType::TEXT_HTML,
        DigestFormat::Text | DigestFormat::Plain => ContentType::TEXT_PLAIN,
    };

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(content_type)
        .body(body.to_owned())
        .map_err(DeliveryError::Build)
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Invalid email address: {0}")]
    Address(#[from] AddressError),
    #[error("Failed to build email: {0}")]
    Build(lettre::error::Error),
    #[error("SMTP submission to the local relay failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}
