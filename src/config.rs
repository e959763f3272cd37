//! Session settings, retry policy and timing tables
//!
//! With the `serde` feature every type here (de)serializes, durations as
//! integer milliseconds, so settings stored as JSON can be fed in directly.

use std::{
    fmt::{self, Debug, Formatter},
    time::Duration,
};

use tracing::warn;

use crate::{
    at::Cancellation,
    error::{self, Error, Stage},
    message,
    smtp::{authentication::Credentials, SUBMISSIONS_PORT},
};

/// Relay used when none is configured
pub const DEFAULT_RELAY: &str = "smtp.gmail.com";

/// Everything needed to compose and address one message
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct SessionConfig {
    /// Access point name, empty to keep the modem's stored context
    pub apn: String,
    /// SMTP relay host, reached over implicit TLS
    pub host: String,
    /// SMTP relay port
    pub port: u16,
    /// Login account, also the envelope and header sender
    pub account: String,
    /// App password or other secret for `AUTH LOGIN`
    pub credential: String,
    /// Envelope recipient
    pub recipient: String,
    /// Display name for the `To` header
    pub recipient_name: String,
    /// Display name for the `From` header
    pub sender_name: String,
    /// Subject line
    pub subject: String,
    #[cfg_attr(feature = "serde", serde(deserialize_with = "normalized_body"))]
    body: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            apn: String::new(),
            host: DEFAULT_RELAY.to_owned(),
            port: SUBMISSIONS_PORT,
            account: String::new(),
            credential: String::new(),
            recipient: String::new(),
            recipient_name: String::new(),
            sender_name: String::new(),
            subject: String::new(),
            body: String::new(),
        }
    }
}

impl Debug for SessionConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("apn", &self.apn)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("account", &self.account)
            .field("credential", &"<redacted>")
            .field("recipient", &self.recipient)
            .field("recipient_name", &self.recipient_name)
            .field("sender_name", &self.sender_name)
            .field("subject", &self.subject)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl SessionConfig {
    /// Message text, line breaks already CRLF
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Replaces the message text, normalizing its line breaks
    pub fn set_body(&mut self, body: impl AsRef<str>) {
        self.body = message::normalize_line_breaks(body.as_ref());
    }

    /// Fails when a field needed before any modem traffic is missing
    pub fn validate(&self) -> Result<(), Error> {
        let missing = [
            ("account", self.account.is_empty()),
            ("credential", self.credential.is_empty()),
            ("recipient", self.recipient.is_empty()),
            ("host", self.host.is_empty()),
            ("port", self.port == 0),
        ];
        match missing.iter().find(|(_, empty)| *empty) {
            Some((field, _)) => Err(error::config(format!("missing {field}"))),
            None => Ok(()),
        }
    }

    /// The `AUTH LOGIN` pair
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.account.clone(), self.credential.clone())
    }
}

#[cfg(feature = "serde")]
fn normalized_body<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let body = <String as serde::Deserialize>::deserialize(deserializer)?;
    Ok(message::normalize_line_breaks(&body))
}

#[cfg(feature = "serde")]
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// How often a failed bring-up sequence is run again from its first command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Pause between attempts
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Runs `attempt` until it succeeds or attempts run out
    ///
    /// The final error is wrapped as a bring-up failure of `stage`.
    /// Cancellation ends the loop at once.
    pub(crate) fn run<T, F>(&self, stage: Stage, cancel: &Cancellation, mut attempt: F) -> Result<T, Error>
    where
        F: FnMut() -> Result<T, Error>,
    {
        let attempts = self.attempts.max(1);
        let mut n = 1;
        loop {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_cancelled() || n >= attempts => {
                    return Err(error::bring_up(stage, err));
                }
                Err(err) => {
                    warn!(%stage, attempt = n, attempts, error = %err, "attempt failed, retrying");
                }
            }
            cancel
                .pause(self.delay)
                .map_err(|err| error::bring_up(stage, err))?;
            n += 1;
        }
    }
}

/// Pacing of the channel receive poll and other short waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct PollTiming {
    /// Sleep between two reads of the serial link
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub tick: Duration,
    /// Spacing of `AT+CCHRECV` polls
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub interval: Duration,
    /// How long the reply to one poll is read
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub read_window: Duration,
    /// Extra read once the data marker was seen
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub settle: Duration,
    /// Pause after a channel was opened
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub open_settle: Duration,
    /// `<max>` argument of `AT+CCHRECV`
    pub max_chunk: u16,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
            interval: Duration::from_millis(300),
            read_window: Duration::from_millis(150),
            settle: Duration::from_millis(20),
            open_settle: Duration::from_millis(200),
            max_chunk: 512,
        }
    }
}

/// Deadlines for AT command exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct AtTimeouts {
    /// Any command without a dedicated deadline
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub command: Duration,
    /// `AT+NETOPEN`
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub network_open: Duration,
    /// `AT+NETCLOSE`
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub network_close: Duration,
    /// `AT+CCHSTART`
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub tls_start: Duration,
    /// `AT+CCHOPEN`
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub channel_open: Duration,
    /// `>` prompt after `AT+CCHSEND`
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub send_prompt: Duration,
    /// `OK` after the payload of `AT+CCHSEND`
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub send_ack: Duration,
}

impl Default for AtTimeouts {
    fn default() -> Self {
        Self {
            command: Duration::from_secs(10),
            network_open: Duration::from_secs(20),
            network_close: Duration::from_secs(10),
            tls_start: Duration::from_secs(8),
            channel_open: Duration::from_secs(15),
            send_prompt: Duration::from_secs(8),
            send_ack: Duration::from_secs(8),
        }
    }
}

impl AtTimeouts {
    /// Same deadline everywhere, mostly for tests against a fast modem
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            command: timeout,
            network_open: timeout,
            network_close: timeout,
            tls_start: timeout,
            channel_open: timeout,
            send_prompt: timeout,
            send_ack: timeout,
        }
    }
}

/// Deadlines for each SMTP reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct SmtpTimeouts {
    /// 220 greeting
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub greeting: Duration,
    /// 250 after EHLO
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub ehlo: Duration,
    /// 334 after AUTH LOGIN
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub auth: Duration,
    /// 334 after the account
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub identity: Duration,
    /// 235 after the secret
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub secret: Duration,
    /// 250 after MAIL FROM
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub mail: Duration,
    /// 250 after RCPT TO
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub rcpt: Duration,
    /// 354 after DATA
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub data: Duration,
    /// 250 after the message terminator
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub end_of_data: Duration,
    /// 221 after QUIT
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub quit: Duration,
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            greeting: Duration::from_secs(15),
            ehlo: Duration::from_secs(10),
            auth: Duration::from_secs(8),
            identity: Duration::from_secs(8),
            secret: Duration::from_secs(10),
            mail: Duration::from_secs(8),
            rcpt: Duration::from_secs(8),
            data: Duration::from_secs(8),
            end_of_data: Duration::from_secs(12),
            quit: Duration::from_secs(5),
        }
    }
}

impl SmtpTimeouts {
    /// Same deadline for every reply
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            greeting: timeout,
            ehlo: timeout,
            auth: timeout,
            identity: timeout,
            secret: timeout,
            mail: timeout,
            rcpt: timeout,
            data: timeout,
            end_of_data: timeout,
            quit: timeout,
        }
    }
}
