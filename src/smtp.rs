//! The SMTP dialogue run through the modem's TLS channel
//!
//! It implements the following extensions:
//!
//! * AUTH ([RFC 4954](https://tools.ietf.org/html/rfc4954)) with the LOGIN mechanism
//!
//! The modem terminates TLS itself, so the relay is reached on its implicit
//! TLS submission port. SMTP runs unencrypted between host and modem.
//!
//! Replies are read one chunk per step. A step succeeds when a trimmed line of
//! the chunk starts with the expected code.

pub mod authentication;
pub mod codec;
pub mod commands;
pub mod extension;
pub mod response;
mod session;

pub use self::session::SmtpSession;

/// Default smtp port
pub const SMTP_PORT: u16 = 25;
/// Default submission port
pub const SUBMISSION_PORT: u16 = 587;
/// Default submission over TLS port
///
/// Defined in [RFC8314](https://tools.ietf.org/html/rfc8314)
pub const SUBMISSIONS_PORT: u16 = 465;
