//! Email over a cellular modem
//!
//! `cellmail` sends plain-text email from a host that talks to a SIMCom
//! A76xx-class modem over a serial link. The modem does the networking: it
//! attaches to the cellular data network, terminates TLS, and exposes a
//! numbered socket-like channel driven by AT commands. This crate sequences
//! those commands and runs an SMTP dialogue (EHLO, `AUTH LOGIN`, MAIL, RCPT,
//! DATA, QUIT) through the channel.
//!
//! Every wait is bounded by a timeout, bring-up stages are retried as a whole,
//! and whatever was brought up is torn down again on every path.
//!
//! ## Usage
//!
//! ```rust
//! use cellmail::{at::mock::MockModem, ModemMailer};
//!
//! let modem = MockModem::new();
//! let mut mailer = ModemMailer::builder(modem.clone())
//!     .apn("internet")
//!     .relay("smtp.example.com", 465)
//!     .build();
//! mailer.set_auth("user@example.com", "app-pass");
//! mailer.set_recipient("dest@example.com", "Dest");
//! mailer.set_subject("Tank level");
//! mailer.set_body("Level is low.\nRefill soon.");
//!
//! match mailer.try_send_email() {
//!     Ok(response) => println!("accepted: {response}"),
//!     Err(err) => eprintln!("not sent: {err}"),
//! }
//! assert!(!modem.is_network_open());
//! ```
//!
//! With the `serialport` feature, `at::serial::SerialPortLink` drives a real
//! UART.
//!
//! ## Logging
//!
//! Events are emitted through `tracing`: the AT transcript at `debug`, stage
//! changes at `info`, swallowed teardown failures and retries at `warn`.
//! Credentials are never logged.
//!
//! ## Features
//!
//! * **serde**: (de)serialize the configuration types
//! * **serialport**: serial port back-end

#![doc(html_root_url = "https://docs.rs/crate/cellmail/0.1.0")]
#![forbid(unsafe_code)]
#![deny(
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    rust_2018_idioms,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod at;
mod base64;
pub mod channel;
pub mod config;
pub mod error;
pub mod mailer;
pub mod message;
pub mod pdp;
pub mod smtp;

pub use crate::{
    at::{AtClient, Cancellation, SerialLink},
    config::{AtTimeouts, PollTiming, RetryPolicy, SessionConfig, SmtpTimeouts},
    error::Error,
    mailer::{ModemMailer, ModemMailerBuilder},
};

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;
