//! SMTP commands
//!
//! Lines are rendered without their CRLF, the channel's `send_line` adds it.

use std::fmt::{self, Debug, Display, Formatter};

use crate::smtp::{
    authentication::{Credentials, LoginStep, Mechanism},
    extension::ClientId,
};

/// EHLO command
#[derive(PartialEq, Eq, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ehlo {
    client_id: ClientId,
}

impl Display for Ehlo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "EHLO {}", self.client_id)
    }
}

impl Ehlo {
    /// Creates a EHLO command
    pub fn new(client_id: ClientId) -> Ehlo {
        Ehlo { client_id }
    }
}

/// AUTH command, without initial response
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Auth {
    mechanism: Mechanism,
}

impl Display for Auth {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AUTH {}", self.mechanism)
    }
}

impl Auth {
    /// Creates an AUTH command
    pub fn new(mechanism: Mechanism) -> Auth {
        Auth { mechanism }
    }
}

/// Base64 answer to an authentication challenge
#[derive(PartialEq, Eq, Clone)]
pub struct AuthResponse {
    encoded: String,
}

impl Display for AuthResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl Debug for AuthResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("AuthResponse(<redacted>)")
    }
}

impl AuthResponse {
    pub(crate) fn new(
        mechanism: Mechanism,
        credentials: &Credentials,
        step: LoginStep,
    ) -> AuthResponse {
        AuthResponse {
            encoded: mechanism.response(credentials, step),
        }
    }
}

/// MAIL command
#[derive(PartialEq, Eq, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mail {
    sender: String,
}

impl Display for Mail {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "MAIL FROM:<{}>", self.sender)
    }
}

impl Mail {
    /// Creates a MAIL command
    pub fn new(sender: impl Into<String>) -> Mail {
        Mail {
            sender: sender.into(),
        }
    }
}

/// RCPT command
#[derive(PartialEq, Eq, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rcpt {
    recipient: String,
}

impl Display for Rcpt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RCPT TO:<{}>", self.recipient)
    }
}

impl Rcpt {
    /// Creates an RCPT command
    pub fn new(recipient: impl Into<String>) -> Rcpt {
        Rcpt {
            recipient: recipient.into(),
        }
    }
}

/// DATA command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Data;

impl Display for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("DATA")
    }
}

/// QUIT command
#[derive(PartialEq, Eq, Clone, Debug, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quit;

impl Display for Quit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("QUIT")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display() {
        let id = ClientId::Domain("localhost".to_owned());
        assert_eq!(format!("{}", Ehlo::new(id)), "EHLO localhost");
        assert_eq!(format!("{}", Auth::new(Mechanism::Login)), "AUTH LOGIN");
        assert_eq!(
            format!("{}", Mail::new("user@example.com")),
            "MAIL FROM:<user@example.com>"
        );
        assert_eq!(
            format!("{}", Rcpt::new("dest@example.com")),
            "RCPT TO:<dest@example.com>"
        );
        assert_eq!(format!("{Data}"), "DATA");
        assert_eq!(format!("{Quit}"), "QUIT");
    }

    #[test]
    fn auth_response_is_base64_and_redacted() {
        let credentials = Credentials::from(("user@example.com", "app-pass"));
        let secret = AuthResponse::new(Mechanism::Login, &credentials, LoginStep::Secret);
        assert_eq!(secret.to_string(), "YXBwLXBhc3M=");
        assert_eq!(format!("{secret:?}"), "AuthResponse(<redacted>)");
    }
}
