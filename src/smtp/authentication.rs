//! `AUTH LOGIN` credentials

use std::fmt::{self, Debug, Display, Formatter};

use crate::base64;

/// Contains user credentials
#[derive(PartialEq, Eq, Clone, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Credentials {
    authentication_identity: String,
    secret: String,
}

impl Credentials {
    /// Create a `Credentials` struct from username and password
    pub fn new(username: String, password: String) -> Credentials {
        Credentials {
            authentication_identity: username,
            secret: password,
        }
    }

    /// The account name, also used as the envelope sender
    pub fn identity(&self) -> &str {
        &self.authentication_identity
    }

    pub(crate) fn secret(&self) -> &str {
        &self.secret
    }
}

impl<S, T> From<(S, T)> for Credentials
where
    S: Into<String>,
    T: Into<String>,
{
    fn from((username, password): (S, T)) -> Self {
        Credentials::new(username.into(), password.into())
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("authentication_identity", &self.authentication_identity)
            .finish_non_exhaustive()
    }
}

/// Represents authentication mechanisms
#[derive(PartialEq, Eq, Copy, Clone, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mechanism {
    /// LOGIN authentication mechanism
    /// Obsolete but needed for some providers, and the only one the modem
    /// firmware flows are written for
    ///
    /// Defined in [draft-murchison-sasl-login-00](https://www.ietf.org/archive/id/draft-murchison-sasl-login-00.txt).
    Login,
}

impl Display for Mechanism {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Mechanism::Login => "LOGIN",
        })
    }
}

/// The two client turns of a LOGIN exchange, in order
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub(crate) enum LoginStep {
    Identity,
    Secret,
}

impl Mechanism {
    /// Returns the base64 line to send for the given step
    ///
    /// Steps are answered in order regardless of the challenge text, servers
    /// do not agree on the wording of `Username:`.
    pub(crate) fn response(self, credentials: &Credentials, step: LoginStep) -> String {
        match (self, step) {
            (Mechanism::Login, LoginStep::Identity) => {
                base64::encode(&credentials.authentication_identity)
            }
            (Mechanism::Login, LoginStep::Secret) => base64::encode(&credentials.secret),
        }
    }
}
