//! Error and result type for modem mail delivery

use std::{error::Error as StdError, fmt};

use crate::{
    smtp::response::{Code, Severity},
    BoxError,
};

/// Resource that has to be brought up before SMTP can run
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stage {
    /// Cellular data (PDP) context
    Network,
    /// Modem-side TLS stack
    Tls,
    /// TLS-wrapped socket to the relay
    Channel,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Stage::Network => "network bring-up",
            Stage::Tls => "tls start",
            Stage::Channel => "channel open",
        })
    }
}

/// The errors that may occur when sending an email through the modem
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
            }),
        }
    }

    /// Returns true if the session configuration was incomplete
    pub fn is_config(&self) -> bool {
        matches!(self.inner.kind, Kind::Config)
    }

    /// Returns true if a bring-up stage failed after exhausting its attempts
    pub fn is_bring_up(&self) -> bool {
        matches!(self.inner.kind, Kind::BringUp(_))
    }

    /// The bring-up stage that failed, if any
    pub fn stage(&self) -> Option<Stage> {
        match self.inner.kind {
            Kind::BringUp(stage) => Some(stage),
            _ => None,
        }
    }

    /// Returns true if the error is caused by a timeout, at any depth
    pub fn is_timeout(&self) -> bool {
        if matches!(self.inner.kind, Kind::Timeout) {
            return true;
        }

        let mut source = self.source();
        while let Some(err) = source {
            if let Some(err) = err.downcast_ref::<Error>() {
                if matches!(err.inner.kind, Kind::Timeout) {
                    return true;
                }
            }
            if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
                return io_err.kind() == std::io::ErrorKind::TimedOut;
            }
            source = err.source();
        }

        false
    }

    /// Returns true if the operation was interrupted through a `Cancellation`
    pub fn is_cancelled(&self) -> bool {
        if matches!(self.inner.kind, Kind::Cancelled) {
            return true;
        }
        self.source()
            .and_then(|err| err.downcast_ref::<Error>())
            .is_some_and(Error::is_cancelled)
    }

    /// Returns true if the modem answered a command with an error
    pub fn is_modem(&self) -> bool {
        matches!(self.inner.kind, Kind::Modem)
    }

    /// Returns true if the error is from an SMTP reply that could not be used
    pub fn is_response(&self) -> bool {
        matches!(self.inner.kind, Kind::Response)
    }

    /// Returns true if the error is a transient SMTP error
    pub fn is_transient(&self) -> bool {
        matches!(self.inner.kind, Kind::Transient(_))
    }

    /// Returns true if the error is a permanent SMTP error
    pub fn is_permanent(&self) -> bool {
        matches!(self.inner.kind, Kind::Permanent(_))
    }

    /// Returns true if the serial link itself failed
    pub fn is_io(&self) -> bool {
        matches!(self.inner.kind, Kind::Io)
    }

    /// Returns the status code, if the error was generated from a response.
    pub fn status(&self) -> Option<Code> {
        match self.inner.kind {
            Kind::Transient(code) | Kind::Permanent(code) => Some(code),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum Kind {
    /// Required session field missing
    Config,
    /// Bring-up stage failed, all attempts used
    BringUp(Stage),
    /// Expected token did not arrive in time
    Timeout,
    /// Wait interrupted by a `Cancellation`
    Cancelled,
    /// Modem answered with an error result code
    Modem,
    /// Transient SMTP error, 4xx reply code
    ///
    /// [RFC 5321, section 4.2.1](https://tools.ietf.org/html/rfc5321#section-4.2.1)
    Transient(Code),
    /// Permanent SMTP error, 5xx reply code
    ///
    /// [RFC 5321, section 4.2.1](https://tools.ietf.org/html/rfc5321#section-4.2.1)
    Permanent(Code),
    /// Missing or unexpected SMTP reply
    Response,
    /// Serial link i/o error
    Io,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("cellmail::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.kind {
            Kind::Config => f.write_str("configuration error")?,
            Kind::BringUp(stage) => write!(f, "{stage} failed")?,
            Kind::Timeout => f.write_str("timed out")?,
            Kind::Cancelled => f.write_str("cancelled")?,
            Kind::Modem => f.write_str("modem error")?,
            Kind::Transient(ref code) => {
                write!(f, "transient error ({code})")?;
            }
            Kind::Permanent(ref code) => {
                write!(f, "permanent error ({code})")?;
            }
            Kind::Response => f.write_str("response error")?,
            Kind::Io => f.write_str("serial link error")?,
        };

        if let Some(ref e) = self.inner.source {
            write!(f, ": {e}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| {
            let r: &(dyn std::error::Error + 'static) = &**e;
            r
        })
    }
}

pub(crate) fn code(c: Code, s: Option<String>) -> Error {
    match c.severity {
        Severity::TransientNegativeCompletion => Error::new(Kind::Transient(c), s),
        Severity::PermanentNegativeCompletion => Error::new(Kind::Permanent(c), s),
        _ => response(format!(
            "unexpected reply {c} {}",
            s.as_deref().unwrap_or_default()
        )),
    }
}

pub(crate) fn config<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Config, Some(e))
}

pub(crate) fn bring_up(stage: Stage, e: Error) -> Error {
    Error::new(Kind::BringUp(stage), Some(e))
}

pub(crate) fn timeout<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Timeout, Some(e))
}

pub(crate) fn cancelled() -> Error {
    Error::new(Kind::Cancelled, None::<BoxError>)
}

pub(crate) fn modem<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Modem, Some(e))
}

pub(crate) fn response<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Response, Some(e))
}

pub(crate) fn io(e: std::io::Error) -> Error {
    Error::new(Kind::Io, Some(e))
}
