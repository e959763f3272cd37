//! Linear SMTP dialogue over a modem TLS channel

use std::{fmt::Display, time::Duration};

use tracing::{debug, info};

use crate::{
    at::SerialLink,
    channel::{extract_payload, LinkId, TlsChannel},
    config::SmtpTimeouts,
    error::{self, Error},
    smtp::{
        authentication::{Credentials, LoginStep, Mechanism},
        codec::escape_crlf,
        commands::{Auth, AuthResponse, Data, Ehlo, Mail, Quit, Rcpt},
        extension::ClientId,
        response::{parse_reply_line, Response},
    },
};

/// One message delivery: greeting, EHLO, `AUTH LOGIN`, envelope, DATA, QUIT
///
/// Each step waits for one reply and checks its code. The first mismatch or
/// timeout ends the session, no command is sent after it.
#[derive(Debug, Clone, Copy)]
pub struct SmtpSession<'a> {
    link: LinkId,
    hello_name: &'a ClientId,
    timeouts: &'a SmtpTimeouts,
    max_chunk: u16,
}

impl<'a> SmtpSession<'a> {
    /// Session on `link`, announcing `hello_name`
    pub fn new(link: LinkId, hello_name: &'a ClientId, timeouts: &'a SmtpTimeouts) -> Self {
        Self {
            link,
            hello_name,
            timeouts,
            max_chunk: 512,
        }
    }

    /// Sets the `<max>` argument of channel reads
    pub fn max_chunk(mut self, max_chunk: u16) -> Self {
        self.max_chunk = max_chunk;
        self
    }

    /// Delivers `message` to `recipient`, sent as `credentials`' identity
    ///
    /// `message` is the finished DATA payload, terminator included. Returns
    /// the reply accepting the message. QUIT is attempted afterwards, its
    /// outcome is only logged.
    pub fn run<L: SerialLink>(
        &self,
        channel: &mut TlsChannel<'_, L>,
        credentials: &Credentials,
        recipient: &str,
        message: &[u8],
    ) -> Result<Response, Error> {
        let t = self.timeouts;

        let greeting = self.expect(channel, 220, t.greeting)?;
        debug!(server = %greeting, "connected");

        self.command(channel, Ehlo::new(self.hello_name.clone()), 250, t.ehlo)?;

        let mechanism = Mechanism::Login;
        self.command(channel, Auth::new(mechanism), 334, t.auth)?;
        self.secret(
            channel,
            AuthResponse::new(mechanism, credentials, LoginStep::Identity),
            334,
            t.identity,
        )?;
        self.secret(
            channel,
            AuthResponse::new(mechanism, credentials, LoginStep::Secret),
            235,
            t.secret,
        )?;

        self.command(channel, Mail::new(credentials.identity()), 250, t.mail)?;
        self.command(channel, Rcpt::new(recipient), 250, t.rcpt)?;
        self.command(channel, Data, 354, t.data)?;

        debug!(">> <message, {} bytes>", message.len());
        channel.send(self.link, message)?;
        let accepted = self.expect(channel, 250, t.end_of_data)?;
        info!(reply = %accepted, "message accepted");

        self.quit(channel);
        Ok(accepted)
    }

    fn command<L: SerialLink, C: Display>(
        &self,
        channel: &mut TlsChannel<'_, L>,
        command: C,
        code: u16,
        timeout: Duration,
    ) -> Result<Response, Error> {
        let line = command.to_string();
        debug!(">> {line}");
        channel.send_line(self.link, &line)?;
        self.expect(channel, code, timeout)
    }

    fn secret<L: SerialLink>(
        &self,
        channel: &mut TlsChannel<'_, L>,
        response: AuthResponse,
        code: u16,
        timeout: Duration,
    ) -> Result<Response, Error> {
        debug!(">> <redacted>");
        channel.send_line(self.link, &response.to_string())?;
        self.expect(channel, code, timeout)
    }

    fn expect<L: SerialLink>(
        &self,
        channel: &mut TlsChannel<'_, L>,
        code: u16,
        timeout: Duration,
    ) -> Result<Response, Error> {
        let raw = channel.receive(self.link, self.max_chunk, timeout)?;
        let chunk = extract_payload(&raw).unwrap_or(raw.as_str());
        let response = check_reply(chunk, code)?;
        debug!("<< {response}");
        Ok(response)
    }

    fn quit<L: SerialLink>(&self, channel: &mut TlsChannel<'_, L>) {
        if let Err(err) = self.command(channel, Quit, 221, self.timeouts.quit) {
            debug!(error = %err, "no reply to QUIT");
        }
    }
}

/// Finds the reply line starting with `code` in a received chunk
///
/// Lines are trimmed, blank lines and AT envelope lines are skipped. Lines
/// following the match with the same code are collected into the message.
/// Without a match the first SMTP reply of the chunk decides the error.
pub(crate) fn check_reply(chunk: &str, code: u16) -> Result<Response, Error> {
    let expected = code.to_string();
    let mut first_reply = None;
    let mut lines = chunk.split('\n').map(str::trim).filter(|l| !l.is_empty());

    while let Some(line) = lines.next() {
        let Some((found, text)) = parse_reply_line(line) else {
            continue;
        };
        if line.starts_with(&expected) {
            let mut message = vec![text.to_owned()];
            for next in lines.by_ref() {
                match parse_reply_line(next) {
                    Some((c, text)) if c == found => message.push(text.to_owned()),
                    _ => break,
                }
            }
            return Ok(Response::new(found, message));
        }
        first_reply.get_or_insert((found, text));
    }

    Err(match first_reply {
        Some((found, text)) => error::code(found, Some(text.to_owned())),
        None => error::response(format!(
            "no {code} reply in \"{}\"",
            escape_crlf(chunk.trim())
        )),
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::check_reply;

    #[test]
    fn matching_line_is_found_after_envelope() {
        let chunk = "OK\r\n+CCHRECV: DATA,0,40\r\n220 smtp.example.com ESMTP\r\n+CCHRECV: 0,0\r\n";
        let response = check_reply(chunk, 220).unwrap();
        assert!(response.has_code(220));
        assert_eq!(response.first_line(), Some("smtp.example.com ESMTP"));
    }

    #[test]
    fn multiline_reply_is_collected() {
        let chunk = "250-smtp.example.com\r\n250-SIZE 35882577\r\n250 AUTH LOGIN PLAIN\r\n";
        let response = check_reply(chunk, 250).unwrap();
        assert_eq!(
            response.message().collect::<Vec<_>>(),
            vec!["smtp.example.com", "SIZE 35882577", "AUTH LOGIN PLAIN"]
        );
    }

    #[test]
    fn other_code_becomes_smtp_error() {
        let err = check_reply("535 5.7.8 Username and Password not accepted\r\n", 235).unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(err.status().map(u16::from), Some(535));

        let err = check_reply("451 4.3.0 try later\r\n", 250).unwrap_err();
        assert!(err.is_transient());

        let err = check_reply("250 OK\r\n", 354).unwrap_err();
        assert!(err.is_response());
    }

    #[test]
    fn text_may_follow_the_code_directly() {
        let response = check_reply("+CCHRECV: DATA,0,7\r\n250OK\r\n", 250).unwrap();
        assert!(response.has_code(250));
        assert_eq!(response.first_line(), Some("OK"));
    }

    #[test]
    fn chunk_without_reply() {
        let err = check_reply("\r\nOK\r\n", 250).unwrap_err();
        assert!(err.is_response());
        assert_eq!(err.to_string(), "response error: no 250 reply in \"OK\"");
    }
}
