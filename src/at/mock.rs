//! Scripted in-memory modem
//!
//! [`MockModem`] answers the AT commands used by this crate the way an A76xx
//! does, and runs a small SMTP server behind its TLS channel. Clones share
//! state, so one clone can be handed to a mailer and another kept for
//! inspection.

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{at::SerialLink, base64};

/// SMTP replies of the built-in server, keyed by step
const GREETING: &str = "220 mock.example.com ESMTP ready";
const EHLO: &str = "250-mock.example.com\r\n250 AUTH LOGIN PLAIN";
const AUTH: &str = "334 VXNlcm5hbWU6";
const IDENTITY: &str = "334 UGFzc3dvcmQ6";
const SECRET: &str = "235 2.7.0 Accepted";
const MAIL: &str = "250 2.1.0 OK";
const RCPT: &str = "250 2.1.5 OK";
const DATA: &str = "354 Go ahead";
const MESSAGE: &str = "250 2.0.0 OK queued";
const QUIT: &str = "221 2.0.0 Bye";
const UNKNOWN: &str = "502 5.5.1 Unrecognized command";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SmtpStage {
    #[default]
    Command,
    Identity,
    Secret,
    Message,
}

#[derive(Debug, Default)]
struct State {
    line: Vec<u8>,
    output: VecDeque<u8>,
    commands: Vec<String>,
    bytes_written: usize,

    network_open: bool,
    tls_started: bool,
    channel_open: bool,
    link: String,
    pending_send: Option<usize>,
    payload: Vec<u8>,
    inbox: VecDeque<u8>,

    rejects: Vec<String>,
    ignores: Vec<String>,
    withhold_prompt: bool,
    push_data: bool,

    stage: SmtpStage,
    overrides: Vec<(String, String)>,
    smtp_commands: Vec<String>,
    message: Vec<u8>,
    messages: Vec<Vec<u8>>,
    identity: Option<String>,
    secret: Option<String>,
}

/// In-memory modem implementing [`SerialLink`]
#[derive(Clone, Debug, Default)]
pub struct MockModem {
    state: Arc<Mutex<State>>,
}

/// Builder for a [`MockModem`] with faults injected
#[derive(Debug, Default)]
pub struct MockModemBuilder {
    state: State,
}

impl MockModemBuilder {
    /// Commands starting with `prefix` are answered with `ERROR`
    pub fn reject(mut self, prefix: &str) -> Self {
        self.state.rejects.push(prefix.to_owned());
        self
    }

    /// Commands starting with `prefix` get no answer at all
    pub fn ignore(mut self, prefix: &str) -> Self {
        self.state.ignores.push(prefix.to_owned());
        self
    }

    /// `AT+CCHSEND` is never answered with the `>` prompt
    pub fn withhold_prompt(mut self) -> Self {
        self.state.withhold_prompt = true;
        self
    }

    /// Replaces the SMTP reply of one step
    ///
    /// Steps are `GREETING`, `EHLO`, `AUTH`, `IDENTITY`, `SECRET`, `MAIL`,
    /// `RCPT`, `DATA`, `MESSAGE` and `QUIT`. An empty reply makes the server
    /// stay silent. After an overridden step the server expects a command.
    pub fn smtp_reply(mut self, step: &str, reply: &str) -> Self {
        self.state
            .overrides
            .push((step.to_ascii_uppercase(), reply.to_owned()));
        self
    }

    /// The data context is already up, `AT+NETOPEN` answers with an error
    pub fn network_already_open(mut self) -> Self {
        self.state.network_open = true;
        self
    }

    /// The TLS service was left running, `AT+CCHSTART` answers with an error
    /// until `AT+CCHSTOP`
    pub fn tls_already_started(mut self) -> Self {
        self.state.tls_started = true;
        self
    }

    /// Channel data is appended to the answer that produced it instead of
    /// waiting for `AT+CCHRECV`
    pub fn push_data(mut self) -> Self {
        self.state.push_data = true;
        self
    }

    /// Builds the modem
    pub fn build(self) -> MockModem {
        MockModem {
            state: Arc::new(Mutex::new(self.state)),
        }
    }
}

impl MockModem {
    /// A modem accepting everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder
    pub fn builder() -> MockModemBuilder {
        MockModemBuilder::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every AT command line received, in order
    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    /// Number of AT commands starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.state()
            .commands
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// SMTP command lines received over the channel, credentials left out
    pub fn smtp_commands(&self) -> Vec<String> {
        self.state().smtp_commands.clone()
    }

    /// Complete DATA payloads received, terminator included
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.state().messages.clone()
    }

    /// Decoded `AUTH LOGIN` identity and secret, once both were received
    pub fn authenticated_as(&self) -> Option<(String, String)> {
        let state = self.state();
        let decode = |value: &Option<String>| {
            value
                .as_deref()
                .and_then(|v| base64::decode(v).ok())
                .and_then(|v| String::from_utf8(v).ok())
        };
        Some((decode(&state.identity)?, decode(&state.secret)?))
    }

    /// Tells if the data context is up
    pub fn is_network_open(&self) -> bool {
        self.state().network_open
    }

    /// Tells if the TLS service is running
    pub fn is_tls_started(&self) -> bool {
        self.state().tls_started
    }

    /// Tells if the channel is connected
    pub fn is_channel_open(&self) -> bool {
        self.state().channel_open
    }

    /// Total bytes written to the modem
    pub fn bytes_written(&self) -> usize {
        self.state().bytes_written
    }

    /// Queues unsolicited bytes for the next read
    pub fn inject(&self, bytes: &[u8]) {
        self.state().output.extend(bytes);
    }
}

impl SerialLink for MockModem {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        state.bytes_written += bytes.len();
        let mut rest = bytes;
        while !rest.is_empty() {
            if let Some(remaining) = state.pending_send {
                let n = remaining.min(rest.len());
                state.payload.extend_from_slice(&rest[..n]);
                rest = &rest[n..];
                if n == remaining {
                    state.pending_send = None;
                    let payload = std::mem::take(&mut state.payload);
                    state.smtp_input(&payload);
                    state.respond("\r\nOK\r\n");
                    state.push_inbox();
                } else {
                    state.pending_send = Some(remaining - n);
                }
                continue;
            }

            let byte = rest[0];
            rest = &rest[1..];
            if byte == b'\n' {
                let line = std::mem::take(&mut state.line);
                let line = String::from_utf8_lossy(&line).trim().to_owned();
                if !line.is_empty() {
                    state.at_command(&line);
                }
            } else {
                state.line.push(byte);
            }
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        let n = buf.len().min(state.output.len());
        for (slot, byte) in buf.iter_mut().zip(state.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

fn argument(command: &str, index: usize) -> Option<&str> {
    command
        .split_once('=')
        .and_then(|(_, args)| args.split(',').nth(index))
        .map(str::trim)
}

impl State {
    fn respond(&mut self, text: &str) {
        self.output.extend(text.as_bytes());
    }

    fn at_command(&mut self, command: &str) {
        self.commands.push(command.to_owned());

        if self.ignores.iter().any(|p| command.starts_with(p.as_str())) {
            return;
        }
        if self.rejects.iter().any(|p| command.starts_with(p.as_str())) {
            self.respond("\r\nERROR\r\n");
            return;
        }

        let link = argument(command, 0).unwrap_or("0").to_owned();
        match command.split('=').next().unwrap_or_default() {
            "AT" | "ATE0" | "ATE1" | "AT+CMEE" | "AT+CGDCONT" | "AT+CSOCKSETPN" | "AT+CSSLCFG" => {
                self.respond("\r\nOK\r\n")
            }
            "AT+NETOPEN" if self.network_open => {
                self.respond("\r\n+IP ERROR: Network is already opened\r\n\r\nERROR\r\n")
            }
            "AT+NETOPEN" => {
                self.network_open = true;
                self.respond("\r\nOK\r\n\r\n+NETOPEN: 0\r\n");
            }
            "AT+NETCLOSE" if self.network_open => {
                self.network_open = false;
                self.respond("\r\nOK\r\n\r\n+NETCLOSE: 0\r\n");
            }
            "AT+NETCLOSE" => self.respond("\r\n+NETCLOSE: 2\r\n\r\nERROR\r\n"),
            "AT+CCHSTART" if self.tls_started => self.respond("\r\nERROR\r\n"),
            "AT+CCHSTART" => {
                self.tls_started = true;
                self.respond("\r\nOK\r\n\r\n+CCHSTART: 0\r\n");
            }
            "AT+CCHSTOP" => {
                self.tls_started = false;
                self.respond("\r\nOK\r\n\r\n+CCHSTOP: 0\r\n");
            }
            "AT+CCHOPEN" if self.tls_started && self.network_open => {
                self.channel_open = true;
                self.link = link.clone();
                self.stage = SmtpStage::Command;
                self.inbox.clear();
                self.reply("GREETING", GREETING);
                self.respond(&format!("\r\nOK\r\n\r\n+CCHOPEN: {link},0\r\n"));
                self.push_inbox();
            }
            "AT+CCHOPEN" => self.respond(&format!("\r\nOK\r\n\r\n+CCHOPEN: {link},4\r\n")),
            "AT+CCHSEND" if self.channel_open => {
                if !self.withhold_prompt {
                    let len = argument(command, 1)
                        .and_then(|n| n.parse().ok())
                        .unwrap_or(0);
                    self.pending_send = Some(len);
                    self.respond("\r\n>");
                }
            }
            "AT+CCHRECV" if self.channel_open => {
                let max = argument(command, 1)
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(512usize);
                self.respond("\r\nOK\r\n");
                self.recv_block(max);
            }
            "AT+CCHCLOSE" if self.channel_open => {
                self.channel_open = false;
                self.respond(&format!("\r\nOK\r\n\r\n+CCHCLOSE: {link},0\r\n"));
            }
            _ => self.respond("\r\nERROR\r\n"),
        }
    }

    /// Moves up to `max` inbox bytes to the output as a `+CCHRECV` block
    fn recv_block(&mut self, max: usize) {
        let n = max.min(self.inbox.len());
        if n == 0 {
            return;
        }
        let link = self.link.clone();
        let data: Vec<u8> = self.inbox.drain(..n).collect();
        self.respond(&format!("\r\n+CCHRECV: DATA,{link},{n}\r\n"));
        self.output.extend(data);
        self.respond(&format!("\r\n+CCHRECV: {link},0\r\n"));
    }

    fn push_inbox(&mut self) {
        if self.push_data && self.channel_open {
            self.recv_block(usize::MAX);
        }
    }

    /// Queues a server reply in the channel inbox, honoring overrides
    ///
    /// Returns false when an override replaced the default reply.
    fn reply(&mut self, step: &str, default: &str) -> bool {
        let overridden = self
            .overrides
            .iter()
            .find(|(s, _)| s == step)
            .map(|(_, reply)| reply.clone());
        let (text, is_default) = match overridden {
            Some(reply) => (reply, false),
            None => (default.to_owned(), true),
        };
        if !text.is_empty() {
            self.inbox.extend(text.as_bytes());
            if !text.ends_with("\r\n") {
                self.inbox.extend(b"\r\n");
            }
        }
        is_default
    }

    fn smtp_input(&mut self, payload: &[u8]) {
        if self.stage == SmtpStage::Message {
            self.message.extend_from_slice(payload);
            if self.message.ends_with(b"\r\n.\r\n") {
                let message = std::mem::take(&mut self.message);
                self.messages.push(message);
                self.stage = SmtpStage::Command;
                self.reply("MESSAGE", MESSAGE);
            }
            return;
        }

        let text = String::from_utf8_lossy(payload).into_owned();
        for line in text.split("\r\n").filter(|l| !l.is_empty()) {
            match self.stage {
                SmtpStage::Identity => {
                    self.identity = Some(line.to_owned());
                    self.stage = if self.reply("IDENTITY", IDENTITY) {
                        SmtpStage::Secret
                    } else {
                        SmtpStage::Command
                    };
                }
                SmtpStage::Secret => {
                    self.secret = Some(line.to_owned());
                    self.stage = SmtpStage::Command;
                    self.reply("SECRET", SECRET);
                }
                SmtpStage::Command | SmtpStage::Message => self.smtp_command(line),
            }
        }
    }

    fn smtp_command(&mut self, line: &str) {
        self.smtp_commands.push(line.to_owned());
        let verb = line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        match verb.as_str() {
            "EHLO" | "HELO" => {
                self.reply("EHLO", EHLO);
            }
            "AUTH" => {
                if self.reply("AUTH", AUTH) {
                    self.stage = SmtpStage::Identity;
                }
            }
            "MAIL" => {
                self.reply("MAIL", MAIL);
            }
            "RCPT" => {
                self.reply("RCPT", RCPT);
            }
            "DATA" => {
                if self.reply("DATA", DATA) {
                    self.stage = SmtpStage::Message;
                }
            }
            "QUIT" => {
                self.reply("QUIT", QUIT);
            }
            _ => {
                self.inbox.extend(UNKNOWN.as_bytes());
                self.inbox.extend(b"\r\n");
            }
        }
    }
}
