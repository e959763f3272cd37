//! Modem-side TLS channel
//!
//! The modem firmware terminates TLS. This module configures its SSL context,
//! opens a numbered channel to the relay, and moves bytes with the
//! prompt-gated `AT+CCHSEND` and the polled `AT+CCHRECV`. Certificates are
//! not verified: the trust decision is left to the relay account credentials.

use std::{
    fmt::{self, Display, Formatter},
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    at::{
        commands::{CchClose, CchOpen, CchRecv, CchSend, CchStart, CchStop, SslConfig, SSL_CONTEXT},
        contains, deadline, AtClient, SerialLink, ERROR_LINES,
    },
    config::{AtTimeouts, PollTiming, RetryPolicy},
    error::{self, Error, Stage},
};

/// Marker preceding channel data in an `AT+CCHRECV` answer
pub const DATA_MARKER: &str = "+CCHRECV: DATA,";

/// Index of a modem TLS channel
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkId(pub u8);

impl Display for LinkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// TLS channel control borrowing an [`AtClient`]
#[derive(Debug)]
pub struct TlsChannel<'a, L> {
    client: &'a mut AtClient<L>,
    timeouts: &'a AtTimeouts,
    poll: &'a PollTiming,
}

impl<'a, L: SerialLink> TlsChannel<'a, L> {
    /// Wraps `client` with the given deadlines and poll pacing
    pub fn new(client: &'a mut AtClient<L>, timeouts: &'a AtTimeouts, poll: &'a PollTiming) -> Self {
        Self {
            client,
            timeouts,
            poll,
        }
    }

    /// Configures the SSL context and starts the TLS service, retrying the
    /// whole sequence
    ///
    /// Every failed attempt is followed by `AT+CCHSTOP`: a service left
    /// running answers `AT+CCHSTART` with `ERROR` until it is stopped.
    pub fn start(&mut self, policy: &RetryPolicy) -> Result<(), Error> {
        info!("starting modem tls");
        let cancellation = self.client.cancellation().clone();
        policy.run(Stage::Tls, &cancellation, || {
            let result = self.start_once();
            if result.is_err() {
                self.stop();
            }
            result
        })
    }

    fn start_once(&mut self) -> Result<(), Error> {
        let timeout = self.timeouts.command;
        for setting in [
            SslConfig::Version(SSL_CONTEXT, 3),
            SslConfig::AuthMode(SSL_CONTEXT, 0),
            SslConfig::IgnoreLocalTime(SSL_CONTEXT, true),
        ] {
            self.client
                .command_gated(setting, &["OK"], ERROR_LINES, timeout)?;
        }
        self.client.command_gated(
            CchStart,
            &["+CCHSTART: 0", "OK"],
            ERROR_LINES,
            self.timeouts.tls_start,
        )?;
        Ok(())
    }

    /// Connects `link` to `host:port`
    ///
    /// One attempt only. Success needs the `+CCHOPEN: <link>,0` confirmation,
    /// an error or a non-zero confirmation fails.
    pub fn open(&mut self, host: &str, port: u16, link: LinkId) -> Result<(), Error> {
        info!(host, port, %link, "opening tls channel");
        let confirmed = format!("+CCHOPEN: {link},0");
        let refused = format!("+CCHOPEN: {link},");
        self.client
            .command_gated(
                CchOpen::new(link, host, port),
                &[confirmed.as_str()],
                &[ERROR_LINES[0], ERROR_LINES[1], refused.as_str()],
                self.timeouts.channel_open,
            )
            .map_err(|err| error::bring_up(Stage::Channel, err))?;
        self.client
            .pause(self.poll.open_settle)
            .map_err(|err| error::bring_up(Stage::Channel, err))
    }

    /// Writes `bytes` to the channel
    ///
    /// Waits for the `>` prompt, writes the payload, then waits for `OK`.
    pub fn send(&mut self, link: LinkId, bytes: &[u8]) -> Result<(), Error> {
        self.client.command_gated(
            CchSend {
                link,
                len: bytes.len(),
            },
            &[">"],
            ERROR_LINES,
            self.timeouts.send_prompt,
        )?;
        self.client.raw_send(bytes)?;
        self.client
            .wait_gated(&["OK"], ERROR_LINES, self.timeouts.send_ack)?;
        Ok(())
    }

    /// Writes `line` followed by CRLF
    pub fn send_line(&mut self, link: LinkId, line: &str) -> Result<(), Error> {
        let mut bytes = Vec::with_capacity(line.len() + 2);
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        self.send(link, &bytes)
    }

    /// Polls the channel until data arrives
    ///
    /// Returns the raw modem answer, AT envelope included, see
    /// [`extract_payload`].
    pub fn receive(&mut self, link: LinkId, max_bytes: u16, timeout: Duration) -> Result<String, Error> {
        let expires = deadline(timeout);
        let mut next_poll = Instant::now();
        let mut buf = Vec::new();

        while Instant::now() < expires {
            self.client.check_cancelled()?;
            self.client.read_into(&mut buf)?;
            if contains(&buf, DATA_MARKER) {
                return self.finish_receive(buf);
            }

            if Instant::now() >= next_poll {
                next_poll = deadline(self.poll.interval);
                self.client.write_line(CchRecv {
                    link,
                    max: max_bytes,
                })?;
                let window = deadline(self.poll.read_window);
                while Instant::now() < window {
                    self.client.read_into(&mut buf)?;
                    if contains(&buf, DATA_MARKER) {
                        return self.finish_receive(buf);
                    }
                    self.client.tick();
                }
                buf.clear();
            }

            self.client.pause(self.poll.tick)?;
        }

        Err(error::timeout(format!("no channel data within {timeout:?}")))
    }

    fn finish_receive(&mut self, mut buf: Vec<u8>) -> Result<String, Error> {
        self.client.pause(self.poll.settle)?;
        self.client.read_into(&mut buf)?;

        // The announced length may still be in flight on a slow UART.
        let until = deadline(self.poll.read_window);
        while extract_payload(&String::from_utf8_lossy(&buf)).is_none() && Instant::now() < until {
            self.client.tick();
            self.client.read_into(&mut buf)?;
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Closes `link`, logging failures
    pub fn close(&mut self, link: LinkId) {
        let timeout = self.timeouts.command;
        let result = self
            .client
            .best_effort(|c| c.command_gated(CchClose(link), &["OK"], ERROR_LINES, timeout));
        match result {
            Ok(_) => debug!(%link, "tls channel closed"),
            Err(err) => warn!(%link, error = %err, "closing tls channel failed"),
        }
    }

    /// Stops the TLS service, logging failures
    pub fn stop(&mut self) {
        let timeout = self.timeouts.command;
        let result = self
            .client
            .best_effort(|c| c.command_gated(CchStop, &["OK"], ERROR_LINES, timeout));
        match result {
            Ok(_) => debug!("modem tls stopped"),
            Err(err) => warn!(error = %err, "stopping modem tls failed"),
        }
    }
}

/// Cuts the channel data out of an `AT+CCHRECV` answer
///
/// Returns `None` when there is no `+CCHRECV: DATA,<link>,<len>` header or the
/// announced bytes are not all there yet.
pub fn extract_payload(raw: &str) -> Option<&str> {
    let start = raw.find(DATA_MARKER)? + DATA_MARKER.len();
    let header_end = start + raw[start..].find("\r\n")?;
    let (_, len) = raw[start..header_end].split_once(',')?;
    let len: usize = len.trim().parse().ok()?;
    let data = header_end + 2;
    raw.get(data..data + len)
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::at::mock::MockModem;

    fn timing() -> (AtTimeouts, PollTiming, RetryPolicy) {
        (
            AtTimeouts::uniform(Duration::from_millis(50)),
            PollTiming {
                tick: Duration::from_millis(1),
                interval: Duration::from_millis(5),
                read_window: Duration::from_millis(3),
                settle: Duration::from_millis(1),
                open_settle: Duration::ZERO,
                max_chunk: 512,
            },
            RetryPolicy {
                attempts: 2,
                delay: Duration::ZERO,
            },
        )
    }

    fn client(modem: &MockModem) -> AtClient<MockModem> {
        let mut client = AtClient::new(modem.clone());
        client.set_tick(Duration::from_millis(1));
        client
    }

    #[test]
    fn test_extract_payload() {
        let raw = "\r\nOK\r\n\r\n+CCHRECV: DATA,0,9\r\n220 ready\r\n+CCHRECV: 0,0\r\n";
        assert_eq!(extract_payload(raw), Some("220 ready"));
        assert_eq!(extract_payload("\r\nOK\r\n"), None);
        assert_eq!(extract_payload("+CCHRECV: DATA,0,40\r\nshort"), None);
    }

    #[test]
    fn start_configures_ssl_context() {
        let modem = MockModem::new();
        let (timeouts, poll, policy) = timing();
        let mut client = client(&modem);
        TlsChannel::new(&mut client, &timeouts, &poll)
            .start(&policy)
            .unwrap();
        assert_eq!(
            modem.commands(),
            vec![
                "AT+CSSLCFG=\"sslversion\",0,3",
                "AT+CSSLCFG=\"authmode\",0,0",
                "AT+CSSLCFG=\"ignorelocaltime\",0,1",
                "AT+CCHSTART",
            ]
        );
        assert!(modem.is_tls_started());
    }

    #[test]
    fn start_failure_is_a_tls_stage_error() {
        let modem = MockModem::builder().reject("AT+CCHSTART").build();
        let (timeouts, poll, policy) = timing();
        let mut client = client(&modem);
        let err = TlsChannel::new(&mut client, &timeouts, &poll)
            .start(&policy)
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Tls));
        assert_eq!(modem.count("AT+CSSLCFG=\"sslversion\""), 2);
        assert_eq!(modem.count("AT+CCHSTOP"), 2);
    }

    #[test]
    fn start_stops_a_service_left_running() {
        let modem = MockModem::builder().tls_already_started().build();
        let (timeouts, poll, policy) = timing();
        let mut client = client(&modem);
        TlsChannel::new(&mut client, &timeouts, &poll)
            .start(&policy)
            .unwrap();
        assert_eq!(
            modem.commands()[3..].to_vec(),
            vec![
                "AT+CCHSTART",
                "AT+CCHSTOP",
                "AT+CSSLCFG=\"sslversion\",0,3",
                "AT+CSSLCFG=\"authmode\",0,0",
                "AT+CSSLCFG=\"ignorelocaltime\",0,1",
                "AT+CCHSTART",
            ]
        );
        assert!(modem.is_tls_started());
    }

    #[test]
    fn open_needs_confirmation() {
        let modem = MockModem::new();
        let (timeouts, poll, _) = timing();
        let mut client = client(&modem);
        let err = TlsChannel::new(&mut client, &timeouts, &poll)
            .open("smtp.example.com", 465, LinkId(0))
            .unwrap_err();
        // TLS service was never started, the mock refuses with +CCHOPEN: 0,4
        assert_eq!(err.stage(), Some(Stage::Channel));
        assert_eq!(
            err.to_string(),
            "channel open failed: modem error: +CCHOPEN: 0,4"
        );
        assert!(!modem.is_channel_open());
    }

    #[test]
    fn send_and_receive_over_open_channel() {
        let modem = MockModem::new();
        let (timeouts, poll, policy) = timing();
        let mut client = client(&modem);
        client.command("AT+NETOPEN", "OK", timeouts.command).unwrap();

        let mut channel = TlsChannel::new(&mut client, &timeouts, &poll);
        channel.start(&policy).unwrap();
        channel.open("smtp.example.com", 465, LinkId(0)).unwrap();

        let greeting = channel
            .receive(LinkId(0), 512, Duration::from_millis(100))
            .unwrap();
        assert_eq!(
            extract_payload(&greeting),
            Some("220 mock.example.com ESMTP ready\r\n")
        );

        channel.send_line(LinkId(0), "EHLO simcom").unwrap();
        assert_eq!(modem.smtp_commands(), vec!["EHLO simcom"]);
        assert_eq!(modem.count("AT+CCHSEND=0,13"), 1);

        channel.close(LinkId(0));
        channel.stop();
        assert!(!modem.is_channel_open());
        assert!(!modem.is_tls_started());
    }

    #[test]
    fn data_behind_the_open_confirmation_is_received() {
        let modem = MockModem::builder().push_data().build();
        let (timeouts, poll, policy) = timing();
        let mut client = client(&modem);
        client.command("AT+NETOPEN", "OK", timeouts.command).unwrap();
        let mut channel = TlsChannel::new(&mut client, &timeouts, &poll);
        channel.start(&policy).unwrap();
        channel.open("smtp.example.com", 465, LinkId(0)).unwrap();

        let greeting = channel
            .receive(LinkId(0), 512, Duration::from_millis(200))
            .unwrap();
        assert_eq!(
            extract_payload(&greeting),
            Some("220 mock.example.com ESMTP ready\r\n")
        );
        assert_eq!(modem.count("AT+CCHRECV"), 0);

        channel.send_line(LinkId(0), "EHLO simcom").unwrap();
        let reply = channel
            .receive(LinkId(0), 512, Duration::from_millis(200))
            .unwrap();
        assert!(extract_payload(&reply).unwrap().ends_with("250 AUTH LOGIN PLAIN\r\n"));
        assert_eq!(modem.count("AT+CCHRECV"), 0);
    }

    #[test]
    fn receive_times_out_without_data() {
        let modem = MockModem::new();
        let (timeouts, poll, policy) = timing();
        let mut client = client(&modem);
        client.command("AT+NETOPEN", "OK", timeouts.command).unwrap();
        let mut channel = TlsChannel::new(&mut client, &timeouts, &poll);
        channel.start(&policy).unwrap();
        channel.open("smtp.example.com", 465, LinkId(0)).unwrap();
        channel
            .receive(LinkId(0), 512, Duration::from_millis(100))
            .unwrap();

        let err = channel
            .receive(LinkId(0), 512, Duration::from_millis(30))
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(modem.count("AT+CCHRECV=0,512") >= 2);
    }

    #[test]
    fn missing_prompt_fails_send() {
        let modem = MockModem::builder().withhold_prompt().build();
        let (timeouts, poll, policy) = timing();
        let mut client = client(&modem);
        client.command("AT+NETOPEN", "OK", timeouts.command).unwrap();
        let mut channel = TlsChannel::new(&mut client, &timeouts, &poll);
        channel.start(&policy).unwrap();
        channel.open("smtp.example.com", 465, LinkId(0)).unwrap();

        let err = channel.send_line(LinkId(0), "EHLO simcom").unwrap_err();
        assert!(err.is_timeout());
        assert!(modem.smtp_commands().is_empty());
    }
}
