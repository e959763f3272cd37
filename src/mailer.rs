//! The orchestrator: one call brings the modem up, delivers, and tears down

use tracing::{error, info, trace};

use crate::{
    at::{AtClient, Cancellation, SerialLink},
    channel::{LinkId, TlsChannel},
    config::{AtTimeouts, PollTiming, RetryPolicy, SessionConfig, SmtpTimeouts},
    error::{self, Error},
    message, pdp,
    smtp::{
        authentication::Credentials, extension::ClientId, response::Response, SmtpSession,
    },
};

#[derive(Debug, Clone, Default)]
struct Settings {
    session: SessionConfig,
    link_id: LinkId,
    retry: RetryPolicy,
    poll: PollTiming,
    at_timeouts: AtTimeouts,
    smtp_timeouts: SmtpTimeouts,
    hello_name: ClientId,
}

/// Sends plain-text email through a cellular modem
///
/// Every send runs the full cycle: data network bring-up, TLS start, channel
/// open, SMTP session, then channel close, TLS stop and network teardown.
/// Whatever was brought up is torn down again on every path.
///
/// ```rust
/// use cellmail::{at::mock::MockModem, ModemMailer};
///
/// let mut mailer = ModemMailer::new(MockModem::new());
/// mailer.set_auth("user@example.com", "app-pass");
/// mailer.set_recipient("dest@example.com", "Dest");
/// mailer.set_subject("Hi");
/// mailer.set_body("line1\nline2");
/// assert!(mailer.send_email());
/// ```
#[derive(Debug)]
pub struct ModemMailer<L> {
    client: AtClient<L>,
    settings: Settings,
}

/// Contains mailer configuration.
/// Instances of this struct can be created using [`ModemMailer::builder`].
#[derive(Debug)]
pub struct ModemMailerBuilder<L> {
    link: L,
    settings: Settings,
    cancellation: Option<Cancellation>,
}

impl<L: SerialLink> ModemMailerBuilder<L> {
    /// Set the access point name
    pub fn apn<T: Into<String>>(mut self, apn: T) -> Self {
        self.settings.session.apn = apn.into();
        self
    }

    /// Set the relay host and port
    pub fn relay<T: Into<String>>(mut self, host: T, port: u16) -> Self {
        self.settings.session.host = host.into();
        self.settings.session.port = port;
        self
    }

    /// Set the `AUTH LOGIN` credentials
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.settings.session.account = credentials.identity().to_owned();
        self.settings.session.credential = credentials.secret().to_owned();
        self
    }

    /// Set the TLS channel index
    pub fn link_id(mut self, link_id: LinkId) -> Self {
        self.settings.link_id = link_id;
        self
    }

    /// Set the bring-up retry policy
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.settings.retry = retry;
        self
    }

    /// Set the receive poll pacing
    pub fn poll_timing(mut self, poll: PollTiming) -> Self {
        self.settings.poll = poll;
        self
    }

    /// Set the AT command deadlines
    pub fn timeouts(mut self, timeouts: AtTimeouts) -> Self {
        self.settings.at_timeouts = timeouts;
        self
    }

    /// Set the SMTP reply deadlines
    pub fn smtp_timeouts(mut self, timeouts: SmtpTimeouts) -> Self {
        self.settings.smtp_timeouts = timeouts;
        self
    }

    /// Set the name used during EHLO
    pub fn hello_name(mut self, name: ClientId) -> Self {
        self.settings.hello_name = name;
        self
    }

    /// Replace the whole session configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.settings.session = config;
        self
    }

    /// Share an existing cancellation token
    pub fn cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Build the mailer
    pub fn build(self) -> ModemMailer<L> {
        let mut client = AtClient::new(self.link);
        client.set_tick(self.settings.poll.tick);
        if let Some(cancellation) = self.cancellation {
            client.set_cancellation(cancellation);
        }
        ModemMailer {
            client,
            settings: self.settings,
        }
    }
}

impl<L: SerialLink> ModemMailer<L> {
    /// Mailer with default settings over `link`
    pub fn new(link: L) -> Self {
        Self::builder(link).build()
    }

    /// Creates a new builder over `link`
    pub fn builder(link: L) -> ModemMailerBuilder<L> {
        ModemMailerBuilder {
            link,
            settings: Settings::default(),
            cancellation: None,
        }
    }

    /// Set the access point name, empty keeps the modem's stored context
    pub fn set_apn(&mut self, apn: &str) {
        self.settings.session.apn = apn.to_owned();
    }

    /// Set the login account and its app password
    pub fn set_auth(&mut self, account: &str, credential: &str) {
        self.settings.session.account = account.to_owned();
        self.settings.session.credential = credential.to_owned();
    }

    /// Set the recipient address and display name
    pub fn set_recipient(&mut self, address: &str, name: &str) {
        self.settings.session.recipient = address.to_owned();
        self.settings.session.recipient_name = name.to_owned();
    }

    /// Set the sender display name
    pub fn set_from_name(&mut self, name: &str) {
        self.settings.session.sender_name = name.to_owned();
    }

    /// Set the subject
    pub fn set_subject(&mut self, subject: &str) {
        self.settings.session.subject = subject.to_owned();
    }

    /// Set the body, line breaks are normalized to CRLF
    pub fn set_body(&mut self, body: &str) {
        self.settings.session.set_body(body);
    }

    /// Set the relay host and port
    pub fn set_relay(&mut self, host: &str, port: u16) {
        self.settings.session.host = host.to_owned();
        self.settings.session.port = port;
    }

    /// The current session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.settings.session
    }

    /// Mutable access to the session configuration
    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.settings.session
    }

    /// Token aborting the send in progress
    ///
    /// Teardown still runs after a cancellation. The token stays triggered
    /// until reset, later sends fail until then.
    pub fn cancellation(&self) -> Cancellation {
        self.client.cancellation().clone()
    }

    /// Sends the configured email, returning whether the relay accepted it
    ///
    /// The failure reason is logged, use [`ModemMailer::try_send_email`] to
    /// get it.
    pub fn send_email(&mut self) -> bool {
        match self.try_send_email() {
            Ok(response) => {
                info!(%response, "email sent");
                true
            }
            Err(err) => {
                error!(error = %err, "sending email failed");
                false
            }
        }
    }

    /// Sends the configured email
    ///
    /// Returns the relay's reply to the message. Incomplete configuration
    /// fails before any modem traffic.
    pub fn try_send_email(&mut self) -> Result<Response, Error> {
        let session = &self.settings.session;
        session.validate()?;
        let credentials = session.credentials();
        let message = message::compose(session);

        pdp::bring_up(
            &mut self.client,
            &session.apn,
            &self.settings.retry,
            &self.settings.at_timeouts,
        )?;
        let result = self.deliver(&credentials, &message);
        pdp::tear_down(&mut self.client, &self.settings.at_timeouts);
        result
    }

    fn deliver(&mut self, credentials: &Credentials, message: &[u8]) -> Result<Response, Error> {
        let settings = &self.settings;
        let link = settings.link_id;
        let mut channel = TlsChannel::new(&mut self.client, &settings.at_timeouts, &settings.poll);

        channel.start(&settings.retry)?;
        if let Err(err) = channel.open(&settings.session.host, settings.session.port, link) {
            channel.stop();
            return Err(err);
        }

        let result = SmtpSession::new(link, &settings.hello_name, &settings.smtp_timeouts)
            .max_chunk(settings.poll.max_chunk)
            .run(&mut channel, credentials, &settings.session.recipient, message);

        channel.close(link);
        channel.stop();
        result
    }

    /// Pumps bytes once in both directions between `console` and the modem
    ///
    /// Returns the byte counts `(to_modem, to_console)`. Call it in a loop to
    /// talk to the modem by hand.
    pub fn bridge<C: SerialLink>(&mut self, console: &mut C) -> Result<(usize, usize), Error> {
        let to_modem = pump(console, self.client.link_mut())?;
        let from_modem = self.client.drain()?;
        if !from_modem.is_empty() {
            console.write_all(&from_modem).map_err(error::io)?;
        }
        let to_console = from_modem.len();
        trace!(to_modem, to_console, "bridged");
        Ok((to_modem, to_console))
    }

    /// Borrows the link
    pub fn link(&self) -> &L {
        self.client.link()
    }

    /// Mutably borrows the link
    pub fn link_mut(&mut self) -> &mut L {
        self.client.link_mut()
    }

    /// Returns the link
    pub fn into_inner(self) -> L {
        self.client.into_inner()
    }
}

fn pump<F: SerialLink + ?Sized, T: SerialLink + ?Sized>(from: &mut F, to: &mut T) -> Result<usize, Error> {
    let mut buf = [0; 256];
    let mut total = 0;
    loop {
        let n = from.read_available(&mut buf).map_err(error::io)?;
        if n == 0 {
            return Ok(total);
        }
        to.write_all(&buf[..n]).map_err(error::io)?;
        total += n;
    }
}
