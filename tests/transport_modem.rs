#[cfg(test)]
mod test {
    use std::{thread, time::Duration};

    use cellmail::{
        at::mock::MockModem, AtTimeouts, ModemMailer, PollTiming, RetryPolicy, SmtpTimeouts,
    };
    use pretty_assertions::assert_eq;

    fn fast_mailer(modem: &MockModem) -> ModemMailer<MockModem> {
        let mut mailer = ModemMailer::builder(modem.clone())
            .relay("smtp.example.com", 465)
            .retry_policy(RetryPolicy {
                attempts: 3,
                delay: Duration::ZERO,
            })
            .poll_timing(PollTiming {
                tick: Duration::from_millis(1),
                interval: Duration::from_millis(5),
                read_window: Duration::from_millis(3),
                settle: Duration::from_millis(1),
                open_settle: Duration::ZERO,
                max_chunk: 512,
            })
            .timeouts(AtTimeouts::uniform(Duration::from_millis(50)))
            .smtp_timeouts(SmtpTimeouts::uniform(Duration::from_millis(200)))
            .build();
        mailer.set_auth("user@example.com", "app-pass");
        mailer.set_recipient("dest@example.com", "Dest");
        mailer.set_subject("Hi");
        mailer.set_body("line1\nline2");
        mailer
    }

    #[test]
    fn modem_transport_simple() {
        let modem = MockModem::new();
        let mut mailer = fast_mailer(&modem);

        let response = mailer.try_send_email().unwrap();
        assert_eq!(u16::from(response.code()), 250);

        let messages = modem.messages();
        assert_eq!(messages.len(), 1);
        let message = String::from_utf8(messages[0].clone()).unwrap();
        assert!(message.starts_with("From: Cellular Modem <user@example.com>\r\n"));
        assert!(message.contains("To: Dest <dest@example.com>\r\n"));
        assert!(message.contains("Subject: Hi\r\n"));
        assert!(message.ends_with("\r\n\r\nline1\r\nline2\r\n.\r\n"));

        assert_eq!(
            modem.authenticated_as(),
            Some(("user@example.com".to_owned(), "app-pass".to_owned()))
        );
        assert!(!modem.is_network_open());
        assert!(!modem.is_tls_started());
        assert!(!modem.is_channel_open());
    }

    #[test]
    fn transcript_order() {
        let modem = MockModem::new();
        let mut mailer = fast_mailer(&modem);
        mailer.set_apn("internet");
        assert!(mailer.send_email());

        let commands = modem.commands();
        assert_eq!(
            commands[..10].to_vec(),
            vec![
                "ATE0",
                "AT+CMEE=2",
                "AT+CGDCONT=1,\"IP\",\"internet\"",
                "AT+CSOCKSETPN=1",
                "AT+NETOPEN",
                "AT+CSSLCFG=\"sslversion\",0,3",
                "AT+CSSLCFG=\"authmode\",0,0",
                "AT+CSSLCFG=\"ignorelocaltime\",0,1",
                "AT+CCHSTART",
                "AT+CCHOPEN=0,\"smtp.example.com\",465",
            ]
        );
        assert_eq!(
            commands[commands.len() - 3..].to_vec(),
            vec!["AT+CCHCLOSE=0", "AT+CCHSTOP", "AT+NETCLOSE"]
        );
        assert_eq!(
            modem.smtp_commands(),
            vec![
                "EHLO simcom",
                "AUTH LOGIN",
                "MAIL FROM:<user@example.com>",
                "RCPT TO:<dest@example.com>",
                "DATA",
                "QUIT",
            ]
        );
    }

    #[test]
    fn incomplete_config_sends_nothing() {
        let modem = MockModem::new();
        let mut mailer = fast_mailer(&modem);
        mailer.set_recipient("", "Dest");
        let err = mailer.try_send_email().unwrap_err();
        assert!(err.is_config());
        assert_eq!(err.to_string(), "configuration error: missing recipient");

        let mut mailer = fast_mailer(&modem);
        mailer.set_auth("", "app-pass");
        assert!(mailer.try_send_email().unwrap_err().is_config());

        let mut mailer = fast_mailer(&modem);
        mailer.set_auth("user@example.com", "");
        assert!(!mailer.send_email());

        assert_eq!(modem.bytes_written(), 0);
        assert!(modem.commands().is_empty());
    }

    #[test]
    fn sends_twice_in_a_row() {
        let modem = MockModem::new();
        let mut mailer = fast_mailer(&modem);
        assert!(mailer.send_email());
        mailer.set_subject("Again");
        assert!(mailer.send_email());

        assert_eq!(modem.messages().len(), 2);
        assert_eq!(modem.count("AT+NETOPEN"), 2);
        assert_eq!(modem.count("AT+NETCLOSE"), 2);
        assert!(!modem.is_network_open());
    }

    #[test]
    fn network_already_open_is_success() {
        let modem = MockModem::builder().network_already_open().build();
        let mut mailer = fast_mailer(&modem);
        assert!(mailer.send_email());
        assert_eq!(modem.count("AT+NETOPEN"), 1);
        assert_eq!(modem.messages().len(), 1);
        assert!(!modem.is_network_open());
    }

    #[test]
    fn data_pushed_with_the_answer_is_not_lost() {
        let modem = MockModem::builder().push_data().build();
        let mut mailer = fast_mailer(&modem);

        let response = mailer.try_send_email().unwrap();
        assert_eq!(u16::from(response.code()), 250);
        assert_eq!(modem.messages().len(), 1);
        assert_eq!(modem.count("AT+CCHRECV"), 0);
        assert_eq!(modem.smtp_commands().last().map(String::as_str), Some("QUIT"));
    }

    #[test]
    fn silent_quit_still_delivers() {
        let modem = MockModem::builder().smtp_reply("QUIT", "").build();
        let mut mailer = fast_mailer(&modem);
        assert!(mailer.send_email());
        assert_eq!(modem.smtp_commands().last().map(String::as_str), Some("QUIT"));
        assert_eq!(modem.count("AT+CCHCLOSE"), 1);
    }

    #[test]
    fn body_lines_starting_with_a_dot_are_escaped() {
        let modem = MockModem::new();
        let mut mailer = fast_mailer(&modem);
        mailer.set_body(".hidden\n.\nend");
        assert!(mailer.send_email());

        let message = String::from_utf8(modem.messages()[0].clone()).unwrap();
        assert!(message.ends_with("\r\n\r\n..hidden\r\n..\r\nend\r\n.\r\n"));
    }

    #[test]
    fn cancelled_before_start() {
        let modem = MockModem::new();
        let mut mailer = fast_mailer(&modem);
        let cancellation = mailer.cancellation();
        cancellation.cancel();

        let err = mailer.try_send_email().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(modem.bytes_written(), 0);

        cancellation.reset();
        assert!(mailer.send_email());
    }

    #[test]
    fn cancelled_while_waiting() {
        let modem = MockModem::builder().ignore("AT+CCHSTART").build();
        let mut mailer = ModemMailer::builder(modem.clone())
            .config(fast_mailer(&modem).config().clone())
            .retry_policy(RetryPolicy {
                attempts: 3,
                delay: Duration::ZERO,
            })
            .timeouts(AtTimeouts {
                tls_start: Duration::from_secs(10),
                ..AtTimeouts::uniform(Duration::from_millis(50))
            })
            .build();

        let cancellation = mailer.cancellation();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            cancellation.cancel();
        });

        let err = mailer.try_send_email().unwrap_err();
        canceller.join().unwrap();

        assert!(err.is_cancelled());
        assert_eq!(err.stage(), Some(cellmail::error::Stage::Tls));
        assert_eq!(modem.count("AT+CCHSTART"), 1);
        assert_eq!(modem.count("AT+CCHSTOP"), 1);
        assert_eq!(modem.count("AT+NETCLOSE"), 1);
        assert!(!modem.is_network_open());
    }
}
