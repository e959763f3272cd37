//! Cellular data (PDP) context bring-up and teardown

use tracing::{debug, info, warn};

use crate::{
    at::{
        commands::{
            DefineContext, Echo, ErrorReporting, NetClose, NetOpen, SocketContext, PDP_CONTEXT,
        },
        AtClient, SerialLink, ERROR_LINES,
    },
    config::{AtTimeouts, RetryPolicy},
    error::{Error, Stage},
};

/// Answers to `AT+NETOPEN` meaning the network is usable
///
/// The full error text is `+IP ERROR: Network is already opened`.
const NET_OPEN_ACCEPT: &[&str] = &["+NETOPEN: 0", "OK", "already opened"];

/// Answers to `AT+NETCLOSE` that end the wait
const NET_CLOSE_ACCEPT: &[&str] = &["+NETCLOSE: 0", "OK", "ERROR"];

/// Attaches to the data network, retrying the whole sequence
///
/// An empty `apn` keeps the context stored in the modem.
pub fn bring_up<L: SerialLink>(
    client: &mut AtClient<L>,
    apn: &str,
    policy: &RetryPolicy,
    timeouts: &AtTimeouts,
) -> Result<(), Error> {
    info!(apn, "bringing up data network");
    let cancellation = client.cancellation().clone();
    policy.run(Stage::Network, &cancellation, || {
        attempt(client, apn, timeouts)
    })?;
    info!("data network up");
    Ok(())
}

fn attempt<L: SerialLink>(
    client: &mut AtClient<L>,
    apn: &str,
    timeouts: &AtTimeouts,
) -> Result<(), Error> {
    client.command_gated(Echo(false), &["OK"], ERROR_LINES, timeouts.command)?;
    client.command_gated(
        ErrorReporting::Verbose,
        &["OK"],
        ERROR_LINES,
        timeouts.command,
    )?;
    if !apn.is_empty() {
        client.command_gated(
            DefineContext::new(PDP_CONTEXT, apn),
            &["OK"],
            ERROR_LINES,
            timeouts.command,
        )?;
        client.command_gated(
            SocketContext(PDP_CONTEXT),
            &["OK"],
            ERROR_LINES,
            timeouts.command,
        )?;
    }
    let reply = client.command_gated(
        NetOpen,
        NET_OPEN_ACCEPT,
        ERROR_LINES,
        timeouts.network_open,
    )?;
    if reply.contains("already opened") {
        debug!("data network was already open");
    }
    Ok(())
}

/// Detaches from the data network
///
/// Runs even after a cancellation. Failures are logged and swallowed.
pub fn tear_down<L: SerialLink>(client: &mut AtClient<L>, timeouts: &AtTimeouts) {
    let result = client.best_effort(|c| c.command_any(NetClose, NET_CLOSE_ACCEPT, timeouts.network_close));
    match result {
        Ok(_) => debug!("data network closed"),
        Err(err) => warn!(error = %err, "closing data network failed"),
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::at::mock::MockModem;

    fn fast() -> (RetryPolicy, AtTimeouts) {
        (
            RetryPolicy {
                attempts: 3,
                delay: Duration::ZERO,
            },
            AtTimeouts::uniform(Duration::from_millis(30)),
        )
    }

    fn client(modem: &MockModem) -> AtClient<MockModem> {
        let mut client = AtClient::new(modem.clone());
        client.set_tick(Duration::from_millis(1));
        client
    }

    #[test]
    fn sequence_with_apn() {
        let modem = MockModem::new();
        let (policy, timeouts) = fast();
        bring_up(&mut client(&modem), "internet", &policy, &timeouts).unwrap();
        assert_eq!(
            modem.commands(),
            vec![
                "ATE0",
                "AT+CMEE=2",
                "AT+CGDCONT=1,\"IP\",\"internet\"",
                "AT+CSOCKSETPN=1",
                "AT+NETOPEN",
            ]
        );
        assert!(modem.is_network_open());
    }

    #[test]
    fn empty_apn_skips_context_commands() {
        let modem = MockModem::new();
        let (policy, timeouts) = fast();
        bring_up(&mut client(&modem), "", &policy, &timeouts).unwrap();
        assert_eq!(modem.commands(), vec!["ATE0", "AT+CMEE=2", "AT+NETOPEN"]);
    }

    #[test]
    fn already_open_counts_as_success() {
        let modem = MockModem::builder().network_already_open().build();
        let (policy, timeouts) = fast();
        let mut client = client(&modem);
        bring_up(&mut client, "", &policy, &timeouts).unwrap();
        bring_up(&mut client, "", &policy, &timeouts).unwrap();
        assert_eq!(modem.count("AT+NETOPEN"), 2);
    }

    #[test]
    fn whole_sequence_is_retried() {
        let modem = MockModem::builder().reject("AT+NETOPEN").build();
        let (policy, timeouts) = fast();
        let err = bring_up(&mut client(&modem), "", &policy, &timeouts).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Network));
        assert!(err.to_string().starts_with("network bring-up failed: modem error"));
        assert_eq!(modem.count("ATE0"), 3);
        assert_eq!(modem.count("AT+NETOPEN"), 3);
    }

    #[test]
    fn teardown_swallows_errors() {
        let modem = MockModem::builder().ignore("AT+NETCLOSE").build();
        let (_, timeouts) = fast();
        tear_down(&mut client(&modem), &timeouts);
        assert_eq!(modem.count("AT+NETCLOSE"), 1);
    }
}
