//! A76xx AT commands used for data and TLS channel control

use std::fmt::{self, Display, Formatter};

use crate::channel::LinkId;

/// PDP context the socket stack is bound to
pub const PDP_CONTEXT: u8 = 1;

/// SSL context configured for the channel
pub const SSL_CONTEXT: u8 = 0;

/// ATE0 / ATE1
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Echo(pub bool);

impl Display for Echo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ATE{}", u8::from(self.0))
    }
}

/// AT+CMEE, error result code verbosity
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ErrorReporting {
    /// Plain `ERROR`
    Disabled = 0,
    /// Numeric `+CME ERROR: <n>`
    Numeric = 1,
    /// Verbose `+CME ERROR: <text>`
    Verbose = 2,
}

impl Display for ErrorReporting {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AT+CMEE={}", *self as u8)
    }
}

/// AT+CGDCONT, defines a PDP context
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct DefineContext<'a> {
    cid: u8,
    apn: &'a str,
}

impl<'a> DefineContext<'a> {
    /// IP context `cid` on access point `apn`
    pub fn new(cid: u8, apn: &'a str) -> Self {
        Self { cid, apn }
    }
}

impl Display for DefineContext<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AT+CGDCONT={},\"IP\",\"{}\"", self.cid, self.apn)
    }
}

/// AT+CSOCKSETPN, binds the socket stack to a context
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct SocketContext(pub u8);

impl Display for SocketContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AT+CSOCKSETPN={}", self.0)
    }
}

/// AT+NETOPEN
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct NetOpen;

impl Display for NetOpen {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("AT+NETOPEN")
    }
}

/// AT+NETCLOSE
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct NetClose;

impl Display for NetClose {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("AT+NETCLOSE")
    }
}

/// AT+CSSLCFG settings on one SSL context
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum SslConfig {
    /// `sslversion`, 3 allows every supported TLS version
    Version(u8, u8),
    /// `authmode`, 0 skips server certificate verification
    AuthMode(u8, u8),
    /// `ignorelocaltime`, ignore the modem clock when checking validity
    IgnoreLocalTime(u8, bool),
}

impl Display for SslConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            SslConfig::Version(ctx, v) => write!(f, "AT+CSSLCFG=\"sslversion\",{ctx},{v}"),
            SslConfig::AuthMode(ctx, m) => write!(f, "AT+CSSLCFG=\"authmode\",{ctx},{m}"),
            SslConfig::IgnoreLocalTime(ctx, on) => {
                write!(f, "AT+CSSLCFG=\"ignorelocaltime\",{ctx},{}", u8::from(on))
            }
        }
    }
}

/// AT+CCHSTART, starts the TLS service
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct CchStart;

impl Display for CchStart {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("AT+CCHSTART")
    }
}

/// AT+CCHSTOP
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct CchStop;

impl Display for CchStop {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("AT+CCHSTOP")
    }
}

/// AT+CCHOPEN, connects a channel
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct CchOpen<'a> {
    link: LinkId,
    host: &'a str,
    port: u16,
}

impl<'a> CchOpen<'a> {
    /// Opens `link` to `host:port`
    pub fn new(link: LinkId, host: &'a str, port: u16) -> Self {
        Self { link, host, port }
    }
}

impl Display for CchOpen<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AT+CCHOPEN={},\"{}\",{}", self.link, self.host, self.port)
    }
}

/// AT+CCHSEND, announces `len` payload bytes
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct CchSend {
    /// Channel
    pub link: LinkId,
    /// Payload size
    pub len: usize,
}

impl Display for CchSend {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AT+CCHSEND={},{}", self.link, self.len)
    }
}

/// AT+CCHRECV, fetches up to `max` buffered bytes
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct CchRecv {
    /// Channel
    pub link: LinkId,
    /// Upper bound of the answer
    pub max: u16,
}

impl Display for CchRecv {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AT+CCHRECV={},{}", self.link, self.max)
    }
}

/// AT+CCHCLOSE
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct CchClose(pub LinkId);

impl Display for CchClose {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AT+CCHCLOSE={}", self.0)
    }
}
