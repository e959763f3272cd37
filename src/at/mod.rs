//! AT command transport
//!
//! [`AtClient`] is the only type that touches the serial link. It writes one
//! command line at a time and accumulates the modem's answer until an
//! expected token shows up or the deadline passes. Every wait is a bounded
//! poll that sleeps a short tick between reads and checks a [`Cancellation`].
//!
//! The exchange transcript is logged at `debug` level, with line breaks shown
//! as `<CRLF>`. Raw channel payloads are logged by size only.

use std::{
    fmt::{self, Debug, Display, Formatter},
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, trace};

use crate::{
    error::{self, Error},
    smtp::codec::escape_crlf,
};

pub mod commands;
pub mod mock;
#[cfg(feature = "serialport")]
pub mod serial;

/// Read size for a single `read_available` call
const READ_CHUNK: usize = 256;

/// Line tokens that end a command with a failure
pub(crate) const ERROR_LINES: &[&str] = &["ERROR", "+CME ERROR"];

/// Stand-in deadline offset when `now + timeout` does not fit in an [`Instant`]
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Instant `timeout` from now, clamped far into the future on overflow
pub(crate) fn deadline(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Byte link to the modem
///
/// `read_available` must not block for long: it returns `Ok(0)` when nothing
/// is buffered.
pub trait SerialLink {
    /// Writes every byte of `bytes`
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Reads whatever is buffered, up to `buf.len()` bytes
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<L: SerialLink + ?Sized> SerialLink for &mut L {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_available(buf)
    }
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_available(buf)
    }
}

/// Shared flag that aborts any wait in progress
///
/// Clones observe the same flag, so it can be triggered from another thread.
/// It stays set until [`Cancellation::reset`] is called.
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    /// Creates an untriggered token
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clears the token so later sends run again
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Tells if the token was triggered
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(error::cancelled())
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration` in short slices, returning early on cancellation
    pub(crate) fn pause(&self, duration: Duration) -> Result<(), Error> {
        const SLICE: Duration = Duration::from_millis(50);

        let deadline = deadline(duration);
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(SLICE));
        }
    }
}

/// Offset of the first occurrence of `needle` in `haystack`
fn find(haystack: &[u8], needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    if needle.is_empty() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Returns true if `needle` occurs in `haystack`
pub(crate) fn contains(haystack: &[u8], needle: &str) -> bool {
    find(haystack, needle).is_some()
}

/// End offset of the earliest accept token in `buf`
fn accepted_end(buf: &[u8], tokens: &[&str]) -> Option<usize> {
    tokens
        .iter()
        .filter_map(|token| find(buf, token).map(|start| start + token.len()))
        .min()
}

/// First complete line of `buf` that starts with one of `tokens`, with the
/// offset right after its line feed
fn rejected_line(buf: &[u8], tokens: &[&str]) -> Option<(String, usize)> {
    let mut start = 0;
    while let Some(offset) = buf[start..].iter().position(|&b| b == b'\n') {
        let end = start + offset + 1;
        let line = String::from_utf8_lossy(&buf[start..end]);
        let line = line.trim();
        if tokens.iter().any(|token| line.starts_with(token)) {
            return Some((line.to_owned(), end));
        }
        start = end;
    }
    None
}

/// Command/response client over a [`SerialLink`]
///
/// A wait consumes input only up to the token it was waiting for. Whatever
/// the same read returned after it is carried over to the next read.
pub struct AtClient<L> {
    link: L,
    carry: Vec<u8>,
    tick: Duration,
    cancellation: Cancellation,
    ignore_cancellation: bool,
}

impl<L> Debug for AtClient<L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtClient")
            .field("tick", &self.tick)
            .field("carried", &self.carry.len())
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}

impl<L: SerialLink> AtClient<L> {
    /// Creates a client polling every 10 ms
    pub fn new(link: L) -> Self {
        Self {
            link,
            carry: Vec::new(),
            tick: Duration::from_millis(10),
            cancellation: Cancellation::new(),
            ignore_cancellation: false,
        }
    }

    /// Sets the sleep between two reads
    pub fn set_tick(&mut self, tick: Duration) {
        self.tick = tick;
    }

    /// Replaces the cancellation token
    pub fn set_cancellation(&mut self, cancellation: Cancellation) {
        self.cancellation = cancellation;
    }

    /// The token checked by every wait
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Borrows the link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Mutably borrows the link
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Returns the link
    pub fn into_inner(self) -> L {
        self.link
    }

    /// Sends `command` and waits until `expected` appears
    pub fn command<C: Display>(
        &mut self,
        command: C,
        expected: &str,
        timeout: Duration,
    ) -> Result<String, Error> {
        self.command_gated(command, &[expected], &[], timeout)
    }

    /// Sends `command` and waits until any of `accept` appears
    pub fn command_any<C: Display>(
        &mut self,
        command: C,
        accept: &[&str],
        timeout: Duration,
    ) -> Result<String, Error> {
        self.command_gated(command, accept, &[], timeout)
    }

    /// Like [`AtClient::command_any`], but a complete line starting with one
    /// of `reject` fails the command right away
    pub fn command_gated<C: Display>(
        &mut self,
        command: C,
        accept: &[&str],
        reject: &[&str],
        timeout: Duration,
    ) -> Result<String, Error> {
        self.check_cancelled()?;
        self.discard_stale()?;
        self.write_line(command)?;
        self.wait_gated(accept, reject, timeout)
    }

    /// Writes `command` followed by CRLF
    pub fn write_line<C: Display>(&mut self, command: C) -> Result<(), Error> {
        let line = format!("{command}\r\n");
        debug!(">> {}", escape_crlf(&line));
        self.link.write_all(line.as_bytes()).map_err(error::io)
    }

    /// Writes payload bytes after the modem prompted for them
    pub fn raw_send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        debug!(">> <{} bytes>", bytes.len());
        self.link.write_all(bytes).map_err(error::io)
    }

    /// Waits for `token` without sending anything first
    pub fn wait_for(&mut self, token: &str, timeout: Duration) -> Result<String, Error> {
        self.wait_gated(&[token], &[], timeout)
    }

    /// Accumulates input until an accept token or a reject line shows up
    ///
    /// Returns the input up to the end of the earliest accept token. Bytes
    /// past the token, or past the rejected line, stay buffered.
    pub fn wait_gated(
        &mut self,
        accept: &[&str],
        reject: &[&str],
        timeout: Duration,
    ) -> Result<String, Error> {
        let deadline = deadline(timeout);
        let mut buf = Vec::new();
        loop {
            self.check_cancelled()?;
            self.read_into(&mut buf)?;

            if let Some(end) = accepted_end(&buf, accept) {
                self.carry = buf.split_off(end);
                return Ok(String::from_utf8_lossy(&buf).into_owned());
            }
            if let Some((line, end)) = rejected_line(&buf, reject) {
                self.carry = buf.split_off(end);
                return Err(error::modem(line));
            }
            if Instant::now() >= deadline {
                return Err(error::timeout(format!(
                    "no {} within {timeout:?}",
                    accept.join(" | ")
                )));
            }
            thread::sleep(self.tick);
        }
    }

    /// Reads everything buffered right now, carried bytes first
    pub fn drain(&mut self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Appends the carried bytes and whatever the link has buffered to `buf`,
    /// returns the number of bytes appended
    pub(crate) fn read_into(&mut self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        let mut chunk = [0; READ_CHUNK];
        let mut total = self.carry.len();
        buf.append(&mut self.carry);
        loop {
            let n = self.link.read_available(&mut chunk).map_err(error::io)?;
            if n == 0 {
                break;
            }
            debug!("<< {}", escape_crlf(&String::from_utf8_lossy(&chunk[..n])));
            buf.extend_from_slice(&chunk[..n]);
            total += n;
        }
        Ok(total)
    }

    /// Sleeps one tick
    pub(crate) fn tick(&self) {
        thread::sleep(self.tick);
    }

    /// Sleeps, returning early with an error on cancellation
    pub(crate) fn pause(&self, duration: Duration) -> Result<(), Error> {
        if self.ignore_cancellation {
            thread::sleep(duration);
            Ok(())
        } else {
            self.cancellation.pause(duration)
        }
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), Error> {
        if self.ignore_cancellation {
            Ok(())
        } else {
            self.cancellation.check()
        }
    }

    /// Runs cleanup commands with cancellation ignored
    pub(crate) fn best_effort<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let previous = std::mem::replace(&mut self.ignore_cancellation, true);
        let out = f(self);
        self.ignore_cancellation = previous;
        out
    }

    fn discard_stale(&mut self) -> Result<(), Error> {
        let stale = self.drain()?;
        if !stale.is_empty() {
            trace!("discarded {} stale bytes", stale.len());
        }
        Ok(())
    }
}
