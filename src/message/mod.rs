//! Plain-text message composition
//!
//! Builds the DATA payload: `From`, `To`, `Subject` and MIME headers, a blank
//! line, the CRLF-normalized body with SMTP transparency applied, and the
//! `CRLF.CRLF` terminator.

use std::fmt::Write;

use crate::{config::SessionConfig, smtp::codec::ClientCodec};

mod utf8_b;

/// `From` display name when none is set
pub const DEFAULT_SENDER_NAME: &str = "Cellular Modem";
/// `To` display name when none is set
pub const DEFAULT_RECIPIENT_NAME: &str = "Recipient";
/// Subject when none is set
pub const DEFAULT_SUBJECT: &str = "No Subject";

/// Converts every line break to CRLF
///
/// CRLF pairs are kept, lone LF and lone CR become CRLF.
pub fn normalize_line_breaks(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 16);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\r\n");
            }
            '\n' => out.push_str("\r\n"),
            c => out.push(c),
        }
    }
    out
}

/// Builds the complete DATA payload for `config`
///
/// The result is ready to be written as is after the 354 reply.
pub fn compose(config: &SessionConfig) -> Vec<u8> {
    let mut headers = String::with_capacity(256);
    // Writing to a String cannot fail.
    let _ = write!(
        headers,
        "From: {} <{}>\r\n\
         To: {} <{}>\r\n\
         Subject: {}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/plain; charset=UTF-8\r\n\
         \r\n",
        display_name(&config.sender_name, DEFAULT_SENDER_NAME),
        single_line(&config.account),
        display_name(&config.recipient_name, DEFAULT_RECIPIENT_NAME),
        single_line(&config.recipient),
        utf8_b::encode(&header_text(&config.subject, DEFAULT_SUBJECT)),
    );

    let body = config.body();
    let mut payload = Vec::with_capacity(headers.len() + body.len() + 16);
    let mut codec = ClientCodec::new();
    codec.encode(headers.as_bytes(), &mut payload);
    codec.encode(body.as_bytes(), &mut payload);
    payload.extend_from_slice(b"\r\n.\r\n");
    payload
}

/// Header text on one line, `default` when empty
fn header_text(value: &str, default: &str) -> String {
    let value = single_line(value);
    let value = value.trim();
    if value.is_empty() {
        default.to_owned()
    } else {
        value.to_owned()
    }
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// Display name as an atom phrase, a quoted string, or an encoded word
fn display_name(value: &str, default: &str) -> String {
    let name = header_text(value, default);
    if !name.is_ascii() {
        return utf8_b::encode(&name);
    }
    if name.bytes().all(is_atom_char) {
        return name;
    }
    // https://datatracker.ietf.org/doc/html/rfc2822#section-3.2.5
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for c in name.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

// https://datatracker.ietf.org/doc/html/rfc2822#section-3.2.4
fn is_atom_char(c: u8) -> bool {
    matches!(c,
        // Not really allowed but can be inserted between atoms.
        b'\t' | b' ' |
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'/' |
        b'0'..=b'9' |
        b'=' | b'?' |
        b'A'..=b'Z' |
        b'^' | b'_' | b'`' |
        b'a'..=b'z' |
        b'{' | b'|' | b'}' | b'~')
}
