// https://tools.ietf.org/html/rfc2047

use crate::base64;

fn allowed_char(c: char) -> bool {
    c.is_ascii() && !c.is_ascii_control()
}

/// Wraps `s` in a single `=?utf-8?b?...?=` encoded word unless it is plain
/// printable ASCII
pub(crate) fn encode(s: &str) -> String {
    if s.chars().all(allowed_char) {
        s.into()
    } else {
        format!("=?utf-8?b?{}?=", base64::encode(s))
    }
}

#[cfg(test)]
pub(crate) fn decode(s: &str) -> Option<String> {
    const PREFIX: &str = "=?utf-8?b?";
    const SUFFIX: &str = "?=";

    let s = s.trim();
    match s.strip_prefix(PREFIX).and_then(|s| s.strip_suffix(SUFFIX)) {
        Some(encoded) => base64::decode(encoded)
            .ok()
            .and_then(|v| String::from_utf8(v).ok()),
        None => Some(s.into()),
    }
}
