//! One journal line == one durable fact.
//!
//! A record is `METHOD QUEUE MESSAGE` joined by single spaces and then
//! percent-escaped as a whole, so the stored line never contains a raw
//! space or newline. DEL records carry an empty message.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::error::JournalError;

/// Bytes left unescaped in a stored line.
const ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Set,
    Get,
    Del,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Set => "SET",
            Method::Get => "GET",
            Method::Del => "DEL",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SET" => Ok(Method::Set),
            "GET" => Ok(Method::Get),
            "DEL" => Ok(Method::Del),
            other => Err(JournalError::malformed(format!("unknown method {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub method: Method,
    pub queue: String,
    pub message: String,
}

impl JournalRecord {
    pub fn set(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method: Method::Set,
            queue: queue.into(),
            message: message.into(),
        }
    }

    pub fn get(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            queue: queue.into(),
            message: message.into(),
        }
    }

    pub fn del(queue: impl Into<String>) -> Self {
        Self {
            method: Method::Del,
            queue: queue.into(),
            message: String::new(),
        }
    }

    /// Escaped line, without the trailing newline.
    pub fn encode(&self) -> String {
        let raw = format!("{} {} {}", self.method, self.queue, self.message);
        utf8_percent_encode(&raw, ESCAPE).to_string()
    }

    /// Parses one stored line (trailing `\r`/`\n` tolerated).
    ///
    /// `+` decodes to a space so lines written by query-style escapers
    /// replay unchanged.
    pub fn decode(line: &str) -> Result<Self, JournalError> {
        let line = line.trim_end_matches(['\r', '\n']);
        check_escapes(line)?;

        let spaced = line.replace('+', " ");
        let raw = percent_decode_str(&spaced)
            .decode_utf8()
            .map_err(|e| JournalError::malformed(format!("invalid UTF-8: {e}")))?;

        let mut parts = raw.splitn(3, ' ');
        let method: Method = parts.next().unwrap_or_default().parse()?;
        let queue = parts
            .next()
            .filter(|q| !q.is_empty())
            .ok_or_else(|| JournalError::malformed("missing queue name"))?;
        let message = parts.next();

        match (method, message) {
            (Method::Del, _) => Ok(JournalRecord::del(queue)),
            (_, Some(message)) if !message.is_empty() => Ok(JournalRecord {
                method,
                queue: queue.to_string(),
                message: message.to_string(),
            }),
            _ => Err(JournalError::malformed(format!("{method} without message"))),
        }
    }
}

fn check_escapes(line: &str) -> Result<(), JournalError> {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(JournalError::malformed(format!("bad escape at byte {i}")));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}
