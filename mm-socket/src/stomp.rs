//! STOMP 1.2 frame codec.
//!
//! Frames travel as WebSocket text messages:
//! `COMMAND\nheader:value\n...\n\nbody\0`. A bare end-of-line between
//! frames is a heart-beat. One text message may carry several frames.

use std::fmt;
use std::time::Duration;

use mm_core::error::{MmError, MmResult};

/// STOMP commands used by this client, in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
        }
    }

    pub fn parse(s: &str) -> MmResult<Self> {
        match s {
            // STOMP 1.2 clients may send STOMP instead of CONNECT.
            "CONNECT" | "STOMP" => Ok(Self::Connect),
            "CONNECTED" => Ok(Self::Connected),
            "SUBSCRIBE" => Ok(Self::Subscribe),
            "MESSAGE" => Ok(Self::Message),
            "RECEIPT" => Ok(Self::Receipt),
            "ERROR" => Ok(Self::Error),
            "DISCONNECT" => Ok(Self::Disconnect),
            other => Err(MmError::Protocol(format!("unknown command: {other}"))),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame. Headers keep their wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of a header. Repeated headers resolve to the first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize into wire form, including the trailing NUL.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        // CONNECT and CONNECTED headers are never escaped.
        let escape = !matches!(self.command, Command::Connect | Command::Connected);
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    fn decode_one(raw: &str) -> MmResult<Self> {
        let (head, body) = match raw.find("\n\n") {
            Some(idx) => (&raw[..idx], &raw[idx + 2..]),
            None => match raw.find("\r\n\r\n") {
                Some(idx) => (&raw[..idx], &raw[idx + 4..]),
                None => (raw.trim_end_matches(['\r', '\n']), ""),
            },
        };

        let mut lines = head.lines();
        let command_line = lines
            .next()
            .ok_or_else(|| MmError::Protocol("empty frame".into()))?;
        let command = Command::parse(command_line.trim_end_matches('\r'))?;
        let unescape = !matches!(command, Command::Connect | Command::Connected);

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| MmError::Protocol(format!("malformed header: {line}")))?;
            if unescape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        Ok(Self {
            command,
            headers,
            body: body.to_string(),
        })
    }
}

/// Items produced by splitting one transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Frame(Frame),
    HeartBeat,
}

/// Split one transport text message into frames and heart-beats.
///
/// Each NUL-terminated frame decodes on its own, so one malformed frame
/// leaves its neighbours intact.
pub fn decode(text: &str) -> Vec<MmResult<Incoming>> {
    let mut items = Vec::new();
    let mut rest = text;

    loop {
        // End-of-lines before a command are heart-beats.
        let trimmed = rest.trim_start_matches(['\r', '\n']);
        if trimmed.len() != rest.len() {
            items.push(Ok(Incoming::HeartBeat));
        }
        rest = trimmed;
        if rest.is_empty() {
            break;
        }

        let end = rest.find('\0').unwrap_or(rest.len());
        items.push(Frame::decode_one(&rest[..end]).map(Incoming::Frame));
        rest = if end < rest.len() { &rest[end + 1..] } else { "" };
    }

    items
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> MmResult<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(MmError::Protocol(format!(
                    "invalid header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Heart-beat intervals as `(outgoing, incoming)` in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

impl HeartBeat {
    pub fn new(outgoing_ms: u64, incoming_ms: u64) -> Self {
        Self {
            outgoing_ms,
            incoming_ms,
        }
    }

    /// Parse a `heart-beat:cx,cy` header value. Absent or garbled means `0,0`.
    pub fn parse(value: Option<&str>) -> Self {
        let Some((x, y)) = value.and_then(|v| v.split_once(',')) else {
            return Self::default();
        };
        Self {
            outgoing_ms: x.trim().parse().unwrap_or(0),
            incoming_ms: y.trim().parse().unwrap_or(0),
        }
    }

    pub fn header_value(&self) -> String {
        format!("{},{}", self.outgoing_ms, self.incoming_ms)
    }

    /// Negotiate our offer against the server's CONNECTED header.
    ///
    /// Each direction is disabled if either side says 0, otherwise the larger
    /// of the two values wins.
    pub fn negotiate(&self, server: &HeartBeat) -> Negotiated {
        let pick = |ours: u64, theirs: u64| {
            (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
        };
        Negotiated {
            send_every: pick(self.outgoing_ms, server.incoming_ms),
            expect_every: pick(self.incoming_ms, server.outgoing_ms),
        }
    }
}

/// Result of heart-beat negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// How often we must write something.
    pub send_every: Option<Duration>,
    /// How often the server promised to write something.
    pub expect_every: Option<Duration>,
}

/// The heart-beat payload written on the wire.
pub const HEARTBEAT_EOL: &str = "\n";
