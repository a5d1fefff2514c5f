//! Command/response correlation state.
//!
//! This is the synchronous half of the protocol engine: it decides, line by
//! line, whether input is the echo of our own command, a reply header, part
//! of a reply body, the terminal status, or an unsolicited notification. The
//! async loop in [`crate::engine`] feeds it and acts on the [`Outcome`].

use crate::error::Result;
use crate::packet::{self, Packet};
use log::debug;
use regex::Regex;
use std::sync::OnceLock;

static RE_QUESTION: OnceLock<Regex> = OnceLock::new();

/// The `+CODE` prefix of a query command, if the command is one.
pub fn question_prefix(command: &str) -> Option<String> {
    let re = RE_QUESTION.get_or_init(|| Regex::new(r"AT(\+[A-Z]+)").unwrap());
    re.captures(command)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// No reply header seen; stray lines are unsolicited.
    #[default]
    Idle,
    /// A reply header arrived; lines until the status line are its body.
    AwaitingBody { header: String, body: Vec<String> },
}

/// What a single input line turned out to be.
#[derive(Debug)]
pub enum Outcome {
    Echo,
    Header,
    Body,
    /// Terminal status: the reply for the in-flight command.
    Reply(Result<Packet>),
    /// A self-contained line outside any reply. `None` for suppressed nags.
    Unsolicited(Result<Option<Packet>>),
}

#[derive(Debug, Default)]
pub struct Exchange {
    echo: Option<String>,
    question: Option<String>,
    phase: Phase,
}

impl Exchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a command about to be written to the modem.
    pub fn begin(&mut self, command: &str) {
        self.question = question_prefix(command);
        self.echo = Some(command.trim_end_matches(['\r', '\n']).to_string());
    }

    pub fn feed(&mut self, line: String) -> Outcome {
        if self.echo.as_deref() == Some(line.as_str()) {
            debug!("Ignoring echo of {}", line);
            return Outcome::Echo;
        }

        if let Some(question) = &self.question {
            if line.starts_with(question.as_str()) {
                match &mut self.phase {
                    Phase::AwaitingBody { header, .. } => *header = line,
                    Phase::Idle => {
                        self.phase = Phase::AwaitingBody {
                            header: line,
                            body: Vec::new(),
                        }
                    }
                }
                return Outcome::Header;
            }
        }

        if line == "OK" || line == "ERROR" {
            return Outcome::Reply(self.finish(&line));
        }

        match &mut self.phase {
            Phase::AwaitingBody { body, .. } => {
                body.push(line);
                Outcome::Body
            }
            Phase::Idle => Outcome::Unsolicited(packet::decode("OK", &line, "")),
        }
    }

    fn finish(&mut self, status: &str) -> Result<Packet> {
        let phase = std::mem::take(&mut self.phase);
        self.question = None;
        let (header, body) = match phase {
            Phase::Idle => (String::new(), String::new()),
            Phase::AwaitingBody { header, body } => (header, body.join("\n")),
        };
        match packet::decode(status, &header, &body)? {
            Some(packet) => Ok(packet),
            // a suppressed header still answers the command
            None => packet::decode(status, "", "").map(|p| p.unwrap_or(Packet::Ok)),
        }
    }

    /// Drop any half-assembled reply, e.g. after a timeout.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.question = None;
    }

    #[cfg(test)]
    pub fn question(&self) -> Option<&str> {
        self.question.as_deref()
    }

    #[cfg(test)]
    pub fn phase(&self) -> &Phase {
        &self.phase
    }
}
