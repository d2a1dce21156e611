//! In-memory transport that replays scripted server replies.

use std::collections::VecDeque;
use std::io;

use bytes::Bytes;

use crate::command::Request;
use crate::connection::{Completion, Status, Transport};
use crate::parser::UntaggedResponses;
use crate::types::Capabilities;
use crate::{Error, Result};

enum Reply {
    Complete {
        untagged: Vec<(Vec<u8>, Vec<Bytes>)>,
        status: Status,
        text: String,
    },
    Fail,
    Bye(String),
}

/// Transport that answers each request with the next scripted reply.
pub struct ScriptedTransport {
    /// Requests in the order they were sent.
    pub sent: Vec<Request>,
    /// Number of shutdown calls.
    pub shutdowns: usize,
    replies: VecDeque<Reply>,
    untagged: UntaggedResponses,
    capabilities: Capabilities,
}

impl ScriptedTransport {
    pub fn new(capabilities: &[&str]) -> Self {
        Self {
            sent: Vec::new(),
            shutdowns: 0,
            replies: VecDeque::new(),
            untagged: UntaggedResponses::new(),
            capabilities: capabilities.iter().collect(),
        }
    }

    /// Queues an OK completion preceded by untagged lines (text after `* `).
    pub fn ok(self, untagged: &[&str]) -> Self {
        self.reply(Status::Ok, "completed", untagged)
    }

    /// Queues a completion with the given status and text.
    pub fn reply(mut self, status: Status, text: &str, untagged: &[&str]) -> Self {
        self.replies.push_back(Reply::Complete {
            untagged: untagged
                .iter()
                .map(|line| (line.as_bytes().to_vec(), Vec::new()))
                .collect(),
            status,
            text: text.to_string(),
        });
        self
    }

    /// Queues an OK completion preceded by one untagged line with literals.
    pub fn ok_with_literals(mut self, line: &[u8], literals: &[&[u8]]) -> Self {
        self.replies.push_back(Reply::Complete {
            untagged: vec![(
                line.to_vec(),
                literals.iter().map(|l| Bytes::copy_from_slice(l)).collect(),
            )],
            status: Status::Ok,
            text: "completed".to_string(),
        });
        self
    }

    /// Queues an I/O failure.
    pub fn fail(mut self) -> Self {
        self.replies.push_back(Reply::Fail);
        self
    }

    /// Queues a BYE disconnect.
    pub fn bye(mut self, text: &str) -> Self {
        self.replies.push_back(Reply::Bye(text.to_string()));
        self
    }

    /// Verbs of the sent requests.
    pub fn verbs(&self) -> Vec<&str> {
        self.sent.iter().map(Request::verb).collect()
    }

    /// Number of replies not yet consumed.
    pub fn pending(&self) -> usize {
        self.replies.len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, request: &Request) -> Result<Completion> {
        self.sent.push(request.clone());
        match self.replies.pop_front() {
            Some(Reply::Complete {
                untagged,
                status,
                text,
            }) => {
                for (line, literals) in untagged {
                    self.untagged.record(&line, literals);
                }
                Ok(Completion {
                    tag: format!("T{}", self.sent.len()),
                    status,
                    text,
                })
            }
            Some(Reply::Bye(text)) => Err(Error::Bye(text)),
            Some(Reply::Fail) | None => Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            ))),
        }
    }

    fn untagged(&mut self) -> &mut UntaggedResponses {
        &mut self.untagged
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn host(&self) -> &str {
        "imap.example.com"
    }

    fn port(&self) -> u16 {
        143
    }

    fn shutdown(&mut self) -> Result<()> {
        self.shutdowns += 1;
        Ok(())
    }
}
