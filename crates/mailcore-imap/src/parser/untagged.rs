//! Untagged response bookkeeping.
//!
//! Untagged lines are stored by response name as they arrive and drained by
//! the command that asked for them. A line such as `* 12 FETCH (...)` is
//! stored under `FETCH` with data `12 (...)`, and `* 5 EXISTS` under
//! `EXISTS` with data `5`. Status lines with a bracketed code are stored
//! twice: once under the status and once under the code, so
//! `* OK [UIDVALIDITY 3] ok` also yields `UIDVALIDITY` with data `3`.

use bytes::Bytes;

/// Data of one untagged response after its name was split off.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseLine {
    /// Line text with literal data removed and `{n}` markers kept.
    pub data: Bytes,
    /// Literal buffers in wire order.
    pub literals: Vec<Bytes>,
}

impl ResponseLine {
    /// Creates a line without literals.
    #[must_use]
    pub const fn new(data: Bytes) -> Self {
        Self {
            data,
            literals: Vec::new(),
        }
    }

    /// Returns the data as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Ordered accumulator of untagged responses keyed by name.
#[derive(Debug, Clone, Default)]
pub struct UntaggedResponses {
    entries: Vec<(String, ResponseLine)>,
}

impl UntaggedResponses {
    /// Creates an empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records the body of an untagged line (the text after `* `).
    pub fn record(&mut self, body: &[u8], literals: Vec<Bytes>) {
        let Some(split) = split_untagged(body) else {
            return;
        };
        if let Some((code, data)) = split.code {
            self.push(code, ResponseLine::new(data));
        }
        self.push(
            split.name,
            ResponseLine {
                data: split.data,
                literals,
            },
        );
    }

    /// Appends an entry under `name` (stored uppercase).
    pub fn push(&mut self, name: impl AsRef<str>, line: ResponseLine) {
        self.entries
            .push((name.as_ref().to_ascii_uppercase(), line));
    }

    /// Removes and returns every entry with `name`, in arrival order.
    pub fn take(&mut self, name: &str) -> Vec<ResponseLine> {
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for (key, line) in self.entries.drain(..) {
            if key.eq_ignore_ascii_case(name) {
                taken.push(line);
            } else {
                kept.push((key, line));
            }
        }
        self.entries = kept;
        taken
    }

    /// Removes all entries with `name` and returns the last one.
    pub fn take_last(&mut self, name: &str) -> Option<ResponseLine> {
        self.take(name).pop()
    }

    /// Returns true if an entry with `name` is pending.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// Removes and returns everything.
    pub fn drain(&mut self) -> Vec<(String, ResponseLine)> {
        std::mem::take(&mut self.entries)
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An untagged line split into name and data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntaggedSplit {
    /// Uppercase response name.
    pub name: String,
    /// Remaining data.
    pub data: Bytes,
    /// Bracketed response code and its argument, for status responses.
    pub code: Option<(String, Bytes)>,
}

/// Splits the text after `* ` into name, data and optional code.
#[must_use]
pub fn split_untagged(body: &[u8]) -> Option<UntaggedSplit> {
    let (first, rest) = split_word(body);
    if first.is_empty() {
        return None;
    }

    let (name, data) = if first.iter().all(u8::is_ascii_digit) {
        let (second, tail) = split_word(rest);
        if second.is_empty() {
            return None;
        }
        let mut data = first.to_vec();
        if !tail.is_empty() {
            data.push(b' ');
            data.extend_from_slice(tail);
        }
        (second, Bytes::from(data))
    } else {
        (first, Bytes::copy_from_slice(rest))
    };

    let name = String::from_utf8_lossy(name).to_ascii_uppercase();
    let code = if matches!(name.as_str(), "OK" | "NO" | "BAD" | "PREAUTH" | "BYE") {
        bracketed_code(&data)
    } else {
        None
    };

    Some(UntaggedSplit { name, data, code })
}

/// Extracts `[CODE data]` from the start of a status text.
///
/// The code name is uppercased.
#[must_use]
pub fn bracketed_code(text: &[u8]) -> Option<(String, Bytes)> {
    let inner = text.strip_prefix(b"[")?;
    let end = inner.iter().position(|&b| b == b']')?;
    let inner = &inner[..end];
    let (code, data) = split_word(inner);
    if code.is_empty() {
        return None;
    }
    Some((
        String::from_utf8_lossy(code).to_ascii_uppercase(),
        Bytes::copy_from_slice(data),
    ))
}

fn split_word(input: &[u8]) -> (&[u8], &[u8]) {
    let input = trim_start(input);
    match input.iter().position(|&b| b == b' ') {
        Some(i) => (&input[..i], trim_start(&input[i + 1..])),
        None => (input, &input[input.len()..]),
    }
}

fn trim_start(input: &[u8]) -> &[u8] {
    let start = input.iter().position(|&b| b != b' ').unwrap_or(input.len());
    &input[start..]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_split_numeric_responses() {
        let split = split_untagged(b"12 FETCH (UID 5 FLAGS (\\Seen))").unwrap();
        assert_eq!(split.name, "FETCH");
        assert_eq!(&split.data[..], b"12 (UID 5 FLAGS (\\Seen))");

        let split = split_untagged(b"5 exists").unwrap();
        assert_eq!(split.name, "EXISTS");
        assert_eq!(&split.data[..], b"5");
        assert!(split.code.is_none());
    }

    #[test]
    fn test_split_named_responses() {
        let split = split_untagged(b"LIST (\\HasNoChildren) \"/\" INBOX").unwrap();
        assert_eq!(split.name, "LIST");
        assert_eq!(&split.data[..], b"(\\HasNoChildren) \"/\" INBOX");

        let split = split_untagged(b"SEARCH").unwrap();
        assert_eq!(split.name, "SEARCH");
        assert!(split.data.is_empty());
        assert!(split_untagged(b"").is_none());
        assert!(split_untagged(b"42").is_none());
    }

    #[test]
    fn test_status_codes() {
        let split = split_untagged(b"OK [UIDVALIDITY 3857529045] UIDs valid").unwrap();
        assert_eq!(split.name, "OK");
        let (code, data) = split.code.unwrap();
        assert_eq!(code, "UIDVALIDITY");
        assert_eq!(&data[..], b"3857529045");

        let (code, data) = bracketed_code(b"[read-write] done").unwrap();
        assert_eq!(code, "READ-WRITE");
        assert!(data.is_empty());
        assert!(bracketed_code(b"no code here").is_none());
        assert!(bracketed_code(b"[unterminated").is_none());
    }

    #[test]
    fn test_record_and_take() {
        let mut untagged = UntaggedResponses::new();
        untagged.record(b"3 EXISTS", Vec::new());
        untagged.record(b"OK [UIDNEXT 4392] Predicted next UID", Vec::new());
        untagged.record(b"1 FETCH (BODY[] {2})", vec![Bytes::from_static(b"hi")]);
        untagged.record(b"4 EXISTS", Vec::new());
        assert_eq!(untagged.len(), 5);
        assert!(untagged.contains("uidnext"));

        let exists = untagged.take("EXISTS");
        assert_eq!(exists.len(), 2);
        assert_eq!(exists[1].text(), "4");

        let fetch = untagged.take_last("FETCH").unwrap();
        assert_eq!(fetch.literals, vec![Bytes::from_static(b"hi")]);
        assert!(untagged.take("FETCH").is_empty());

        let rest = untagged.drain();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].0, "UIDNEXT");
        assert_eq!(rest[1].0, "OK");
        assert!(untagged.is_empty());
    }
}
