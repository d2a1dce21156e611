//! Message-set codec: integer ids to and from IMAP sequence-set syntax.

use std::collections::BTreeSet;
use std::fmt;

use crate::{Error, Result};

/// Raw message-set input: plain ids and range literals such as `5:88` or
/// `1:*`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdSet(Vec<String>);

impl IdSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds one token.
    pub fn push(&mut self, token: impl Into<String>) {
        let token = token.into();
        let token = token.trim();
        if !token.is_empty() {
            self.0.push(token.to_string());
        }
    }

    /// Returns true when no token was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The tokens as given.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for IdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

impl From<&str> for IdSet {
    fn from(value: &str) -> Self {
        value.split(',').collect()
    }
}

impl From<String> for IdSet {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<u32> for IdSet {
    fn from(value: u32) -> Self {
        Self(vec![value.to_string()])
    }
}

impl From<u64> for IdSet {
    fn from(value: u64) -> Self {
        Self(vec![value.to_string()])
    }
}

impl From<&[u32]> for IdSet {
    fn from(value: &[u32]) -> Self {
        value.iter().map(u32::to_string).collect()
    }
}

impl From<Vec<u32>> for IdSet {
    fn from(value: Vec<u32>) -> Self {
        Self::from(value.as_slice())
    }
}

impl From<&[u64]> for IdSet {
    fn from(value: &[u64]) -> Self {
        value.iter().map(u64::to_string).collect()
    }
}

impl From<Vec<u64>> for IdSet {
    fn from(value: Vec<u64>) -> Self {
        Self::from(value.as_slice())
    }
}

impl From<&BTreeSet<u64>> for IdSet {
    fn from(value: &BTreeSet<u64>) -> Self {
        value.iter().map(u64::to_string).collect()
    }
}

impl<S: Into<String>> FromIterator<S> for IdSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for token in iter {
            set.push(token);
        }
        set
    }
}

/// Compresses ids into sorted runs: `[1, 2, 3, 7]` becomes `["1:3", "7"]`.
///
/// Duplicates and zero are dropped.
#[must_use]
pub fn compress<I: IntoIterator<Item = u64>>(ids: I) -> Vec<String> {
    let ids: BTreeSet<u64> = ids.into_iter().filter(|&id| id != 0).collect();
    let mut out = Vec::new();
    let mut run: Option<(u64, u64)> = None;

    for id in ids {
        run = match run {
            Some((start, end)) if end + 1 == id => Some((start, id)),
            Some(finished) => {
                out.push(render_run(finished));
                Some((id, id))
            }
            None => Some((id, id)),
        };
    }
    if let Some(finished) = run {
        out.push(render_run(finished));
    }
    out
}

fn render_run((start, end): (u64, u64)) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}:{end}")
    }
}

/// Renders a message set: range literals first, then the compressed plain
/// ids, comma-joined.
///
/// `"1,2,3,4,5,6,7,47,8,87,5:88"` renders as `"5:88,1:8,47,87"`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for a token that is neither a number
/// nor a range.
pub fn expand(ids: impl Into<IdSet>) -> Result<String> {
    let ids = ids.into();
    let mut ranges = Vec::new();
    let mut numbers = Vec::new();

    for token in ids.tokens() {
        if token.bytes().all(|b| b.is_ascii_digit()) {
            let id = token
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("Message id out of range: {token}")))?;
            numbers.push(id);
        } else if is_range(token) {
            ranges.push(token.clone());
        } else {
            return Err(Error::InvalidArgument(format!(
                "Invalid message set item: {token}"
            )));
        }
    }

    ranges.extend(compress(numbers));
    Ok(ranges.join(","))
}

fn is_range(token: &str) -> bool {
    let Some((start, end)) = token.split_once(':') else {
        return false;
    };
    let bound = |s: &str| s == "*" || (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()));
    bound(start) && bound(end)
}

/// Parses a rendered message set back into ids.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for malformed items and for `*`,
/// which cannot be resolved without a mailbox.
pub fn parse_set(set: &str) -> Result<BTreeSet<u64>> {
    let number = |s: &str| {
        s.parse::<u64>()
            .map_err(|_| Error::InvalidArgument(format!("Invalid message set item: {s}")))
    };
    let mut ids = BTreeSet::new();
    for item in set.split(',').filter(|s| !s.is_empty()) {
        match item.split_once(':') {
            Some((start, end)) => {
                let (start, end) = (number(start)?, number(end)?);
                ids.extend(start.min(end)..=start.max(end));
            }
            None => {
                ids.insert(number(item)?);
            }
        }
    }
    Ok(ids)
}
