//! IMAP command tag generator.
//!
//! Tags are used to match commands with their responses.

/// Tag generator for IMAP commands.
///
/// Generates sequential tags in the format "A0000", "A0001", etc.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u32,
    prefix: String,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            counter: 0,
            prefix: prefix.into(),
        }
    }

    /// Generates the next tag.
    ///
    /// The counter wraps after `u32::MAX`; tags only need to be unique among
    /// commands in flight, and there is never more than one.
    pub fn next_tag(&mut self) -> String {
        let n = self.counter;
        self.counter = self.counter.wrapping_add(1);
        format!("{}{:04}", self.prefix, n)
    }

    /// Returns the current counter value without incrementing.
    #[must_use]
    pub const fn current(&self) -> u32 {
        self.counter
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new("A")
    }
}
