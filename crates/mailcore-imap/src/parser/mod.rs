//! Response parsing: tokenizer, FETCH item registry and untagged
//! response bookkeeping.

pub mod atoms;
pub mod tokenizer;
pub mod untagged;

pub use atoms::{AtomMeta, map_atom, parse_fetch_response};
pub use tokenizer::{ResponseTokenizer, Token, tokenize};
pub use untagged::{ResponseLine, UntaggedResponses, bracketed_code, split_untagged};
