//! RFC 2047 decoding for header values delivered by the server.
//!
//! Envelope subjects, address display names and MIME parameter values may
//! carry encoded words of the form `=?charset?encoding?text?=`.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use encoding_rs::Encoding;
use regex::Regex;

static ENCODED_WORD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"=\?([^?\s]+)\?([BbQq])\?([^?\s]*)\?=").ok());

/// Decodes every encoded word in `raw` and returns the resulting text.
///
/// Whitespace between two adjacent encoded words is dropped. Words with an
/// unknown charset or a broken payload are left verbatim. Invalid UTF-8
/// outside encoded words is replaced.
#[must_use]
pub fn decode_header_value(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let Some(pattern) = ENCODED_WORD.as_ref() else {
        return text.into_owned();
    };

    let mut out = String::with_capacity(text.len());
    let mut last_end = 0;
    let mut previous_decoded = false;

    for caps in pattern.captures_iter(&text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let between = &text[last_end..whole.start()];
        let decoded = decode_word(&caps[1], &caps[2], &caps[3]);

        let adjacent = previous_decoded && between.chars().all(char::is_whitespace);
        if !(adjacent && decoded.is_some()) {
            out.push_str(between);
        }
        match decoded {
            Some(value) => {
                out.push_str(&value);
                previous_decoded = true;
            }
            None => {
                out.push_str(whole.as_str());
                previous_decoded = false;
            }
        }
        last_end = whole.end();
    }
    out.push_str(&text[last_end..]);
    out
}

fn decode_word(charset: &str, encoding: &str, payload: &str) -> Option<String> {
    // RFC 2231 allows a language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);
    let encoding_impl = Encoding::for_label(charset.trim().as_bytes())?;

    let bytes = if encoding.eq_ignore_ascii_case("B") {
        STANDARD.decode(payload).ok()?
    } else {
        decode_q(payload)?
    };

    let (value, _) = encoding_impl.decode_without_bom_handling(&bytes);
    Some(value.into_owned())
}

fn decode_q(payload: &str) -> Option<Vec<u8>> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' => {
                let hex = bytes.get(i + 1..i + 3)?;
                let hex = std::str::from_utf8(hex).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Some(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(decode_header_value(b"Quarterly report"), "Quarterly report");
        assert_eq!(decode_header_value(b""), "");
    }

    #[test]
    fn test_base64_word() {
        assert_eq!(
            decode_header_value(b"=?UTF-8?B?SGVsbG8sIFdvcmxkIQ==?="),
            "Hello, World!"
        );
    }

    #[test]
    fn test_q_word_with_charset() {
        assert_eq!(
            decode_header_value(b"=?ISO-8859-1?Q?Andr=E9_Pirard?="),
            "Andr\u{e9} Pirard"
        );
    }

    #[test]
    fn test_adjacent_words_join() {
        assert_eq!(
            decode_header_value(b"=?utf-8?q?a?= =?utf-8?q?b?=  =?utf-8?b?Yw==?="),
            "abc"
        );
    }

    #[test]
    fn test_mixed_with_plain_text() {
        assert_eq!(
            decode_header_value(b"Re: =?utf-8?q?caf=C3=A9?= meeting"),
            "Re: caf\u{e9} meeting"
        );
    }

    #[test]
    fn test_invalid_words_kept() {
        assert_eq!(
            decode_header_value(b"=?x-unknown?q?abc?= tail"),
            "=?x-unknown?q?abc?= tail"
        );
        assert_eq!(decode_header_value(b"=?utf-8?q?bad=Z?="), "=?utf-8?q?bad=Z?=");
        assert_eq!(decode_header_value(b"=?utf-8?b?***?="), "=?utf-8?b?***?=");
    }
}
