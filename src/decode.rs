// src/decode.rs

//! Charset recovery for troff sources
//!
//! Man pages inside packages are not guaranteed to be in any single encoding.
//! The decoder walks an ordered list of charsets and returns the first clean
//! decode. If every charset rejects the input it falls back to statistical
//! detection and lossy decoding, so `decode` always produces a string.
//!
//! Single-byte charsets accept any input. In the default list ISO-8859-1
//! therefore ends the walk for anything that is not UTF-8, the later entries
//! are never tried, and detection only runs for lists without a single-byte
//! charset. `iso-8859-1` is true Latin-1: bytes 0x80-0x9F become C1 control
//! characters. WHATWG, and so `encoding_rs::Encoding::for_label`, would map
//! the label to windows-1252 instead.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use tracing::debug;

/// Charset labels tried in order by the default decoder
pub const DEFAULT_CHARSETS: &[&str] = &[
    "utf-8",
    "ascii",
    "iso-8859-1",
    "iso-8859-9",
    "iso-8859-15",
    "cp1250",
    "cp1252",
];

/// A single entry in the decoder's fallback list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// Strict UTF-8
    Utf8,
    /// 7-bit ASCII only
    Ascii,
    /// ISO-8859-1, every byte mapped to the code point of the same value
    Latin1,
    /// Any other WHATWG encoding
    Other(&'static Encoding),
}

impl Charset {
    /// Resolve a charset label. Unknown labels yield None.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Self::Utf8),
            // WHATWG maps "ascii" to windows-1252, which never rejects input
            "ascii" | "us-ascii" => Some(Self::Ascii),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1" => Some(Self::Latin1),
            other => Encoding::for_label(other.as_bytes()).map(Self::Other),
        }
    }

    /// Decode without replacement; None when the bytes are invalid here
    fn decode_strict(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            Self::Ascii => {
                if bytes.is_ascii() {
                    std::str::from_utf8(bytes).ok().map(str::to_string)
                } else {
                    None
                }
            }
            Self::Latin1 => Some(encoding_rs::mem::decode_latin1(bytes).into_owned()),
            Self::Other(encoding) => encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|cow| cow.into_owned()),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Ascii => "ASCII",
            Self::Latin1 => "ISO-8859-1",
            Self::Other(encoding) => encoding.name(),
        }
    }
}

/// Ordered charset fallback decoder
#[derive(Debug, Clone)]
pub struct TextDecoder {
    charsets: Vec<Charset>,
}

impl TextDecoder {
    /// Create a decoder with an explicit charset list
    pub fn new(charsets: Vec<Charset>) -> Self {
        Self { charsets }
    }

    /// Create a decoder from charset labels, ignoring unknown labels
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let charsets = labels
            .iter()
            .filter_map(|label| Charset::from_label(label.as_ref()))
            .collect();
        Self::new(charsets)
    }

    /// Decode bytes into a string. Never fails.
    pub fn decode(&self, bytes: &[u8]) -> String {
        for charset in &self.charsets {
            if let Some(text) = charset.decode_strict(bytes) {
                return text;
            }
        }

        let mut detector = EncodingDetector::new();
        detector.feed(bytes, true);
        let encoding = detector.guess(None, true);
        debug!(
            "No configured charset ({}) decoded cleanly, detected {}",
            self.charsets
                .iter()
                .map(Charset::name)
                .collect::<Vec<_>>()
                .join(", "),
            encoding.name()
        );

        let (text, _had_errors) = encoding.decode_without_bom_handling(bytes);
        text.into_owned()
    }
}

impl Default for TextDecoder {
    fn default() -> Self {
        Self::from_labels(DEFAULT_CHARSETS)
    }
}
