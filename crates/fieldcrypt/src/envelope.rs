//! The stored string form of an encrypted field.
//!
//! # Format
//!
//! ```text
//! <remote-ciphertext>[:<64 hex chars>]
//! ```
//!
//! The remote ciphertext is opaque and may itself contain colons
//! (`vault:v1:...`, `kms:v1:...`), so the tag is recognised only as the
//! suffix after the LAST colon, and only when that suffix is exactly 64 hex
//! characters. Anything else is legacy untagged ciphertext.

use std::fmt;

use thiserror::Error;

use crate::tag::TAG_HEX_LEN;

/// Separator between the remote ciphertext and the tag.
pub const TAG_SEPARATOR: char = ':';

/// Errors produced when parsing an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The envelope has a tag-shaped suffix but no ciphertext before it.
    #[error("envelope has an integrity tag but no ciphertext")]
    EmptyAfterTagStrip,
}

/// A parsed envelope borrowing from the stored string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    /// Ciphertext exactly as returned by the key service.
    pub remote_ciphertext: &'a str,
    /// Integrity tag, absent for legacy data.
    pub tag: Option<&'a str>,
}

impl<'a> Envelope<'a> {
    /// Parse a stored envelope string.
    ///
    /// An empty input parses to an empty ciphertext with no tag; callers are
    /// expected to short-circuit empty values before reaching this point.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::EmptyAfterTagStrip`] if the input is nothing
    /// but a separator and a tag.
    pub fn parse(s: &'a str) -> Result<Self, EnvelopeError> {
        if let Some((head, suffix)) = s.rsplit_once(TAG_SEPARATOR) {
            if is_tag(suffix) {
                if head.is_empty() {
                    return Err(EnvelopeError::EmptyAfterTagStrip);
                }
                return Ok(Self {
                    remote_ciphertext: head,
                    tag: Some(suffix),
                });
            }
        }
        Ok(Self {
            remote_ciphertext: s,
            tag: None,
        })
    }

    /// Render `remote_ciphertext` with an optional tag appended.
    pub fn serialize(remote_ciphertext: &str, tag: Option<&str>) -> String {
        match tag {
            Some(tag) => format!("{remote_ciphertext}{TAG_SEPARATOR}{tag}"),
            None => remote_ciphertext.to_owned(),
        }
    }

    /// Whether this envelope carries an integrity tag.
    pub fn is_tagged(&self) -> bool {
        self.tag.is_some()
    }
}

impl fmt::Display for Envelope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.remote_ciphertext)?;
        if let Some(tag) = self.tag {
            write!(f, "{TAG_SEPARATOR}{tag}")?;
        }
        Ok(())
    }
}

fn is_tag(s: &str) -> bool {
    s.len() == TAG_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}
