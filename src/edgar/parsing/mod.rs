pub mod ownership;

use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

pub use ownership::{Extractor, OwnershipFiling, ReportingOwner, RoleMatcher};

static XML_DECLARED_ENCODING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*encoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#)
        .expect("xml declaration pattern")
});

/// Decodes markup bytes to text: a byte-order mark wins, then the encoding
/// named in the XML declaration, then UTF-8. Undecodable bytes become U+FFFD.
pub fn decode_markup(bytes: &[u8]) -> Cow<'_, str> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text;
    }

    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let encoding = XML_DECLARED_ENCODING
        .captures(&head)
        .and_then(|c| Encoding::for_label(c[1].as_bytes()))
        .unwrap_or(UTF_8);

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        log::debug!("Replaced undecodable bytes while decoding as {}", encoding.name());
    }
    text
}
