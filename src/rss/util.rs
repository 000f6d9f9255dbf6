//! Utility functions for RSS feed processing.

use std::io::Read;
use tracing::debug;

use crate::TARGET_WEB_REQUEST;

/// Helper function to validate a URL
pub fn is_valid_url(url: &str) -> bool {
    if let Ok(parsed) = url::Url::parse(url) {
        parsed.scheme() == "http" || parsed.scheme() == "https"
    } else {
        false
    }
}

/// Clean up malformed XML
pub fn cleanup_xml(xml: &str) -> String {
    let mut cleaned = xml.trim().trim_start_matches('\u{FEFF}').to_string();

    // Drop anything before the document start
    if let Some(xml_start) = cleaned.find("<?xml") {
        cleaned = cleaned[xml_start..].to_string();
    } else if let Some(rss_start) = cleaned.find("<rss") {
        cleaned = cleaned[rss_start..].to_string();
    } else if let Some(feed_start) = cleaned.find("<feed") {
        cleaned = cleaned[feed_start..].to_string();
    }

    // HTML entities that are not defined in XML
    cleaned = cleaned
        .replace("&nbsp;", "&#160;")
        .replace("&ndash;", "&#8211;")
        .replace("&mdash;", "&#8212;")
        .replace("&rsquo;", "&#8217;")
        .replace("&lsquo;", "&#8216;")
        .replace("&rdquo;", "&#8221;")
        .replace("&ldquo;", "&#8220;")
        .replace("&amp;amp;", "&amp;")
        .replace("&apos;", "&#39;");

    cleaned = cleaned
        .chars()
        .filter(|&c| {
            matches!(c,
                '\u{0009}' | // tab
                '\u{000A}' | // newline
                '\u{000D}' | // carriage return
                '\u{0020}'..='\u{D7FF}' |
                '\u{E000}'..='\u{FFFD}' |
                '\u{10000}'..='\u{10FFFF}'
            )
        })
        .collect();

    if !cleaned.starts_with("<?xml") {
        cleaned = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", cleaned);
    }

    cleaned
}

/// Returns true when the bytes already look like an XML document.
fn looks_like_xml(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    let head = String::from_utf8_lossy(head);
    let head = head.trim_start_matches('\u{FEFF}').trim_start();
    head.starts_with('<')
}

/// Try various decompression methods for a byte array.
///
/// Servers occasionally send compressed bodies without a matching
/// `Content-Encoding`, which reqwest then passes through untouched.
pub fn try_decompressions(bytes: &[u8], content_encoding: Option<&str>, rss_url: &str) -> Vec<u8> {
    if looks_like_xml(bytes) {
        return bytes.to_vec();
    }

    if content_encoding == Some("br") {
        let mut decoded = Vec::new();
        let mut reader = brotli::Decompressor::new(bytes, 4096);
        if reader.read_to_end(&mut decoded).is_ok() && !decoded.is_empty() {
            debug!(target: TARGET_WEB_REQUEST, "Successfully decompressed brotli content from {}", rss_url);
            return decoded;
        }
    }

    let mut decoded = Vec::new();
    if flate2::read::GzDecoder::new(bytes)
        .read_to_end(&mut decoded)
        .is_ok()
        && !decoded.is_empty()
    {
        debug!(target: TARGET_WEB_REQUEST, "Successfully decompressed with gzip from {}", rss_url);
        return decoded;
    }

    let mut decoded = Vec::new();
    if flate2::read::ZlibDecoder::new(bytes)
        .read_to_end(&mut decoded)
        .is_ok()
        && !decoded.is_empty()
    {
        debug!(target: TARGET_WEB_REQUEST, "Successfully decompressed with zlib from {}", rss_url);
        return decoded;
    }

    let mut decoded = Vec::new();
    if flate2::read::DeflateDecoder::new(bytes)
        .read_to_end(&mut decoded)
        .is_ok()
        && !decoded.is_empty()
    {
        debug!(target: TARGET_WEB_REQUEST, "Successfully decompressed with deflate from {}", rss_url);
        return decoded;
    }

    debug!(target: TARGET_WEB_REQUEST, "No decompression method worked for {}, using original bytes", rss_url);
    bytes.to_vec()
}

/// Decode a response body to text.
///
/// UTF-8 is tried first, then the charset from the `Content-Type` header,
/// then windows-1252. Returns the text and the encoding label that was used
/// when it was not UTF-8.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> Option<(String, Option<String>)> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some((text.to_string(), None));
    }

    let charset = content_type.and_then(|ct| {
        ct.split(';')
            .map(str::trim)
            .find(|part| part.to_lowercase().starts_with("charset="))
            .and_then(|part| part.split('=').nth(1))
            .map(|c| c.trim().trim_matches('"').to_string())
    });

    if let Some(charset) = charset {
        let encoding = encoding_rs::Encoding::for_label(charset.as_bytes())?;
        let (decoded, _, _) = encoding.decode(bytes);
        return Some((decoded.into_owned(), Some(encoding.name().to_string())));
    }

    let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    if had_errors {
        None
    } else {
        Some((decoded.into_owned(), Some("windows-1252".to_string())))
    }
}
