//! Forward-channel body decoding and back-channel batch framing
//! (spec.md §4.1).

use std::collections::HashMap;

use crate::HTML_PADDING_BYTES;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("missing or non-numeric `ofs` parameter")]
    MissingOrInvalidOffset,
    #[error("missing or non-numeric `count` parameter")]
    MissingOrInvalidCount,
    #[error("req{0}_ index is out of range for count")]
    IndexOutOfRange(usize),
    #[error("duplicate key {key:?} at map index {index}")]
    DuplicateKey { index: usize, key: String },
}

pub type ForwardMap = HashMap<String, String>;

/// Decodes a forward-channel POST body into `(offset, maps)`.
///
/// The body is `application/x-www-form-urlencoded` with two well-known
/// keys (`ofs`, `count`) and a dynamic family `req{N}_{key}=value` per map
/// entry, flattened across all `count` maps. Keys that don't match any
/// recognized shape are ignored rather than rejected, matching the
/// lenient-on-unknown-parameters rule applied to query parameters
/// (SPEC_FULL.md §B).
pub fn decode_forward_body(body: &str) -> Result<(u64, Vec<ForwardMap>), CodecError> {
    let mut ofs: Option<u64> = None;
    let mut count: Option<usize> = None;
    let mut entries: Vec<(usize, String, String)> = Vec::new();

    for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
        match key.as_ref() {
            "ofs" => ofs = value.parse::<u64>().ok(),
            "count" => count = value.parse::<usize>().ok(),
            other => {
                if let Some((index, map_key)) = parse_req_key(other) {
                    entries.push((index, map_key.to_owned(), value.into_owned()));
                }
            }
        }
    }

    let count = count.ok_or(CodecError::MissingOrInvalidCount)?;
    let ofs = ofs.ok_or(CodecError::MissingOrInvalidOffset)?;

    let mut maps: Vec<ForwardMap> = vec![ForwardMap::new(); count];
    for (index, key, value) in entries {
        if index >= count {
            return Err(CodecError::IndexOutOfRange(index));
        }
        if maps[index].contains_key(&key) {
            return Err(CodecError::DuplicateKey { index, key });
        }
        maps[index].insert(key, value);
    }

    Ok((ofs, maps))
}

/// Parses a `req{N}_{key}` form key into `(N, key)`. Returns `None` for
/// anything that doesn't match the shape (treated as an unrelated,
/// ignorable key).
fn parse_req_key(key: &str) -> Option<(usize, &str)> {
    let rest = key.strip_prefix("req")?;
    let digit_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    if digit_len == 0 {
        return None;
    }
    let (digits, tail) = rest.split_at(digit_len);
    let map_key = tail.strip_prefix('_')?;
    let index: usize = digits.parse().ok()?;
    Some((index, map_key))
}

/// Framing parameters for a single back channel (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct Framing {
    pub is_html: bool,
    /// Cross-domain host to set via `document.domain` in HTML mode, if any.
    pub domain: Option<String>,
}

impl Framing {
    /// Bytes written once, before any batch, for the lifetime of this back
    /// channel. Empty in raw mode.
    pub fn preamble(&self) -> Vec<u8> {
        if !self.is_html {
            return Vec::new();
        }
        let mut out = Vec::new();
        out.extend_from_slice(b"<html><body>");
        out.extend(std::iter::repeat(b' ').take(HTML_PADDING_BYTES));
        if let Some(domain) = &self.domain {
            out.extend_from_slice(
                format!(
                    "<script>try{{document.domain=\"{}\";}}catch(e){{}}</script>\n",
                    escape_html_script(domain)
                )
                .as_bytes(),
            );
        }
        out
    }

    /// Encodes one batch of `[arrayId, payload]` tuples drawn in order from
    /// the outgoing queue.
    pub fn batch(&self, items: &[(u64, serde_json::Value)]) -> Vec<u8> {
        let tuples: Vec<serde_json::Value> = items
            .iter()
            .map(|(id, payload)| serde_json::json!([id, payload]))
            .collect();
        let json = serde_json::Value::Array(tuples).to_string();

        if self.is_html {
            format!(
                "<script>try{{parent.m(\"{}\")}}catch(e){{}}</script>\n",
                escape_html_script(&json)
            )
            .into_bytes()
        } else {
            format!("{}\n{}", json.len(), json).into_bytes()
        }
    }

    /// Bytes written once the stream is ending. Empty in raw mode — a raw
    /// back channel simply ends the HTTP response.
    pub fn close(&self) -> Vec<u8> {
        if self.is_html {
            b"<script>try{parent.d()}catch(e){}</script>\n".to_vec()
        } else {
            Vec::new()
        }
    }
}

/// Escapes a string for safe embedding as a double-quoted JS string literal
/// inside an inline `<script>` block: backslash/quote escaping plus
/// breaking up `</` so the payload can never prematurely close the
/// surrounding script tag.
fn escape_html_script(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '<' => out.push_str("\\x3c"),
            _ => out.push(c),
        }
    }
    out
}
