/// Parses a raw back-channel stream (`{len}\n{json}` repeated) into the
/// sequence of JSON batches it carried.
pub fn parse_raw_frames(buf: &str) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    let mut rest = buf;
    while let Some(newline) = rest.find('\n') {
        let (len_part, after_newline) = rest.split_at(newline);
        let after_newline = &after_newline[1..];
        let Ok(len) = len_part.parse::<usize>() else {
            break;
        };
        if after_newline.len() < len {
            break;
        }
        let (json_part, remainder) = after_newline.split_at(len);
        if let Ok(value) = serde_json::from_str(json_part) {
            out.push(value);
        }
        rest = remainder;
    }
    out
}

/// Parses an HTML-framed back-channel stream, extracting and unescaping
/// the JSON payload passed to each `parent.m("...")` call.
pub fn parse_html_frames(buf: &str) -> Vec<serde_json::Value> {
    let needle_open = "parent.m(\"";
    let mut out = Vec::new();
    let mut rest = buf;
    while let Some(start) = rest.find(needle_open) {
        let after = &rest[start + needle_open.len()..];
        let Some((escaped, remainder)) = find_closing_quote(after) else {
            break;
        };
        let unescaped = unescape_html_script(escaped);
        if let Ok(value) = serde_json::from_str(&unescaped) {
            out.push(value);
        }
        rest = remainder;
    }
    out
}

fn find_closing_quote(s: &str) -> Option<(&str, &str)> {
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            chars.next();
            continue;
        }
        if c == '"' {
            return Some((&s[..i], &s[i + 1..]));
        }
    }
    None
}

fn unescape_html_script(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    out.push(byte as char);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// True once a close script (`parent.d()`) has been seen in the buffer.
pub fn html_stream_closed(buf: &str) -> bool {
    buf.contains("parent.d()")
}
