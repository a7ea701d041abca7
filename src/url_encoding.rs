use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Encode set for query components and `application/x-www-form-urlencoded`
/// bodies: everything except the RFC 3986 unreserved characters is escaped.
const FORM_URLENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encodes a single query or form component.
///
/// # Example
/// ```
/// use starberry_auth::url_encoding::encode_component;
/// assert_eq!(encode_component("read write"), "read%20write");
/// ```
pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, FORM_URLENCODE_SET).to_string()
}

/// Decodes a query or form component. `+` is read as a space, as browsers
/// submit it that way.
pub fn decode_component(input: &str) -> String {
    let spaced = input.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Serializes key/value pairs into `k=v&k=v` form, keeping their order.
pub fn encode_pairs<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k.as_ref()), encode_component(v.as_ref())))
        .collect::<Vec<_>>()
        .join("&")
}

/// Parses a raw query string (without the leading `?`) into decoded pairs.
/// Empty segments are skipped and a key without `=` gets an empty value.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((k, v)) => (decode_component(k), decode_component(v)),
            None => (decode_component(segment), String::new()),
        })
        .collect()
}

/// Appends encoded pairs to a base URL, respecting an existing query string.
pub fn append_query<K, V>(base: &str, pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if pairs.is_empty() {
        return base.to_string();
    }
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, encode_pairs(pairs))
}

/// Removes the surrounding quotes of an RFC 7230 quoted-string and resolves
/// backslash escapes. Unquoted input is returned trimmed and unchanged.
pub fn unquote(s: &str) -> String {
    let s = s.trim();
    let Some(inner) = s.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) else {
        return s.to_string();
    };
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                result.push(next);
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Escapes a string for use inside a quoted-string (quotes not included).
pub fn escape_quoted(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        if c == '"' || c == '\\' {
            result.push('\\');
        }
        result.push(c);
    }
    result
}
