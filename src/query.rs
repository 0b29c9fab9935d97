/// Look up a query parameter in a dashboard URL.
///
/// Matches `[?&]name` followed by `=value`, `&`, `#` or the end of the URL.
/// A parameter without a value yields an empty string. `+` is turned into a
/// space before percent-decoding.
pub fn parameter(url: &str, name: &str) -> Option<String> {
    let mut rest = url;
    while let Some(pos) = rest.find(|c: char| c == '?' || c == '&') {
        let candidate = &rest[pos + 1..];
        if let Some(after) = candidate.strip_prefix(name) {
            match after.chars().next() {
                None | Some('&') | Some('#') => return Some(String::new()),
                Some('=') => return Some(decode(value_of(&after[1..]))),
                Some(_) => {}
            }
        }
        rest = candidate;
    }
    None
}

fn value_of(raw: &str) -> &str {
    let end = raw.find(|c: char| c == '&' || c == '#').unwrap_or(raw.len());
    &raw[..end]
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        // Escapes that do not decode to UTF-8 are kept verbatim.
        Err(_) => spaced,
    }
}
