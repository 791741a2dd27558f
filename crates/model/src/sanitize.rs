/// Make remote text safe for display.
///
/// HTML-significant characters are escaped, control characters other than
/// newlines and tabs are dropped, and surrounding whitespace is trimmed.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.trim().chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {},
            c => out.push(c),
        }
    }
    out
}
