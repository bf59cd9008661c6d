use std::borrow::Cow;

/// Ellipsis appended when text is cut short
const ELLIPSIS: &str = "...";

/// Truncates a string to at most `max_chars` characters, appending "..." when
/// anything was cut.
///
/// Counts Unicode scalar values rather than bytes, so multi-byte text is never
/// split mid-codepoint. The ellipsis is not counted against the limit.
///
/// # Examples
///
/// ```
/// use feedhook::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello World", 5), "Hello...");
/// assert_eq!(truncate_chars("日本語テキスト", 3), "日本語...");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS)),
        None => Cow::Borrowed(s),
    }
}

/// Returns the first `max_chars` characters of `s` without any ellipsis.
///
/// Used for fields with a hard provider limit (forum thread names).
pub fn take_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => &s[..cut],
        None => s,
    }
}

/// Converts an HTML fragment from a feed into plain text.
///
/// Tags are dropped, block-level breaks (`<br>`, `</p>`, `</div>`, `</li>`)
/// become newlines, entities are decoded after tag removal so escaped markup
/// survives as literal text, and runs of blank lines are collapsed.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];
        match after.find('>') {
            Some(close) => {
                let tag = after[1..close].trim().to_ascii_lowercase();
                if is_line_break(&tag) {
                    out.push('\n');
                }
                rest = &after[close + 1..];
            }
            None => {
                // Unterminated tag, keep the remainder verbatim
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    let decoded = html_escape::decode_html_entities(&out);
    collapse_blank_lines(&decoded)
}

fn is_line_break(tag: &str) -> bool {
    let name = tag
        .trim_end_matches('/')
        .split_whitespace()
        .next()
        .unwrap_or("");
    matches!(name, "br" | "/p" | "/div" | "/li" | "/h1" | "/h2" | "/h3")
}

fn collapse_blank_lines(s: &str) -> String {
    let mut lines = Vec::new();
    let mut blank_run = 0;
    for line in s.lines().map(str::trim) {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 || lines.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Strips ASCII control characters that webhook providers reject or render as
/// garbage. Tab, newline and carriage return are kept.
///
/// Returns `Cow::Borrowed` when nothing needs stripping (the common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |c: char| c == '\x7f' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'));

    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_control(c)).collect())
}
