//! Markdown → Telegram HTML conversion.
//!
//! Telegram's HTML parse mode accepts a small tag set (`<b> <i> <code> <pre>
//! <a> <s>`) and rejects messages containing anything that looks like an
//! unknown tag, so every other character must be entity-escaped.

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Convert markdown-ish text to Telegram HTML: fenced code blocks, inline
/// code, bold, italic, strikethrough, and http(s) links. Everything else is
/// escaped verbatim.
pub fn markdown_to_telegram_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_code_block = false;
    let mut code_buf = String::new();

    for line in text.split('\n') {
        if line.trim_start().starts_with("```") {
            if in_code_block {
                in_code_block = false;
                out.push_str("<pre><code>");
                out.push_str(&escape_html(code_buf.trim_end_matches('\n')));
                out.push_str("</code></pre>\n");
                code_buf.clear();
            } else {
                in_code_block = true;
            }
            continue;
        }
        if in_code_block {
            code_buf.push_str(line);
            code_buf.push('\n');
            continue;
        }
        out.push_str(&convert_inline(line));
        out.push('\n');
    }

    // Unterminated fence: flush what we buffered rather than dropping it.
    if in_code_block && !code_buf.is_empty() {
        out.push_str("<pre><code>");
        out.push_str(&escape_html(code_buf.trim_end()));
        out.push_str("</code></pre>\n");
    }

    out.trim_end_matches('\n').to_string()
}

fn convert_inline(line: &str) -> String {
    let bytes = line.as_bytes();
    let len = line.len();
    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        // Bold: **text** or __text__
        if i + 1 < len
            && ((bytes[i] == b'*' && bytes[i + 1] == b'*')
                || (bytes[i] == b'_' && bytes[i + 1] == b'_'))
        {
            if let Some(end) = line[i + 2..].find(&line[i..i + 2]) {
                let inner = escape_html(&line[i + 2..i + 2 + end]);
                out.push_str(&format!("<b>{inner}</b>"));
                i += 4 + end;
                continue;
            }
        }
        // Strikethrough: ~~text~~
        if i + 1 < len && bytes[i] == b'~' && bytes[i + 1] == b'~' {
            if let Some(end) = line[i + 2..].find("~~") {
                let inner = escape_html(&line[i + 2..i + 2 + end]);
                out.push_str(&format!("<s>{inner}</s>"));
                i += 4 + end;
                continue;
            }
        }
        // Italic: *text*
        if bytes[i] == b'*' {
            if let Some(end) = line[i + 1..].find('*') {
                if end > 0 {
                    let inner = escape_html(&line[i + 1..i + 1 + end]);
                    out.push_str(&format!("<i>{inner}</i>"));
                    i += 2 + end;
                    continue;
                }
            }
        }
        // Inline code: `code`
        if bytes[i] == b'`' {
            if let Some(end) = line[i + 1..].find('`') {
                let inner = escape_html(&line[i + 1..i + 1 + end]);
                out.push_str(&format!("<code>{inner}</code>"));
                i += 2 + end;
                continue;
            }
        }
        // Link: [text](http…)
        if bytes[i] == b'[' {
            if let Some(bracket_end) = line[i + 1..].find(']') {
                let text_part = &line[i + 1..i + 1 + bracket_end];
                let after = i + 1 + bracket_end + 1;
                if after < len && bytes[after] == b'(' {
                    if let Some(paren_end) = line[after + 1..].find(')') {
                        let url = &line[after + 1..after + 1 + paren_end];
                        if url.starts_with("http://")
                            || url.starts_with("https://")
                            || url.starts_with("tg://")
                        {
                            out.push_str(&format!(
                                "<a href=\"{}\">{}</a>",
                                escape_html(url),
                                escape_html(text_part)
                            ));
                            i = after + 1 + paren_end + 1;
                            continue;
                        }
                    }
                }
            }
        }
        let ch = line[i..].chars().next().unwrap_or('\u{fffd}');
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(ch),
        }
        i += ch.len_utf8();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_entities() {
        assert_eq!(
            markdown_to_telegram_html("a < b & c > d"),
            "a &lt; b &amp; c &gt; d"
        );
    }

    #[test]
    fn converts_bold_italic_code() {
        assert_eq!(markdown_to_telegram_html("**bold**"), "<b>bold</b>");
        assert_eq!(markdown_to_telegram_html("__bold__"), "<b>bold</b>");
        assert_eq!(markdown_to_telegram_html("*it*"), "<i>it</i>");
        assert_eq!(markdown_to_telegram_html("`x<y`"), "<code>x&lt;y</code>");
        assert_eq!(markdown_to_telegram_html("~~gone~~"), "<s>gone</s>");
    }

    #[test]
    fn converts_links_and_keeps_non_http_literal() {
        assert_eq!(
            markdown_to_telegram_html("[site](https://example.com)"),
            "<a href=\"https://example.com\">site</a>"
        );
        assert_eq!(
            markdown_to_telegram_html("[u](tg://user?id=5)"),
            "<a href=\"tg://user?id=5\">u</a>"
        );
        assert_eq!(
            markdown_to_telegram_html("[not](ftp://x)"),
            "[not](ftp://x)"
        );
    }

    #[test]
    fn converts_fenced_code_blocks() {
        let input = "before\n```\nlet x = 1 < 2;\n```\nafter";
        assert_eq!(
            markdown_to_telegram_html(input),
            "before\n<pre><code>let x = 1 &lt; 2;</code></pre>\nafter"
        );
    }

    #[test]
    fn flushes_unterminated_fence() {
        let input = "```\ndangling";
        assert_eq!(
            markdown_to_telegram_html(input),
            "<pre><code>dangling</code></pre>"
        );
    }
}
