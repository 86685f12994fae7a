//! HTML→Markdown conversion: a pure function, `html -> markdown`. No
//! structural HTML parsing lives in this crate beyond what `htmd` already
//! does; the regex-based paths in `http_fetcher`/`hybrid` are deliberately
//! cheap and separate.

/// Convert an HTML document to Markdown.
///
/// Falls back to returning the raw input if conversion fails outright (the
/// converter only errors on malformed inputs it cannot tokenize at all);
/// callers classify non-convertible content types before reaching here.
#[must_use]
pub fn html_to_markdown(html: &str) -> String {
    htmd::convert(html).unwrap_or_else(|_| html.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_headings_and_paragraphs() {
        let markdown = html_to_markdown("<h1>Hi</h1><p>Bye</p>");
        assert!(markdown.contains("# Hi"));
        assert!(markdown.contains("Bye"));
        assert!(!markdown.contains("<h1>"));
        assert!(!markdown.contains("<p>"));
    }
}
