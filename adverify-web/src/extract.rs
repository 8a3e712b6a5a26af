use scraper::{Html, Node};

/// Elements whose text never reaches the reader. `noscript` is included
/// because the HTML5 parser keeps its content as raw markup text.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript"];

/// Visible text of an HTML document, one fragment per line.
///
/// Malformed markup is parsed leniently; a document without text yields an
/// empty string.
///
/// ```
/// use adverify_web::extract::visible_text;
///
/// let html = "<html><head><style>p{}</style></head>\
///             <body><h1>Fresh Roast</h1>\n<p>Organic  Fair-trade</p></body></html>";
/// assert_eq!(visible_text(html), "Fresh Roast\nOrganic\nFair-trade");
/// ```
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::with_capacity(html.len() / 4);

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
        });
        if !hidden {
            raw.push_str(text);
        }
    }

    normalize_lines(&raw)
}

/// Trim every line, split lines on double spaces, drop empty fragments, and
/// re-join with `\n`.
pub fn normalize_lines(text: &str) -> String {
    text.split(is_line_break)
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Same break set as Python's `str.splitlines`, so pages with form feeds or
/// Unicode separators split the same way.
fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}
