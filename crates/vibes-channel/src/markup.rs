//! The channel's markup subset: bold, italic, inline code and `pre` blocks.
//!
//! Lengths are counted in chars. "Plain" length is what the reader sees;
//! "rendered" length is what the channel counts against its limit, tags and
//! entities included.

use vibes_common::text::char_len;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Rendered length of a single char after escaping.
pub fn escaped_len(c: char) -> usize {
    match c {
        '&' | '\'' => 5,
        '<' | '>' => 4,
        '"' => 6,
        _ => 1,
    }
}

/// Longest suffix of `text` whose escaped length is at most `max`.
pub fn escaped_suffix(text: &str, max: usize) -> &str {
    let mut used = 0;
    let mut start = text.len();
    for (idx, c) in text.char_indices().rev() {
        let len = escaped_len(c);
        if used + len > max {
            break;
        }
        used += len;
        start = idx;
    }
    &text[start..]
}

/// Longest prefix of `text` whose escaped length is at most `max`.
pub fn escaped_prefix(text: &str, max: usize) -> &str {
    let mut used = 0;
    for (idx, c) in text.char_indices() {
        let len = escaped_len(c);
        if used + len > max {
            return &text[..idx];
        }
        used += len;
    }
    text
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Plain,
    Bold,
    Italic,
    Code,
    Pre,
}

impl Style {
    pub fn tags(self) -> (&'static str, &'static str) {
        match self {
            Style::Plain => ("", ""),
            Style::Bold => ("<b>", "</b>"),
            Style::Italic => ("<i>", "</i>"),
            Style::Code => ("<code>", "</code>"),
            Style::Pre => ("<pre><code>", "</code></pre>"),
        }
    }

    pub fn overhead(self) -> usize {
        let (open, close) = self.tags();
        open.len() + close.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub style: Style,
    pub text: String,
}

/// Styled text built span by span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichText {
    spans: Vec<Span>,
}

impl RichText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, style: Style, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.spans.push(Span { style, text });
        }
        self
    }

    pub fn plain(self, text: impl Into<String>) -> Self {
        self.push(Style::Plain, text)
    }

    pub fn bold(self, text: impl Into<String>) -> Self {
        self.push(Style::Bold, text)
    }

    pub fn italic(self, text: impl Into<String>) -> Self {
        self.push(Style::Italic, text)
    }

    pub fn code(self, text: impl Into<String>) -> Self {
        self.push(Style::Code, text)
    }

    pub fn pre(self, text: impl Into<String>) -> Self {
        self.push(Style::Pre, text)
    }

    pub fn newline(self) -> Self {
        self.plain("\n")
    }

    pub fn append(mut self, other: RichText) -> Self {
        self.spans.extend(other.spans);
        self
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn plain_len(&self) -> usize {
        self.spans.iter().map(|s| char_len(&s.text)).sum()
    }

    pub fn to_plain(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for span in &self.spans {
            let (open, close) = span.style.tags();
            out.push_str(open);
            out.push_str(&escape_html(&span.text));
            out.push_str(close);
        }
        out
    }

    pub fn rendered_len(&self) -> usize {
        self.spans
            .iter()
            .map(|s| s.style.overhead() + s.text.chars().map(escaped_len).sum::<usize>())
            .sum()
    }

    /// Renders the longest prefix whose markup is at most `max` chars.
    ///
    /// Tags are never split, so the result is always well-formed.
    pub fn render_within(&self, max: usize) -> String {
        if self.rendered_len() <= max {
            return self.render();
        }
        let mut out = String::new();
        let mut used = 0;
        for span in &self.spans {
            let overhead = span.style.overhead();
            if used + overhead >= max {
                break;
            }
            let room = max - used - overhead;
            let text = escaped_prefix(&span.text, room);
            if text.is_empty() {
                break;
            }
            let (open, close) = span.style.tags();
            let escaped = escape_html(text);
            used += overhead + char_len(&escaped);
            out.push_str(open);
            out.push_str(&escaped);
            out.push_str(close);
            if text.len() < span.text.len() {
                break;
            }
        }
        out
    }
}
