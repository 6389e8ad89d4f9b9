//! Fitting a live view into one channel message.
//!
//! A view is header + the tail of the log + footer. The log gets whatever
//! the header and footer leave over; the oldest output is dropped first.

use vibes_channel::escape_html;
use vibes_channel::escaped_len;
use vibes_channel::escaped_suffix;
use vibes_channel::RichText;
use vibes_channel::Style;
use vibes_common::text::char_len;
use vibes_common::text::tail_chars;
use vibes_core::Segment;
use vibes_core::SegmentKind;

/// Chars kept free for markup and escaping.
pub const SAFETY_MARGIN: usize = 250;
pub const MIN_LOG_BUDGET: usize = 300;
pub const HIDDEN_MARKER: &str = "…previous output hidden…\n\n";

const SMALL_BUDGET: usize = 500;
const HEADER_FOOTER_SLACK: usize = 50;
const SHRINK_ATTEMPTS: usize = 8;
const SHRINK_FLOOR: usize = 80;
const PART_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    pub header: &'a RichText,
    pub footer: &'a RichText,
    pub segments: &'a [Segment],
    /// Render the whole log as one preformatted block.
    pub wrap_log_in_pre: bool,
}

/// Renders `view` as markup of at most `limit` chars.
pub fn render(view: &View<'_>, limit: usize) -> String {
    let mut budget = limit.saturating_sub(SAFETY_MARGIN);
    if budget < SMALL_BUDGET {
        budget = limit;
    }

    let (header_cap, footer_cap) = header_footer_caps(view.header, view.footer, budget / 2);
    let header = trim_newlines(&view.header.render_within(header_cap)).to_string();
    let footer = trim_newlines(&view.footer.render_within(footer_cap)).to_string();

    let mut log_budget = budget
        .saturating_sub(char_len(&header) + char_len(&footer) + HEADER_FOOTER_SLACK)
        .max(MIN_LOG_BUDGET);

    for _ in 0..SHRINK_ATTEMPTS {
        let tail = tail_segments(view.segments, log_budget);
        let log = render_log(&tail, view.wrap_log_in_pre);
        let text = join_parts(&header, &log, &footer);
        if char_len(&text) <= limit {
            return text;
        }
        log_budget = (log_budget * 3 / 4).max(SHRINK_FLOOR);
    }

    exact_fit(view, &header, &footer, limit)
}

fn header_footer_caps(header: &RichText, footer: &RichText, half: usize) -> (usize, usize) {
    let header_len = header.rendered_len();
    let footer_len = footer.rendered_len();
    let total = header_len + footer_len;
    if total <= half {
        return (header_len, footer_len);
    }
    let header_cap = half * header_len / total;
    (header_cap, half - header_cap)
}

/// Longest suffix of `segments` within `max_plain` chars.
///
/// A lone oversized segment keeps its tail. The hidden-output marker is
/// prepended whenever anything was cut.
pub fn tail_segments(segments: &[Segment], max_plain: usize) -> Vec<Segment> {
    let mut total = 0;
    let mut kept: Vec<Segment> = Vec::new();
    let mut cut = false;
    for segment in segments.iter().rev() {
        let len = segment.plain_len();
        if total + len <= max_plain {
            kept.push(segment.clone());
            total += len;
            continue;
        }
        cut = true;
        if kept.is_empty() {
            kept.push(Segment {
                kind: segment.kind,
                content: tail_chars(&segment.content, max_plain).to_string(),
            });
        }
        break;
    }
    kept.reverse();
    if cut {
        kept.insert(0, Segment::text(HIDDEN_MARKER));
    }
    kept
}

fn style_of(kind: SegmentKind) -> Style {
    match kind {
        SegmentKind::Text => Style::Plain,
        SegmentKind::Code => Style::Pre,
    }
}

fn render_log(segments: &[Segment], wrap_log_in_pre: bool) -> String {
    if wrap_log_in_pre {
        let plain: String = segments.iter().map(|s| s.content.as_str()).collect();
        let (open, close) = Style::Pre.tags();
        return format!("{}{}{}", open, escape_html(trim_newlines(&plain)), close);
    }
    let mut text = RichText::new();
    for segment in segments {
        text = text.push(style_of(segment.kind), segment.content.clone());
    }
    trim_newlines(&text.render()).to_string()
}

fn join_parts(header: &str, log: &str, footer: &str) -> String {
    [header, log, footer]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(PART_SEPARATOR)
}

fn trim_newlines(text: &str) -> &str {
    text.trim_matches('\n')
}

/// Escape-aware fit used when the heuristic budget keeps overflowing.
fn exact_fit(view: &View<'_>, header: &str, footer: &str, limit: usize) -> String {
    let separators = [header, footer].iter().filter(|p| !p.is_empty()).count() * char_len(PART_SEPARATOR);
    let fixed = char_len(header) + char_len(footer) + separators;
    let mut available = limit.saturating_sub(fixed);

    let log = if view.wrap_log_in_pre {
        available = available.saturating_sub(Style::Pre.overhead());
        let plain: String = view.segments.iter().map(|s| s.content.as_str()).collect();
        let plain = trim_newlines(&plain);
        let body = if plain.chars().map(escaped_len).sum::<usize>() <= available {
            escape_html(plain)
        } else {
            let marker = char_len(HIDDEN_MARKER);
            let tail = escaped_suffix(plain, available.saturating_sub(marker));
            let prefix = if available >= marker { HIDDEN_MARKER } else { "" };
            format!("{}{}", prefix, escape_html(tail))
        };
        let (open, close) = Style::Pre.tags();
        format!("{}{}{}", open, body, close)
    } else {
        exact_tail_markup(view.segments, available)
    };

    let text = join_parts(header, &log, footer);
    if char_len(&text) <= limit {
        return text;
    }
    // Only reachable for limits too small to hold the header and footer.
    view.header.render_within(limit)
}

fn exact_tail_markup(segments: &[Segment], available: usize) -> String {
    let marker = char_len(HIDDEN_MARKER);
    let room = available.saturating_sub(marker);
    let mut used = 0;
    let mut parts: Vec<String> = Vec::new();
    let mut cut = false;
    for segment in segments.iter().rev() {
        let style = style_of(segment.kind);
        let cost = style.overhead() + segment.content.chars().map(escaped_len).sum::<usize>();
        if used + cost <= room {
            parts.push(RichText::new().push(style, segment.content.clone()).render());
            used += cost;
            continue;
        }
        cut = true;
        let space = room - used;
        if space > style.overhead() {
            let tail = escaped_suffix(&segment.content, space - style.overhead());
            parts.push(RichText::new().push(style, tail).render());
        }
        break;
    }
    parts.reverse();
    let body: String = parts.concat();
    if cut && available >= marker {
        format!("{}{}", HIDDEN_MARKER, body)
    } else {
        body
    }
}
