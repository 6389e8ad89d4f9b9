use vibes_common::text::char_len;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Text,
    Code,
}

/// One immutable chunk of rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub content: String,
}

impl Segment {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Text,
            content: content.into(),
        }
    }

    pub fn code(content: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Code,
            content: content.into(),
        }
    }

    /// Length in chars before any markup escaping.
    pub fn plain_len(&self) -> usize {
        char_len(&self.content)
    }
}
