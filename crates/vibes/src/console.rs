//! A [`MessageChannel`] backed by the terminal.
//!
//! Messages are blocks of text. In interactive mode an edit of the most
//! recently drawn block redraws it in place; editing an older block draws it
//! again below. Otherwise nothing is drawn and the caller prints the final
//! text of the messages it cares about.

use std::collections::BTreeMap;
use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use crossterm::cursor::MoveToColumn;
use crossterm::cursor::MoveUp;
use crossterm::queue;
use crossterm::style::Attribute;
use crossterm::style::Color;
use crossterm::style::ContentStyle;
use crossterm::style::Print;
use crossterm::terminal;
use crossterm::terminal::Clear;
use crossterm::terminal::ClearType;
use vibes_channel::ChannelError;
use vibes_channel::ChatId;
use vibes_channel::MessageChannel;
use vibes_channel::MessageId;
use vibes_channel::ReplyActions;
use vibes_channel::Surface;
use vibes_common::color_is_disabled;
use vibes_common::mutex_lock_or_recover;

const FIRST_MESSAGE_ID: i64 = 1;

#[derive(Default)]
struct ConsoleState {
    next_id: i64,
    messages: BTreeMap<MessageId, String>,
    /// The block at the bottom of the screen and how many rows it occupies.
    live: Option<(MessageId, u16)>,
}

#[derive(Clone)]
pub struct ConsoleChannel {
    state: Arc<Mutex<ConsoleState>>,
    interactive: bool,
}

impl ConsoleChannel {
    pub fn new(interactive: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConsoleState {
                next_id: FIRST_MESSAGE_ID,
                ..ConsoleState::default()
            })),
            interactive,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Current text of a message, without markup.
    pub fn plain_text(&self, surface: Surface) -> Option<String> {
        mutex_lock_or_recover(&self.state)
            .messages
            .get(&surface.message_id)
            .map(|text| markup_to_plain(text))
    }

    fn draw(&self, state: &mut ConsoleState, id: MessageId, text: &str) -> io::Result<()> {
        if !self.interactive {
            return Ok(());
        }
        let styled = markup_to_styled(text, !color_is_disabled());
        let rows = rows_needed(&markup_to_plain(text));

        let mut out = io::stdout().lock();
        match state.live {
            Some((live_id, live_rows)) if live_id == id && live_rows > 0 => {
                queue!(
                    out,
                    MoveUp(live_rows),
                    MoveToColumn(0),
                    Clear(ClearType::FromCursorDown)
                )?;
            }
            Some(_) => queue!(out, Print("\n"))?,
            None => {}
        }
        queue!(out, Print(styled), Print("\n"))?;
        out.flush()?;
        state.live = Some((id, rows));
        Ok(())
    }
}

#[async_trait]
impl MessageChannel for ConsoleChannel {
    async fn send_message(
        &self,
        _chat_id: ChatId,
        text: &str,
        _actions: Option<&ReplyActions>,
    ) -> Result<MessageId, ChannelError> {
        let mut state = mutex_lock_or_recover(&self.state);
        let id = MessageId(state.next_id);
        state.next_id += 1;
        state.messages.insert(id, text.to_string());
        self.draw(&mut state, id, text)
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        Ok(id)
    }

    async fn edit_message_text(
        &self,
        surface: Surface,
        text: &str,
        _actions: Option<&ReplyActions>,
    ) -> Result<(), ChannelError> {
        let mut state = mutex_lock_or_recover(&self.state);
        match state.messages.get_mut(&surface.message_id) {
            None => {
                return Err(ChannelError::MessageGone(
                    "message to edit not found".to_string(),
                ))
            }
            Some(existing) if existing.as_str() == text => return Err(ChannelError::NotModified),
            Some(existing) => *existing = text.to_string(),
        }
        self.draw(&mut state, surface.message_id, text)
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }

    async fn delete_message(&self, surface: Surface) -> Result<(), ChannelError> {
        let mut state = mutex_lock_or_recover(&self.state);
        state.messages.remove(&surface.message_id);
        if state.live.is_some_and(|(id, _)| id == surface.message_id) {
            state.live = None;
        }
        Ok(())
    }
}

fn rows_needed(plain: &str) -> u16 {
    let columns = terminal::size().map(|(cols, _)| cols.max(1) as usize).unwrap_or(80);
    let rows: usize = plain
        .split('\n')
        .map(|line| line.chars().count().div_ceil(columns).max(1))
        .sum();
    u16::try_from(rows).unwrap_or(u16::MAX)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Marks {
    bold: bool,
    italic: bool,
    code: bool,
}

/// Splits channel markup into styled runs with entities decoded.
fn parse_markup(text: &str) -> Vec<(Marks, String)> {
    let mut runs: Vec<(Marks, String)> = Vec::new();
    let mut marks = Marks::default();
    let mut rest = text;
    while !rest.is_empty() {
        if rest.starts_with('<') {
            if let Some(end) = rest.find('>') {
                let tag = &rest[1..end];
                let known = match tag {
                    "b" | "/b" => {
                        marks.bold = !tag.starts_with('/');
                        true
                    }
                    "i" | "/i" => {
                        marks.italic = !tag.starts_with('/');
                        true
                    }
                    "code" | "/code" | "pre" | "/pre" => {
                        marks.code = !tag.starts_with('/');
                        true
                    }
                    _ => false,
                };
                if known {
                    rest = &rest[end + 1..];
                    continue;
                }
            }
        }
        let first = rest.chars().next().map_or(1, char::len_utf8);
        let next_tag = rest[first..].find('<').map_or(rest.len(), |i| i + first);
        let chunk = decode_entities(&rest[..next_tag]);
        match runs.last_mut() {
            Some((last, text)) if *last == marks => text.push_str(&chunk),
            _ => runs.push((marks, chunk)),
        }
        rest = &rest[next_tag..];
    }
    runs
}

fn decode_entities(text: &str) -> String {
    const ENTITIES: [(&str, char); 4] = [("&lt;", '<'), ("&gt;", '>'), ("&quot;", '"'), ("&amp;", '&')];
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, ch)) => {
                out.push(*ch);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn markup_to_plain(text: &str) -> String {
    parse_markup(text).into_iter().map(|(_, run)| run).collect()
}

fn markup_to_styled(text: &str, colors: bool) -> String {
    if !colors {
        return markup_to_plain(text);
    }
    parse_markup(text)
        .into_iter()
        .map(|(marks, run)| {
            let mut style = ContentStyle::new();
            if marks.bold {
                style.attributes.set(Attribute::Bold);
            }
            if marks.italic {
                style.attributes.set(Attribute::Italic);
            }
            if marks.code {
                style.foreground_color = Some(Color::Cyan);
            }
            style.apply(run).to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_drops_tags_and_decodes_entities() {
        assert_eq!(
            markup_to_plain("<b>Session:</b> <code>a &lt;b&gt; &amp;lt;</code>"),
            "Session: a <b> &lt;"
        );
        assert_eq!(markup_to_plain("<pre><code>x</code></pre>"), "x");
        assert_eq!(markup_to_plain("1 < 2 & <u>u</u>"), "1 < 2 & <u>u</u>");
    }

    #[test]
    fn runs_carry_styles() {
        let runs = parse_markup("a<b>b<i>c</i></b>");
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0], (Marks::default(), "a".to_string()));
        assert!(runs[1].0.bold && !runs[1].0.italic);
        assert!(runs[2].0.bold && runs[2].0.italic);
    }

    #[test]
    fn styled_without_colors_is_plain() {
        assert_eq!(markup_to_styled("<b>x</b>", false), "x");
        assert!(markup_to_styled("<b>x</b>", true).contains('x'));
    }

    #[tokio::test]
    async fn edits_replace_text_and_reject_unknown_messages() {
        let console = ConsoleChannel::new(false);
        let id = console.send_message(ChatId(0), "<i>wait</i>", None).await.unwrap();
        let surface = Surface::new(ChatId(0), id);
        assert_eq!(console.plain_text(surface).as_deref(), Some("wait"));

        console.edit_message_text(surface, "<b>done</b>", None).await.unwrap();
        assert_eq!(console.plain_text(surface).as_deref(), Some("done"));
        assert_eq!(
            console.edit_message_text(surface, "<b>done</b>", None).await,
            Err(ChannelError::NotModified)
        );

        let missing = Surface::new(ChatId(0), MessageId(99));
        assert!(matches!(
            console.edit_message_text(missing, "x", None).await,
            Err(ChannelError::MessageGone(_))
        ));
        console.delete_message(surface).await.unwrap();
        assert_eq!(console.plain_text(surface), None);
    }
}
