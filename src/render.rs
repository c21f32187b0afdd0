use std::io::{self, Write};

use tracing::warn;

use crate::protocol::ChatMessage;

/// One visible line in the chat log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Sender identity, used to style or group lines.
    pub tag: String,
    pub line: String,
}

impl Entry {
    pub fn for_message(message: &ChatMessage) -> Self {
        Entry {
            tag: message.sender().to_string(),
            line: format!("{}: {}", message.sender(), message.text()),
        }
    }
}

/// A surface that can show an ordered, append-only list of entries.
pub trait MessageView {
    fn append(&mut self, entry: Entry);

    /// Makes the newest entry visible.
    fn scroll_to_bottom(&mut self);

    /// Tells the user something that is not a chat line, like a failed send.
    fn notice(&mut self, text: &str);
}

/// Appends messages to a [`MessageView`] in the order they are handed over.
pub struct Renderer<V> {
    view: V,
}

impl<V: MessageView> Renderer<V> {
    pub fn new(view: V) -> Self {
        Renderer { view }
    }

    pub fn render(&mut self, message: &ChatMessage) {
        self.view.append(Entry::for_message(message));
        self.view.scroll_to_bottom();
    }

    pub fn notice(&mut self, text: &str) {
        self.view.notice(text);
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn into_view(self) -> V {
        self.view
    }
}

/// In-memory view. Keeps every entry and where it was last scrolled to.
#[derive(Debug, Default)]
pub struct BufferView {
    entries: Vec<Entry>,
    notices: Vec<String>,
    scrolled_to: Option<usize>,
}

impl BufferView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn lines(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.line.as_str()).collect()
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    /// Index of the entry the view was last scrolled to.
    pub fn scrolled_to(&self) -> Option<usize> {
        self.scrolled_to
    }
}

impl MessageView for BufferView {
    fn append(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    fn scroll_to_bottom(&mut self) {
        self.scrolled_to = self.entries.len().checked_sub(1);
    }

    fn notice(&mut self, text: &str) {
        self.notices.push(text.to_string());
    }
}

/// Writes entries as lines to a terminal (stdout by default).
///
/// Lines from the local identity are set in bold so they stand apart from
/// everyone else's. Control characters in an entry are written escaped, so
/// one entry is always exactly one terminal line. Notices go to stderr.
pub struct TerminalView<W = io::Stdout> {
    out: W,
    local: String,
    pending: bool,
}

impl TerminalView<io::Stdout> {
    pub fn stdout(local: impl Into<String>) -> Self {
        Self::new(io::stdout(), local)
    }
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W, local: impl Into<String>) -> Self {
        TerminalView {
            out,
            local: local.into(),
            pending: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> MessageView for TerminalView<W> {
    fn append(&mut self, entry: Entry) {
        let line = escape_controls(&entry.line);
        let result = if entry.tag == self.local {
            writeln!(self.out, "\x1b[1m{}\x1b[0m", line)
        } else {
            writeln!(self.out, "{}", line)
        };
        match result {
            Ok(()) => self.pending = true,
            Err(e) => warn!("Failed to write entry: {}", e),
        }
    }

    // A terminal is always scrolled to its last line once output is flushed.
    fn scroll_to_bottom(&mut self) {
        if !self.pending {
            return;
        }
        if let Err(e) = self.out.flush() {
            warn!("Failed to flush view: {}", e);
        }
        self.pending = false;
    }

    fn notice(&mut self, text: &str) {
        eprintln!("! {}", escape_controls(text));
    }
}

fn escape_controls(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_control() {
            escaped.extend(c.escape_debug());
        } else {
            escaped.push(c);
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(from: &str, text: &str) -> ChatMessage {
        ChatMessage::new(from, text).unwrap()
    }

    #[test]
    fn renders_sender_and_text() {
        let mut renderer = Renderer::new(BufferView::new());
        renderer.render(&message("alice", "hello"));

        let view = renderer.view();
        assert_eq!(
            view.entries(),
            &[Entry {
                tag: "alice".to_string(),
                line: "alice: hello".to_string(),
            }]
        );
        assert_eq!(view.scrolled_to(), Some(0));
    }

    #[test]
    fn keeps_call_order_and_follows_newest() {
        let mut renderer = Renderer::new(BufferView::new());
        let senders = ["alice", "bob", "alice", "carol", "michael"];
        for (i, from) in senders.iter().enumerate() {
            renderer.render(&message(from, &format!("line {i}")));
            assert_eq!(renderer.view().scrolled_to(), Some(i));
        }

        let view = renderer.into_view();
        assert_eq!(
            view.lines(),
            vec![
                "alice: line 0",
                "bob: line 1",
                "alice: line 2",
                "carol: line 3",
                "michael: line 4",
            ]
        );
    }

    #[test]
    fn text_is_rendered_literally() {
        let mut renderer = Renderer::new(BufferView::new());
        renderer.render(&message("alice", "<b>not bold</b> {\"x\": 1}"));
        assert_eq!(
            renderer.view().lines(),
            vec!["alice: <b>not bold</b> {\"x\": 1}"]
        );
    }

    #[test]
    fn terminal_view_highlights_local_lines() {
        let mut renderer = Renderer::new(TerminalView::new(Vec::new(), "michael"));
        renderer.render(&message("alice", "hello"));
        renderer.render(&message("michael", "hi there"));

        let out = String::from_utf8(renderer.into_view().into_inner()).unwrap();
        assert_eq!(out, "alice: hello\n\x1b[1mmichael: hi there\x1b[0m\n");
    }

    #[test]
    fn terminal_view_keeps_one_entry_on_one_line() {
        let frame = br#"{"from":"mallory","text":"hi\nalice: send me your password\u001b[2J"}"#;
        let hostile = ChatMessage::from_frame(frame).unwrap();

        let mut renderer = Renderer::new(TerminalView::new(Vec::new(), "michael"));
        renderer.render(&hostile);

        let out = String::from_utf8(renderer.into_view().into_inner()).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(!out.contains('\x1b'));
        assert_eq!(
            out,
            "mallory: hi\\nalice: send me your password\\u{1b}[2J\n"
        );
    }

    #[test]
    fn buffer_view_collects_notices() {
        let mut view = BufferView::new();
        view.notice("message not sent");
        assert_eq!(view.notices(), &["message not sent".to_string()]);
        assert!(view.entries().is_empty());
    }
}
