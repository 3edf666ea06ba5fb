//! Terminal escape handling for hook output.
//!
//! Two cooperating transforms live here. [`OscFilter`] runs on the raw byte stream
//! coming out of the tool and removes OSC sequences (hyperlinks, window titles) while
//! passing SGR color sequences through untouched. [`ansi_spans`] later resolves those
//! SGR sequences into Ratatui styles when a line is drawn.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

/// Longest CSI body we are willing to hold before treating it as garbage.
const MAX_CSI_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterState {
    Ground,
    Escape,
    Csi(Vec<u8>),
    Osc,
    OscEscape,
}

/// Streaming OSC stripper.
///
/// Escape sequences and UTF-8 code points may be split across chunks; whatever is
/// incomplete at the end of a chunk is carried over to the next call to [`push`].
/// Output never contains a lone or partial escape: the only `ESC` bytes that survive
/// are the introducers of complete CSI sequences, which makes the filter idempotent.
///
/// [`push`]: OscFilter::push
#[derive(Debug, Clone)]
pub struct OscFilter {
    state: FilterState,
    utf8_tail: Vec<u8>,
}

impl Default for OscFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl OscFilter {
    pub fn new() -> Self {
        Self {
            state: FilterState::Ground,
            utf8_tail: Vec::new(),
        }
    }

    /// Feeds one chunk of raw output and returns the text that is ready for display.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        let mut out = Vec::with_capacity(chunk.len());
        for &byte in chunk {
            self.step(byte, &mut out);
        }
        self.decode(out, false)
    }

    /// Flushes whatever is still held. Unterminated OSC sequences are dropped, a
    /// dangling CSI prefix loses its `ESC` and is emitted as text.
    pub fn finish(&mut self) -> String {
        let mut out = Vec::new();
        match std::mem::replace(&mut self.state, FilterState::Ground) {
            FilterState::Csi(body) => out.extend_from_slice(&body[1..]),
            FilterState::Ground
            | FilterState::Escape
            | FilterState::Osc
            | FilterState::OscEscape => {}
        }
        self.decode(out, true)
    }

    /// Drops any carried state, used when a new run starts.
    pub fn reset(&mut self) {
        self.state = FilterState::Ground;
        self.utf8_tail.clear();
    }

    fn step(&mut self, byte: u8, out: &mut Vec<u8>) {
        match &mut self.state {
            FilterState::Ground => {
                if byte == ESC {
                    self.state = FilterState::Escape;
                } else {
                    out.push(byte);
                }
            }
            FilterState::Escape => match byte {
                b'[' => self.state = FilterState::Csi(vec![ESC, b'[']),
                b']' => self.state = FilterState::Osc,
                // a second ESC restarts the sequence; the first one is dropped
                ESC => {}
                _ => {
                    self.state = FilterState::Ground;
                    out.push(byte);
                }
            },
            FilterState::Csi(body) => match byte {
                0x20..=0x3f if body.len() < MAX_CSI_LEN => body.push(byte),
                0x40..=0x7e => {
                    body.push(byte);
                    out.extend_from_slice(body);
                    self.state = FilterState::Ground;
                }
                _ => {
                    out.extend_from_slice(&body[1..]);
                    self.state = FilterState::Ground;
                    self.step(byte, out);
                }
            },
            FilterState::Osc => match byte {
                BEL => self.state = FilterState::Ground,
                ESC => self.state = FilterState::OscEscape,
                _ => {}
            },
            FilterState::OscEscape => match byte {
                b'\\' => self.state = FilterState::Ground,
                ESC => {}
                _ => self.state = FilterState::Osc,
            },
        }
    }

    fn decode(&mut self, out: Vec<u8>, flush: bool) -> String {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        bytes.extend_from_slice(&out);
        if !flush {
            let held = incomplete_utf8_tail(&bytes);
            self.utf8_tail = bytes.split_off(bytes.len() - held);
        }
        match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }
}

/// Number of trailing bytes that start a UTF-8 code point but do not finish it.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match byte {
            0xf0..=0xf7 => 4,
            0xe0..=0xef => 3,
            0xc0..=0xdf => 2,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

#[derive(Debug, Clone)]
struct SgrState {
    fg: Option<Color>,
    bg: Option<Color>,
    modifiers: Modifier,
}

impl Default for SgrState {
    fn default() -> Self {
        Self {
            fg: None,
            bg: None,
            modifiers: Modifier::empty(),
        }
    }
}

impl SgrState {
    fn style(&self) -> Style {
        let mut style = Style::default().add_modifier(self.modifiers);
        if let Some(color) = self.fg {
            style = style.fg(color);
        }
        if let Some(color) = self.bg {
            style = style.bg(color);
        }
        style
    }

    fn apply(&mut self, params: &str) {
        let values = parse_params(params);
        let mut i = 0;
        while i < values.len() {
            let code = values[i];
            i += 1;
            match code {
                0 => *self = SgrState::default(),
                1..=9 => {
                    if let Some(modifier) = sgr_modifier(code) {
                        self.modifiers.insert(modifier);
                    }
                }
                22 => self.modifiers.remove(Modifier::BOLD | Modifier::DIM),
                23 => self.modifiers.remove(Modifier::ITALIC),
                24 => self.modifiers.remove(Modifier::UNDERLINED),
                25 => self
                    .modifiers
                    .remove(Modifier::SLOW_BLINK | Modifier::RAPID_BLINK),
                27 => self.modifiers.remove(Modifier::REVERSED),
                28 => self.modifiers.remove(Modifier::HIDDEN),
                29 => self.modifiers.remove(Modifier::CROSSED_OUT),
                30..=37 => self.fg = basic_color(code - 30, false),
                90..=97 => self.fg = basic_color(code - 90, true),
                40..=47 => self.bg = basic_color(code - 40, false),
                100..=107 => self.bg = basic_color(code - 100, true),
                39 => self.fg = None,
                49 => self.bg = None,
                38 | 48 => {
                    if let Some((advance, color)) = parse_extended_color(&values[i..]) {
                        if code == 38 {
                            self.fg = Some(color);
                        } else {
                            self.bg = Some(color);
                        }
                        i += advance;
                    }
                }
                _ => {}
            }
        }
    }
}

/// Resolves SGR sequences in one display line into styled spans.
///
/// Non-SGR CSI sequences are dropped, and so are any OSC sequences that slipped past
/// the stream filter. A carriage return discards what was drawn before it.
pub fn ansi_spans(text: &str) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut buffer = String::new();
    let mut state = SgrState::default();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\x1b' if chars.peek() == Some(&'[') => {
                chars.next();
                let mut params = String::new();
                let mut final_byte = None;
                for c in chars.by_ref() {
                    if ('@'..='~').contains(&c) {
                        final_byte = Some(c);
                        break;
                    }
                    params.push(c);
                }
                if final_byte == Some('m') {
                    flush_span(&mut spans, &mut buffer, &state);
                    state.apply(&params);
                }
            }
            '\x1b' if chars.peek() == Some(&']') => {
                chars.next();
                while let Some(next) = chars.next() {
                    if next == '\x07' || (next == '\x1b' && chars.next_if_eq(&'\\').is_some()) {
                        break;
                    }
                }
            }
            '\x1b' => {}
            '\r' => {
                buffer.clear();
                spans.clear();
            }
            _ => buffer.push(ch),
        }
    }
    flush_span(&mut spans, &mut buffer, &state);
    spans
}

fn flush_span(spans: &mut Vec<Span<'static>>, buffer: &mut String, state: &SgrState) {
    if buffer.is_empty() {
        return;
    }
    spans.push(Span::styled(std::mem::take(buffer), state.style()));
}

fn sgr_modifier(code: i32) -> Option<Modifier> {
    let modifier = match code {
        1 => Modifier::BOLD,
        2 => Modifier::DIM,
        3 => Modifier::ITALIC,
        4 => Modifier::UNDERLINED,
        5 => Modifier::SLOW_BLINK,
        6 => Modifier::RAPID_BLINK,
        7 => Modifier::REVERSED,
        8 => Modifier::HIDDEN,
        9 => Modifier::CROSSED_OUT,
        _ => return None,
    };
    Some(modifier)
}

fn parse_params(params: &str) -> Vec<i32> {
    let values: Vec<i32> = params
        .split(';')
        .filter_map(|part| {
            if part.is_empty() {
                Some(0)
            } else {
                part.parse().ok()
            }
        })
        .collect();
    if values.is_empty() {
        vec![0]
    } else {
        values
    }
}

fn parse_extended_color(values: &[i32]) -> Option<(usize, Color)> {
    let channel = |idx: usize| values.get(idx).and_then(|v| u8::try_from(*v).ok());
    match values.first()? {
        5 => Some((2, Color::Indexed(channel(1)?))),
        2 => Some((4, Color::Rgb(channel(1)?, channel(2)?, channel(3)?))),
        _ => None,
    }
}

fn basic_color(index: i32, bright: bool) -> Option<Color> {
    const NORMAL: [Color; 8] = [
        Color::Black,
        Color::Red,
        Color::Green,
        Color::Yellow,
        Color::Blue,
        Color::Magenta,
        Color::Cyan,
        Color::Gray,
    ];
    const BRIGHT: [Color; 8] = [
        Color::DarkGray,
        Color::LightRed,
        Color::LightGreen,
        Color::LightYellow,
        Color::LightBlue,
        Color::LightMagenta,
        Color::LightCyan,
        Color::White,
    ];
    let table = if bright { &BRIGHT } else { &NORMAL };
    usize::try_from(index).ok().and_then(|i| table.get(i).copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strip_osc(text: &str) -> String {
        let mut filter = OscFilter::new();
        let mut out = filter.push(text.as_bytes());
        out.push_str(&filter.finish());
        out
    }

    const LINK: &str = "\u{1b}]8;;https://pre-commit.com\u{1b}\\docs\u{1b}]8;;\u{1b}\\";

    #[test]
    fn strip_osc_removes_hyperlinks_and_keeps_colors() {
        let input = format!("\u{1b}[41mFailed\u{1b}[m see {}", LINK);
        assert_eq!(strip_osc(&input), "\u{1b}[41mFailed\u{1b}[m see docs");
    }

    #[test]
    fn strip_osc_handles_bel_terminator() {
        assert_eq!(strip_osc("hi\u{1b}]0;title\u{7}there"), "hithere");
    }

    #[test]
    fn osc_split_across_chunks_is_still_removed() {
        let mut filter = OscFilter::new();
        let first = filter.push(b"black....\x1b]8;;https://exa");
        let second = filter.push(b"mple.com\x1b");
        let third = filter.push(b"\\Passed\n");
        assert_eq!(first, "black....");
        assert_eq!(second, "");
        assert_eq!(third, "Passed\n");
    }

    #[test]
    fn sgr_split_across_chunks_is_held_back() {
        let mut filter = OscFilter::new();
        assert_eq!(filter.push(b"ok \x1b[3"), "ok ");
        assert_eq!(filter.push(b"2mgreen"), "\x1b[32mgreen");
    }

    #[test]
    fn utf8_split_across_chunks_is_reassembled() {
        let bytes = "✓ done".as_bytes();
        let mut filter = OscFilter::new();
        let mut text = filter.push(&bytes[..1]);
        text.push_str(&filter.push(&bytes[1..]));
        assert_eq!(text, "✓ done");
    }

    #[test]
    fn finish_drops_unterminated_osc_and_dangling_escape() {
        let mut filter = OscFilter::new();
        assert_eq!(filter.push(b"a\x1b]8;;http://x"), "a");
        assert_eq!(filter.finish(), "");

        let mut filter = OscFilter::new();
        assert_eq!(filter.push(b"b\x1b[1;3"), "b");
        assert_eq!(filter.finish(), "[1;3");
    }

    #[test]
    fn lone_escape_before_osc_does_not_resurrect_one() {
        let once = strip_osc("\u{1b}\u{1b}]0;x\u{7}]0;y\u{7}");
        assert_eq!(strip_osc(&once), once);
        assert!(!once.contains('\u{1b}'));
    }

    #[test]
    fn ansi_spans_respects_sgr_color() {
        let spans = ansi_spans("\u{1b}[31mred\u{1b}[0m");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].content, "red");
        assert_eq!(spans[0].style.fg, Some(Color::Red));
    }

    #[test]
    fn ansi_spans_resolves_pre_commit_failed_marker() {
        let spans = ansi_spans("flake8....\u{1b}[41mFailed\u{1b}[m");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].content, "Failed");
        assert_eq!(spans[1].style.bg, Some(Color::Red));
    }

    #[test]
    fn ansi_spans_handles_carriage_return() {
        let spans = ansi_spans("abc\rdef");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].content, "def");
    }

    #[test]
    fn parse_extended_color_handles_index_and_rgb() {
        assert_eq!(parse_extended_color(&[5, 120]), Some((2, Color::Indexed(120))));
        assert_eq!(parse_extended_color(&[2, 1, 2, 3]), Some((4, Color::Rgb(1, 2, 3))));
        assert!(parse_extended_color(&[2, 1, 300, 3]).is_none());
        assert!(parse_extended_color(&[9]).is_none());
    }

    #[test]
    fn parse_params_defaults_to_reset() {
        assert_eq!(parse_params(""), vec![0]);
        assert_eq!(parse_params("1;"), vec![1, 0]);
    }

    fn noisy_text() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop_oneof![
                Just("\u{1b}".to_string()),
                Just("\u{1b}[".to_string()),
                Just("\u{1b}]".to_string()),
                Just("\u{7}".to_string()),
                Just("\\".to_string()),
                Just("[32m".to_string()),
                Just("8;;http://x".to_string()),
                "[a-z .é✓]{0,6}",
            ],
            0..24,
        )
        .prop_map(|parts| parts.concat())
    }

    proptest! {
        #[test]
        fn strip_osc_is_idempotent(text in noisy_text()) {
            let once = strip_osc(&text);
            prop_assert_eq!(strip_osc(&once), once);
        }

        #[test]
        fn chunking_does_not_change_output(text in noisy_text(), cut in 0usize..64) {
            let bytes = text.as_bytes();
            let cut = cut.min(bytes.len());
            let mut filter = OscFilter::new();
            let mut streamed = filter.push(&bytes[..cut]);
            streamed.push_str(&filter.push(&bytes[cut..]));
            streamed.push_str(&filter.finish());
            prop_assert_eq!(streamed, strip_osc(&text));
        }
    }
}
