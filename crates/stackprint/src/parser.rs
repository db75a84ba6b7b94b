//! Frame parser: raw trace text to an ordered list of frame lines.
//!
//! Three shapes of frame line are recognized:
//!
//! - V8: `at label (location)` or `at location`, optionally `at async ...`
//! - SpiderMonkey / JavaScriptCore: `label@location`, optionally `async*label@location`
//! - any line ending in a parenthesized `file:line[:column]` location
//!
//! A location must end in `:line[:column]` or be one of the pseudo-locations
//! engines print for builtins (`<anonymous>`, `native`, `[native code]`,
//! `index 0`). Message text such as `at least one field` or `mail admin@host`
//! therefore stays out of the frames.
//!
//! Anything else is a header line when it precedes the first frame line, and a
//! degraded frame otherwise. Parsing never fails.

use regex::Regex;
use std::sync::OnceLock;

use crate::frame::{Chain, RawFrame};

/// Parsed trace text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTrace {
    /// Leading non-frame lines (error message, `# sync stack trace`, ...)
    pub header: Vec<String>,
    /// Frame lines, innermost first
    pub frames: Vec<RawFrame>,
}

impl RawTrace {
    /// Turn the frames into a chain; `None` for an empty trace.
    pub fn into_chain(self) -> Option<Chain<RawFrame>> {
        Chain::new(self.frames)
    }
}

/// Which engine family a frame line's syntax belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSyntax {
    /// `at label (location)`
    V8,
    /// `label@location`
    AtSign,
    /// `label (location)` without any marker
    Parenthesized,
}

/// Pieces of one matched frame line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLine<'a> {
    /// Syntax family
    pub syntax: LineSyntax,
    /// `at async` / `async*` marker present
    pub is_async: bool,
    /// `at new` marker present
    pub is_new: bool,
    /// Label text, possibly empty
    pub label: &'a str,
    /// Location text, when present
    pub location: Option<&'a str>,
}

/// A location split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location<'a> {
    /// File, URL or pseudo-location (`native`, `index 0`)
    pub file: &'a str,
    /// Line, when present
    pub line: Option<u32>,
    /// Column, when present
    pub column: Option<u32>,
}

fn at_sign_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(?P<async>async)\*)?(?P<label>[^@:]*)@(?P<loc>.+)$")
            .expect("valid regex")
    })
}

fn location_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<file>.*?)(?::(?P<line>\d+))?(?::(?P<col>\d+))?$")
            .expect("valid regex")
    })
}

fn has_line_number(location: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r":\d+(?::\d+)?$").expect("valid regex"))
        .is_match(location)
}

fn is_pseudo_location(location: &str) -> bool {
    matches!(location, "<anonymous>" | "native" | "[native code]")
        || location
            .strip_prefix("index ")
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn is_location(location: &str) -> bool {
    has_line_number(location) || is_pseudo_location(location)
}

/// Split `text` into `(before, inside)` around its trailing balanced `(...)`.
fn split_trailing_parens(text: &str) -> Option<(&str, &str)> {
    let body = text.strip_suffix(')')?;
    let mut depth = 0usize;
    for (idx, ch) in body.char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' if depth == 0 => return Some((body[..idx].trim_end(), &body[idx + 1..])),
            '(' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Match one trimmed line against the frame-line grammar.
pub fn match_frame_line(line: &str) -> Option<FrameLine<'_>> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix("at ") {
        let mut rest = rest.trim_start();
        let mut is_async = false;
        let mut is_new = false;
        if let Some(r) = rest.strip_prefix("async ") {
            is_async = true;
            rest = r.trim_start();
        }
        if let Some(r) = rest.strip_prefix("new ") {
            is_new = true;
            rest = r.trim_start();
        }
        let (label, location) = match split_trailing_parens(rest) {
            Some((label, location)) if is_location(location) => (label, location),
            _ if has_line_number(rest) => ("", rest),
            _ => return None,
        };
        return Some(FrameLine {
            syntax: LineSyntax::V8,
            is_async,
            is_new,
            label,
            location: Some(location),
        });
    }

    if let Some(caps) = at_sign_pattern().captures(line)
        && let Some(location) = caps.name("loc").map(|m| m.as_str()).filter(|l| is_location(l))
    {
        let label = caps.name("label").map_or("", |m| m.as_str());
        return Some(FrameLine {
            syntax: LineSyntax::AtSign,
            is_async: caps.name("async").is_some(),
            is_new: false,
            label,
            location: Some(location),
        });
    }

    if let Some((label, location)) = split_trailing_parens(line)
        && has_line_number(location)
    {
        return Some(FrameLine {
            syntax: LineSyntax::Parenthesized,
            is_async: false,
            is_new: false,
            label,
            location: Some(location),
        });
    }

    None
}

/// Split a location into file, line and column.
pub fn parse_location(location: &str) -> Location<'_> {
    let location = location.trim();
    match location_pattern().captures(location) {
        Some(caps) => Location {
            file: caps.name("file").map_or(location, |m| m.as_str()),
            line: caps.name("line").and_then(|m| m.as_str().parse().ok()),
            column: caps.name("col").and_then(|m| m.as_str().parse().ok()),
        },
        None => Location {
            file: location,
            line: None,
            column: None,
        },
    }
}

/// Parse raw trace text into header lines and frame lines.
pub fn parse(raw: &str) -> RawTrace {
    // `lines()` handles `\r\n`; dropping empty lines collapses any run of
    // blank separators into one.
    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let header_len = lines
        .iter()
        .position(|l| match_frame_line(l).is_some())
        .unwrap_or(0);

    let header = lines[..header_len].iter().map(|l| l.to_string()).collect();
    let frames: Vec<RawFrame> = lines[header_len..]
        .iter()
        .enumerate()
        .map(|(index, text)| RawFrame::new(index, *text))
        .collect();

    tracing::trace!(
        header = header_len,
        frames = frames.len(),
        "parsed raw trace"
    );

    RawTrace { header, frames }
}
