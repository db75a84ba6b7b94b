//! Frame data model shared by the parser, classifier and normalizer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Label used for frames without a usable function name.
pub const ANONYMOUS_LABEL: &str = "<anonymous>";

/// A single line of engine-emitted trace text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Position in the trace (0 = innermost / throw site)
    pub index: usize,
    /// Trimmed line text
    pub text: String,
}

impl RawFrame {
    /// Create a raw frame
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

/// How the function behind a frame was declared and invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvocationKind {
    /// `function name() {}`
    FunctionDeclaration,
    /// `const a = function b() {}`
    FunctionExpressionNamed,
    /// `const a = function () {}`
    FunctionExpressionAnon,
    /// `const a = () => {}`
    ArrowFunction,
    /// `static method() {}`
    ClassStaticMethod,
    /// `method() {}` inside a class body
    ClassInstanceMethod,
    /// `#method() {}`
    ClassPrivateMethod,
    /// `Klass.prototype.method = ...`
    PrototypeAssignedMethod,
    /// `{ method() {} }`
    ObjectLiteralMethod,
    /// Class constructor / class body
    Constructor,
    /// Module or script top level
    AnonymousTop,
    /// Nothing matched
    Unknown,
}

impl InvocationKind {
    /// Kinds that carry no meaningful name of their own.
    pub fn is_anonymous(self) -> bool {
        matches!(
            self,
            InvocationKind::FunctionExpressionAnon
                | InvocationKind::AnonymousTop
                | InvocationKind::Unknown
        )
    }
}

impl fmt::Display for InvocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvocationKind::FunctionDeclaration => "FunctionDeclaration",
            InvocationKind::FunctionExpressionNamed => "FunctionExpressionNamed",
            InvocationKind::FunctionExpressionAnon => "FunctionExpressionAnon",
            InvocationKind::ArrowFunction => "ArrowFunction",
            InvocationKind::ClassStaticMethod => "ClassStaticMethod",
            InvocationKind::ClassInstanceMethod => "ClassInstanceMethod",
            InvocationKind::ClassPrivateMethod => "ClassPrivateMethod",
            InvocationKind::PrototypeAssignedMethod => "PrototypeAssignedMethod",
            InvocationKind::ObjectLiteralMethod => "ObjectLiteralMethod",
            InvocationKind::Constructor => "Constructor",
            InvocationKind::AnonymousTop => "AnonymousTop",
            InvocationKind::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Source location of a frame. Any part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Site {
    /// File path or URL
    pub file: Option<String>,
    /// 1-based line
    pub line: Option<u32>,
    /// 1-based column
    pub column: Option<u32>,
}

impl Site {
    /// A site with file, line and column.
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: Some(file.into()),
            line: Some(line),
            column: Some(column),
        }
    }

    /// Whether no part of the location is known.
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.line.is_none() && self.column.is_none()
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file.as_deref().unwrap_or("?"))?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        if let Some(column) = self.column {
            write!(f, ":{}", column)?;
        }
        Ok(())
    }
}

/// Capability tags read off the frame text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameTags {
    /// Private (`#name`) member
    pub private: bool,
    /// Called on the class itself
    pub is_static: bool,
    /// Invoked through `new`
    pub construct: bool,
    /// Engine-internal or native code
    pub native: bool,
}

/// A classified stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Best-effort function name, `<anonymous>` when unavailable
    pub label: String,
    /// Inferred invocation kind, always assigned
    pub kind: InvocationKind,
    /// Source location
    pub site: Site,
    /// Frame is a resumed async continuation rather than a direct call
    pub is_async_boundary: bool,
    /// Capability tags
    pub tags: FrameTags,
}

impl Frame {
    /// Create a frame with no tags and no async marker
    pub fn new(label: impl Into<String>, kind: InvocationKind, site: Site) -> Self {
        Self {
            label: label.into(),
            kind,
            site,
            is_async_boundary: false,
            tags: FrameTags::default(),
        }
    }

    /// A frame for a line nothing could be read from.
    pub fn unknown(text: &str) -> Self {
        let label = if text.is_empty() { ANONYMOUS_LABEL } else { text };
        Self::new(label, InvocationKind::Unknown, Site::default())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_async_boundary {
            f.write_str("async ")?;
        }
        write!(f, "{} [{}]", self.label, self.kind)?;
        if !self.site.is_empty() {
            write!(f, " ({})", self.site)?;
        }
        Ok(())
    }
}

/// Ordered innermost-first sequence of frames, never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain<T> {
    frames: Vec<T>,
}

impl<T> Chain<T> {
    /// Build a chain; `None` when `frames` is empty.
    pub fn new(frames: Vec<T>) -> Option<Self> {
        if frames.is_empty() {
            None
        } else {
            Some(Self { frames })
        }
    }

    /// Number of frames (at least 1)
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Innermost (throw-site) frame
    pub fn innermost(&self) -> &T {
        &self.frames[0]
    }

    /// Frames, innermost first
    pub fn frames(&self) -> &[T] {
        &self.frames
    }

    /// Iterate frames, innermost first
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.frames.iter()
    }

    /// Map every frame, keeping order
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Chain<U> {
        Chain {
            frames: self.frames.into_iter().map(f).collect(),
        }
    }

    /// Consume into the frame vector
    pub fn into_frames(self) -> Vec<T> {
        self.frames
    }
}

impl<'a, T> IntoIterator for &'a Chain<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_rejects_empty() {
        assert!(Chain::<RawFrame>::new(Vec::new()).is_none());
        let chain = Chain::new(vec![RawFrame::new(0, "at a (x.js:1:1)")]).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.innermost().index, 0);
    }

    #[test]
    fn test_site_display() {
        assert_eq!(Site::new("a.js", 3, 7).to_string(), "a.js:3:7");
        let partial = Site {
            file: Some("a.js".into()),
            line: Some(3),
            column: None,
        };
        assert_eq!(partial.to_string(), "a.js:3");
    }

    #[test]
    fn test_frame_display() {
        let mut frame = Frame::new(
            "namedFn",
            InvocationKind::FunctionDeclaration,
            Site::new("simple.js", 3, 21),
        );
        assert_eq!(
            frame.to_string(),
            "namedFn [FunctionDeclaration] (simple.js:3:21)"
        );
        frame.is_async_boundary = true;
        assert!(frame.to_string().starts_with("async namedFn"));
    }
}
