//! Chain normalizer
//!
//! Removes what differs between engines and machines but not between call
//! chains: absolute path prefixes, exact columns, receiver qualifiers in
//! labels, engine-internal frames. Async continuations become explicit
//! [`ChainEntry::AsyncBoundary`] markers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::StackprintConfig;
use crate::frame::{ANONYMOUS_LABEL, Chain, Frame, FrameTags, InvocationKind};

/// A frame with its volatile parts erased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedFrame {
    /// Canonical label (method name without receiver or `new`)
    pub label: String,
    /// Invocation kind
    pub kind: InvocationKind,
    /// Repo-relative file
    pub file: Option<String>,
    /// Line, kept for display; only its presence is compared
    pub line: Option<u32>,
    /// Whether the engine reported a column
    pub has_column: bool,
    /// Capability tags
    pub tags: FrameTags,
}

impl NormalizedFrame {
    /// Label carries no name that could be compared by text.
    pub fn is_anonymous(&self) -> bool {
        self.label == ANONYMOUS_LABEL || self.label.is_empty()
    }
}

impl fmt::Display for NormalizedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.label, self.kind)?;
        if let Some(file) = &self.file {
            write!(f, " ({}", file)?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// One element of a normalized chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEntry {
    /// A call frame
    Frame(NormalizedFrame),
    /// Execution suspended between the neighbouring frames and resumed later
    AsyncBoundary,
}

impl ChainEntry {
    /// The frame, if this entry is one
    pub fn as_frame(&self) -> Option<&NormalizedFrame> {
        match self {
            ChainEntry::Frame(frame) => Some(frame),
            ChainEntry::AsyncBoundary => None,
        }
    }

    /// Whether this entry is a boundary marker
    pub fn is_boundary(&self) -> bool {
        matches!(self, ChainEntry::AsyncBoundary)
    }
}

impl fmt::Display for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainEntry::Frame(frame) => frame.fmt(f),
            ChainEntry::AsyncBoundary => f.write_str("<async boundary>"),
        }
    }
}

/// Canonical, engine-independent form of a call chain, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedChain {
    entries: Vec<ChainEntry>,
}

impl NormalizedChain {
    /// Build from entries as given.
    pub fn from_entries(entries: Vec<ChainEntry>) -> Self {
        Self { entries }
    }

    /// All entries, frames and markers
    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    /// Frames only
    pub fn frames(&self) -> impl Iterator<Item = &NormalizedFrame> + '_ {
        self.entries.iter().filter_map(ChainEntry::as_frame)
    }

    /// Number of frames (markers not counted)
    pub fn frame_count(&self) -> usize {
        self.frames().count()
    }

    /// Number of async boundary markers
    pub fn boundary_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_boundary()).count()
    }

    /// Whether the chain has no frames
    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Keep at most `depth` frames, cutting from the outermost end.
    pub fn truncated(&self, depth: usize) -> Self {
        let mut entries = Vec::with_capacity(self.entries.len());
        let mut frames = 0;
        for entry in &self.entries {
            if entry.as_frame().is_some() {
                if frames == depth {
                    break;
                }
                frames += 1;
            }
            entries.push(entry.clone());
        }
        trim_boundaries(&mut entries);
        Self { entries }
    }
}

impl fmt::Display for NormalizedChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut index = 0;
        for entry in &self.entries {
            match entry {
                ChainEntry::Frame(frame) => {
                    writeln!(f, "  #{:<3} {}", index, frame)?;
                    index += 1;
                }
                ChainEntry::AsyncBoundary => writeln!(f, "       -- async --")?,
            }
        }
        Ok(())
    }
}

/// Drop markers that do not sit between two frames, and repeated markers.
fn trim_boundaries(entries: &mut Vec<ChainEntry>) {
    while entries.last().is_some_and(ChainEntry::is_boundary) {
        entries.pop();
    }
    while entries.first().is_some_and(ChainEntry::is_boundary) {
        entries.remove(0);
    }
    entries.dedup_by(|a, b| a.is_boundary() && b.is_boundary());
}

/// Reduce a label to the name engines agree on.
pub fn canonical_label(label: &str, kind: InvocationKind) -> String {
    if kind == InvocationKind::AnonymousTop {
        return ANONYMOUS_LABEL.to_string();
    }

    let mut label = label.trim();
    for prefix in ["async ", "new "] {
        if let Some(rest) = label.strip_prefix(prefix) {
            label = rest.trim_start();
        }
    }
    if label.is_empty() || label == ANONYMOUS_LABEL || label.ends_with("/<") {
        return ANONYMOUS_LABEL.to_string();
    }
    if let Some((_, last)) = label.rsplit_once('/') {
        label = last;
    }
    if let Some((_, method)) = label.rsplit_once(".prototype.") {
        return method.to_string();
    }
    match label.rsplit_once('.') {
        // a trailing `.` is not a qualifier
        Some((_, name)) if !name.is_empty() => name.to_string(),
        _ => label.to_string(),
    }
}

/// Make a file path repo-relative.
pub fn strip_path(file: &str, prefix: Option<&str>) -> String {
    let strip = |path: &str| -> Option<String> {
        let prefix = prefix?;
        path.strip_prefix(prefix)
            .map(|rest| rest.trim_start_matches('/').to_string())
    };
    if let Some(stripped) = strip(file) {
        return stripped;
    }
    let without_scheme = file.strip_prefix("file://").unwrap_or(file);
    strip(without_scheme).unwrap_or_else(|| without_scheme.to_string())
}

/// Anything that can be reduced to a [`NormalizedChain`].
pub trait Normalize {
    /// Produce the canonical chain under `config`.
    fn normalize(&self, config: &StackprintConfig) -> NormalizedChain;
}

impl Normalize for Chain<Frame> {
    fn normalize(&self, config: &StackprintConfig) -> NormalizedChain {
        let prefix = config.path_prefix_to_strip.as_deref();
        let mut entries = Vec::with_capacity(self.len() * 2);
        let mut pending_boundary = false;
        let mut dropped = 0usize;

        for frame in self {
            if config.drop_internal_frames && frame.tags.native {
                pending_boundary |= frame.is_async_boundary;
                dropped += 1;
                continue;
            }
            if frame.is_async_boundary || pending_boundary {
                entries.push(ChainEntry::AsyncBoundary);
                pending_boundary = false;
            }
            entries.push(ChainEntry::Frame(NormalizedFrame {
                label: canonical_label(&frame.label, frame.kind),
                kind: frame.kind,
                file: frame.site.file.as_deref().map(|f| strip_path(f, prefix)),
                line: frame.site.line,
                has_column: frame.site.column.is_some(),
                tags: frame.tags,
            }));
        }

        trim_boundaries(&mut entries);
        let chain = NormalizedChain { entries };
        let chain = match config.effective_max_depth() {
            Some(depth) => chain.truncated(depth),
            None => chain,
        };

        tracing::trace!(
            frames = chain.frame_count(),
            boundaries = chain.boundary_count(),
            dropped,
            "normalized chain"
        );
        chain
    }
}

impl Normalize for NormalizedChain {
    fn normalize(&self, config: &StackprintConfig) -> NormalizedChain {
        let mut entries: Vec<ChainEntry> = self
            .entries
            .iter()
            .filter(|e| {
                !(config.drop_internal_frames && e.as_frame().is_some_and(|f| f.tags.native))
            })
            .cloned()
            .collect();
        trim_boundaries(&mut entries);
        let chain = NormalizedChain { entries };
        match config.effective_max_depth() {
            Some(depth) => chain.truncated(depth),
            None => chain,
        }
    }
}

/// Normalize a chain under `config`.
pub fn normalize<N: Normalize + ?Sized>(chain: &N, config: &StackprintConfig) -> NormalizedChain {
    chain.normalize(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_chain;
    use crate::parser::parse;

    fn chain_of(raw: &str) -> Chain<Frame> {
        let chain = parse(raw).into_chain().unwrap();
        classify_chain(&chain, None)
    }

    const V8_TRACE: &str = "Error\n\
        at Object.objectLiteralAnon (/home/ci/app/simple.js:28:38)\n\
        at Object.objectLiteralMethod (/home/ci/app/simple.js:27:33)\n\
        at async Klass.#privateMethod (/home/ci/app/simple.js:18:29)\n\
        at async Promise.all (index 0)\n\
        at Module._compile (node:internal/modules/cjs/loader:1256:14)\n\
        at async namedFn (/home/ci/app/simple.js:3:21)\n";

    #[test]
    fn test_canonical_labels() {
        use InvocationKind::*;
        assert_eq!(
            canonical_label("Object.objectLiteralAnon", ObjectLiteralMethod),
            "objectLiteralAnon"
        );
        assert_eq!(
            canonical_label("Klass.prototype.prototypeMethod", ClassInstanceMethod),
            "prototypeMethod"
        );
        assert_eq!(canonical_label("new Klass", Constructor), "Klass");
        assert_eq!(canonical_label("Klass.#privateMethod", ClassPrivateMethod), "#privateMethod");
        assert_eq!(canonical_label("classMethod/<", FunctionExpressionAnon), ANONYMOUS_LABEL);
        assert_eq!(canonical_label("global code", AnonymousTop), ANONYMOUS_LABEL);
        assert_eq!(canonical_label("namedFn", FunctionDeclaration), "namedFn");
    }

    #[test]
    fn test_strip_path() {
        assert_eq!(strip_path("file:///home/ci/app/simple.js", Some("/home/ci/app/")), "simple.js");
        assert_eq!(strip_path("/home/ci/app/lib/a.js", Some("/home/ci/app")), "lib/a.js");
        assert_eq!(
            strip_path("http://127.0.0.1:8080/simple.js", Some("http://127.0.0.1:8080/")),
            "simple.js"
        );
        assert_eq!(strip_path("file:///elsewhere/a.js", Some("/home/ci/app/")), "/elsewhere/a.js");
        assert_eq!(strip_path("a.js", None), "a.js");
    }

    #[test]
    fn test_boundaries_and_internal_frames() {
        let config = StackprintConfig::default().with_path_prefix("/home/ci/app/");
        let normalized = chain_of(V8_TRACE).normalize(&config);

        let labels: Vec<_> = normalized.frames().map(|f| f.label.as_str()).collect();
        assert_eq!(
            labels,
            ["objectLiteralAnon", "objectLiteralMethod", "#privateMethod", "namedFn"]
        );
        assert_eq!(normalized.boundary_count(), 2);
        assert!(normalized.entries()[2].is_boundary());
        assert!(normalized.entries()[4].is_boundary());
        assert!(normalized.frames().all(|f| f.file.as_deref() == Some("simple.js")));
    }

    #[test]
    fn test_internal_frames_kept_when_configured() {
        let config = StackprintConfig {
            drop_internal_frames: false,
            ..StackprintConfig::default()
        };
        let normalized = chain_of(V8_TRACE).normalize(&config);
        assert_eq!(normalized.frame_count(), 6);
    }

    #[test]
    fn test_idempotent() {
        let config = StackprintConfig::default()
            .with_path_prefix("/home/ci/app/")
            .with_max_depth(3);
        let once = normalize(&chain_of(V8_TRACE), &config);
        let twice = normalize(&once, &config);
        assert_eq!(once, twice);
        assert_eq!(once.frame_count(), 3);
    }

    #[test]
    fn test_column_changes_are_invisible() {
        let config = StackprintConfig::default();
        let a = chain_of(
            "Error\n    \
             at Klass.prototypeMethod (/x/simple.js:22:28)\n    \
             at globalAssign (/x/simple.js:24:30)",
        );
        let b = chain_of(
            "Error\n    \
             at Klass.prototypeMethod (/x/simple.js:22:41)\n    \
             at globalAssign (/x/simple.js:24:30)",
        );
        assert_eq!(a.normalize(&config), b.normalize(&config));
    }

    #[test]
    fn test_truncation_drops_dangling_boundary() {
        let config = StackprintConfig::default();
        let full = chain_of(V8_TRACE).normalize(&config);
        let cut = full.truncated(2);
        assert_eq!(cut.frame_count(), 2);
        assert!(!cut.entries().last().unwrap().is_boundary());
    }

    #[test]
    fn test_zero_depth_keeps_innermost_frame() {
        let config = StackprintConfig::default().with_max_depth(0);
        let normalized = chain_of(V8_TRACE).normalize(&config);
        assert_eq!(normalized.frame_count(), 1);
        assert_eq!(normalized.frames().next().unwrap().label, "objectLiteralAnon");
        assert_eq!(normalize(&normalized, &config), normalized);
    }

    #[test]
    fn test_leading_async_frame_gets_no_marker() {
        let config = StackprintConfig::default();
        let normalized = chain_of("async*inner@x.js:1:1\nasync*outer@x.js:2:1").normalize(&config);
        assert_eq!(normalized.entries().len(), 3);
        assert!(!normalized.entries()[0].is_boundary());
        assert!(normalized.entries()[1].is_boundary());
    }

    #[test]
    fn test_json_shape() {
        let chain = NormalizedChain::from_entries(vec![ChainEntry::AsyncBoundary]);
        let json = serde_json::to_string(&chain).unwrap();
        assert_eq!(json, r#"[{"type":"async_boundary"}]"#);
    }
}
