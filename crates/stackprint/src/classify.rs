//! Frame classifier: raw frame line to a structured [`Frame`].
//!
//! Classification reads the label shape first. When a [`DeclarationLookup`] is
//! supplied, the declaration covering the frame's site overrides the textual
//! guess, which is the only way to tell arrow functions from anonymous
//! function expressions, or prototype-assigned methods from class methods.

use crate::frame::{ANONYMOUS_LABEL, Chain, Frame, FrameTags, InvocationKind, RawFrame, Site};
use crate::parser::{FrameLine, LineSyntax, match_frame_line, parse_location};

/// Declaration metadata for the function behind a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredScope<'a> {
    /// Declared (or inferred) function name
    pub name: &'a str,
    /// How the function was declared
    pub kind: InvocationKind,
    /// `name` was translated back through a source map and replaces the
    /// frame's own label
    pub resolved: bool,
}

/// Result of looking up a site in declaration metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeLookup<'a> {
    /// The site lies inside this declaration
    Declared(DeclaredScope<'a>),
    /// The site is covered by the metadata but lies outside every function
    TopLevel,
    /// The metadata knows nothing about the site
    Unknown,
}

/// Source-level declaration metadata, keyed by frame site.
pub trait DeclarationLookup {
    /// Look up the declaration whose body contains `site`.
    fn lookup(&self, site: &Site) -> ScopeLookup<'_>;
}

impl<T: DeclarationLookup + ?Sized> DeclarationLookup for &T {
    fn lookup(&self, site: &Site) -> ScopeLookup<'_> {
        (**self).lookup(site)
    }
}

const TOP_LEVEL_LABELS: &[&str] =
    &["global code", "module code", "eval code", "Object.<anonymous>"];

fn is_internal_file(file: &str) -> bool {
    file.starts_with("node:")
        || file.starts_with("internal/")
        || file == "native"
        || file == "[native code]"
        // `at async Promise.all (index 0)`
        || file.starts_with("index ")
}

/// Strip a V8 `[as alias]` suffix.
fn strip_alias(label: &str) -> &str {
    match label.find(" [as ") {
        Some(idx) if label.ends_with(']') => &label[..idx],
        _ => label,
    }
}

fn site_of(line: &FrameLine<'_>) -> (Site, bool) {
    match line.location {
        Some(location) => {
            let loc = parse_location(location);
            // V8 prints builtins as `at Array.forEach (<anonymous>)`
            let native = is_internal_file(loc.file)
                || (loc.file == ANONYMOUS_LABEL && loc.line.is_none());
            let site = Site {
                file: Some(loc.file.to_string()).filter(|f| !f.is_empty()),
                line: loc.line,
                column: loc.column,
            };
            (site, native)
        }
        None => (Site::default(), false),
    }
}

/// Infer a kind from label text alone.
pub fn kind_from_label(label: &str, syntax: LineSyntax) -> (InvocationKind, FrameTags) {
    let mut tags = FrameTags::default();
    let label = label.trim();

    if label.is_empty() {
        // SpiderMonkey prints top-level script code with an empty label; V8
        // prints anonymous functions as a bare location.
        let kind = match syntax {
            LineSyntax::AtSign => InvocationKind::AnonymousTop,
            _ => InvocationKind::FunctionExpressionAnon,
        };
        return (kind, tags);
    }
    if TOP_LEVEL_LABELS.contains(&label) {
        return (InvocationKind::AnonymousTop, tags);
    }
    if label == ANONYMOUS_LABEL || label.ends_with("/<") {
        return (InvocationKind::FunctionExpressionAnon, tags);
    }
    if label.starts_with("new ") {
        tags.construct = true;
        return (InvocationKind::Constructor, tags);
    }
    // SpiderMonkey nests inferred names with `/`; the last segment names the frame.
    if let Some((_, last)) = label.rsplit_once('/') {
        return kind_from_label(last, syntax);
    }
    if label.contains('#') {
        tags.private = true;
        return (InvocationKind::ClassPrivateMethod, tags);
    }
    if label.contains(".prototype.") {
        return (InvocationKind::ClassInstanceMethod, tags);
    }

    match label.split_once('.') {
        None => (InvocationKind::FunctionDeclaration, tags),
        Some(("Object", _)) => (InvocationKind::ObjectLiteralMethod, tags),
        Some((qualifier, _)) if qualifier.starts_with(|c: char| c.is_ascii_uppercase()) => {
            tags.is_static = true;
            (InvocationKind::ClassStaticMethod, tags)
        }
        Some(_) => (InvocationKind::ObjectLiteralMethod, tags),
    }
}

fn tags_for_kind(kind: InvocationKind, mut tags: FrameTags) -> FrameTags {
    match kind {
        InvocationKind::ClassPrivateMethod => tags.private = true,
        InvocationKind::ClassStaticMethod => tags.is_static = true,
        InvocationKind::Constructor => tags.construct = true,
        _ => {}
    }
    tags
}

fn classify_inner(raw: &RawFrame, lookup: Option<&dyn DeclarationLookup>) -> Frame {
    let Some(line) = match_frame_line(&raw.text) else {
        tracing::debug!(index = raw.index, text = %raw.text, "frame line did not match grammar");
        return Frame::unknown(&raw.text);
    };

    let (site, native) = site_of(&line);
    let label = strip_alias(line.label.trim());
    let (mut kind, mut tags) = if line.is_new {
        let tags = FrameTags {
            construct: true,
            ..FrameTags::default()
        };
        (InvocationKind::Constructor, tags)
    } else {
        kind_from_label(label, line.syntax)
    };
    tags.native = native;

    let mut label = if label.is_empty() {
        ANONYMOUS_LABEL.to_string()
    } else if line.is_new {
        format!("new {}", label)
    } else {
        label.to_string()
    };

    if let Some(lookup) = lookup
        && !native
        && site.line.is_some()
    {
        match lookup.lookup(&site) {
            ScopeLookup::Declared(scope) => {
                kind = scope.kind;
                tags = tags_for_kind(kind, tags);
                if (scope.resolved || label == ANONYMOUS_LABEL) && !scope.name.is_empty() {
                    label = scope.name.to_string();
                }
            }
            ScopeLookup::TopLevel if kind.is_anonymous() => kind = InvocationKind::AnonymousTop,
            ScopeLookup::TopLevel | ScopeLookup::Unknown => {}
        }
    }

    Frame {
        label,
        kind,
        site,
        is_async_boundary: line.is_async,
        tags,
    }
}

/// Classify a raw frame from its text alone.
pub fn classify(raw: &RawFrame) -> Frame {
    classify_inner(raw, None)
}

/// Classify a raw frame, letting declaration metadata override the textual kind.
pub fn classify_with(raw: &RawFrame, lookup: &dyn DeclarationLookup) -> Frame {
    classify_inner(raw, Some(lookup))
}

/// Classify every frame of a chain.
pub fn classify_chain(
    chain: &Chain<RawFrame>,
    lookup: Option<&dyn DeclarationLookup>,
) -> Chain<Frame> {
    chain.clone().map(|raw| classify_inner(&raw, lookup))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(text: &str) -> InvocationKind {
        classify(&RawFrame::new(0, text)).kind
    }

    #[test]
    fn test_v8_labels() {
        assert_eq!(kind_of("at namedFn (/a/simple.js:3:21)"), InvocationKind::FunctionDeclaration);
        assert_eq!(kind_of("at new Klass (/a/simple.js:12:32)"), InvocationKind::Constructor);
        assert_eq!(
            kind_of("at Function.staticMethod (/a/simple.js:12:32)"),
            InvocationKind::ClassStaticMethod
        );
        assert_eq!(
            kind_of("at Klass.#privateMethod (/a/simple.js:18:29)"),
            InvocationKind::ClassPrivateMethod
        );
        assert_eq!(
            kind_of("at Object.objectLiteralMethod (/a/simple.js:27:33)"),
            InvocationKind::ObjectLiteralMethod
        );
        assert_eq!(
            kind_of("at Object.<anonymous> (/a/simple.js:60:5)"),
            InvocationKind::AnonymousTop
        );
        assert_eq!(kind_of("at /a/simple.js:60:5"), InvocationKind::FunctionExpressionAnon);
    }

    #[test]
    fn test_at_sign_labels() {
        assert_eq!(
            kind_of("Klass.prototype.prototypeMethod@http://h/simple.js:22:28"),
            InvocationKind::ClassInstanceMethod
        );
        assert_eq!(
            kind_of("classMethod/<@http://h/simple.js:56:12"),
            InvocationKind::FunctionExpressionAnon
        );
        assert_eq!(kind_of("@http://h/simple.js:60:5"), InvocationKind::AnonymousTop);
        assert_eq!(kind_of("global code@http://h/simple.js:60:5"), InvocationKind::AnonymousTop);
        assert_eq!(
            kind_of("obj.objectLiteralAnon@http://h/simple.js:28:38"),
            InvocationKind::ObjectLiteralMethod
        );
        assert_eq!(
            kind_of("a/b/inner@http://h/simple.js:28:38"),
            InvocationKind::FunctionDeclaration
        );
    }

    #[test]
    fn test_unmatched_line_degrades() {
        let frame = classify(&RawFrame::new(3, "garbage line"));
        assert_eq!(frame.kind, InvocationKind::Unknown);
        assert_eq!(frame.label, "garbage line");
        assert!(frame.site.is_empty());
    }

    #[test]
    fn test_site_and_flags() {
        let line = "at async AsyncKlass.#privateAsyncMethod (file:///w/simple.js:43:47)";
        let frame = classify(&RawFrame::new(0, line));
        assert!(frame.is_async_boundary);
        assert!(frame.tags.private);
        assert_eq!(frame.site, Site::new("file:///w/simple.js", 43, 47));
        assert_eq!(frame.label, "AsyncKlass.#privateAsyncMethod");

        let internal = classify(&RawFrame::new(
            1,
            "at Module._compile (node:internal/modules/cjs/loader:1256:14)",
        ));
        assert!(internal.tags.native);
    }

    #[test]
    fn test_builtin_frames_are_native() {
        for text in [
            "at Array.forEach (<anonymous>)",
            "at new Promise (<anonymous>)",
            "at Module.require (native)",
            "forEach@[native code]",
        ] {
            assert!(classify(&RawFrame::new(0, text)).tags.native, "{}", text);
        }

        // eval code carries a real position
        let eval = classify(&RawFrame::new(0, "at eval (eval at run (x.js:1:1), <anonymous>:1:1)"));
        assert!(!eval.tags.native);
        let bare = classify(&RawFrame::new(0, "at <anonymous>:3:7"));
        assert!(!bare.tags.native);
    }

    #[test]
    fn test_alias_suffix_is_stripped() {
        let frame = classify(&RawFrame::new(0, "at Object.bound [as run] (/a/x.js:1:1)"));
        assert_eq!(frame.label, "Object.bound");
    }

    #[test]
    fn test_deterministic() {
        let raw = RawFrame::new(0, "at Klass.classMethod (/a/simple.js:16:29)");
        assert_eq!(classify(&raw), classify(&raw));
    }

    struct ArrowEverywhere;

    impl DeclarationLookup for ArrowEverywhere {
        fn lookup(&self, site: &Site) -> ScopeLookup<'_> {
            if site.line == Some(60) {
                ScopeLookup::TopLevel
            } else {
                ScopeLookup::Declared(DeclaredScope {
                    name: "arrowFn",
                    kind: InvocationKind::ArrowFunction,
                    resolved: false,
                })
            }
        }
    }

    #[test]
    fn test_lookup_overrides_text() {
        let raw = RawFrame::new(0, "at arrowFn (/a/simple.js:9:33)");
        let frame = classify_with(&raw, &ArrowEverywhere);
        assert_eq!(frame.kind, InvocationKind::ArrowFunction);
        assert_eq!(frame.label, "arrowFn");

        let anon = classify_with(&RawFrame::new(0, "at /a/simple.js:9:33"), &ArrowEverywhere);
        assert_eq!(anon.label, "arrowFn");

        let top = classify_with(&RawFrame::new(0, "at /a/simple.js:60:5"), &ArrowEverywhere);
        assert_eq!(top.kind, InvocationKind::AnonymousTop);
    }
}
