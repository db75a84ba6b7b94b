//! # Stackprint
//!
//! Stack-trace capture and cross-engine normalization for JavaScript call
//! chains.
//!
//! A raw `error.stack` string goes through four stages:
//!
//! - [`parser`]: trace text to ordered frame lines
//! - [`classify`]: frame line to a [`Frame`] with an [`InvocationKind`]
//! - [`normalize`]: frames to an engine-independent [`NormalizedChain`]
//! - [`compare`]: two chains to a [`ComparisonResult`]
//!
//! The [`harness`] drives declared call-chain topologies ([`registry`],
//! [`topology`]) in the trace dialects of the major engines ([`engine`]) and
//! checks that what was captured matches what was declared. [`scopes`]
//! extracts declaration metadata from JavaScript source so classification
//! can tell apart kinds that look identical in trace text, and
//! [`symbolicate`] translates frames thrown from minified code back to their
//! original names and sites through a source map.

#![warn(clippy::all)]

pub mod classify;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod harness;
pub mod normalize;
pub mod parser;
pub mod registry;
pub mod report;
pub mod scopes;
pub mod symbolicate;
pub mod topology;

pub use classify::{DeclarationLookup, classify, classify_chain, classify_with};
pub use compare::{ComparisonResult, DivergenceReason, compare};
pub use config::{StackTraceLimit, StackprintConfig};
pub use engine::EngineDialect;
pub use error::{ConfigError, HarnessFault, RegistryError, ScopeError, SourceMapError};
pub use frame::{Chain, Frame, FrameTags, InvocationKind, RawFrame, Site};
pub use harness::{Captured, Harness, Scenario, ScenarioOutcome, ScenarioResult};
pub use normalize::{ChainEntry, Normalize, NormalizedChain, NormalizedFrame, normalize};
pub use parser::{RawTrace, parse};
pub use registry::{FunctionDecl, Registry};
pub use report::HarnessReport;
pub use scopes::{ScopeIndex, extract_declarations};
pub use symbolicate::Symbolicator;

/// Parse, classify and normalize a raw trace in one step.
///
/// Returns `None` when the text holds no frame lines.
pub fn normalize_trace(
    raw: &str,
    lookup: Option<&dyn DeclarationLookup>,
    config: &StackprintConfig,
) -> Option<NormalizedChain> {
    let chain = parse(raw).into_chain()?;
    Some(classify_chain(&chain, lookup).normalize(config))
}

/// Like [`normalize_trace`], for a trace thrown from minified code. Frames in
/// the symbolicator's file get their original names and sites before
/// normalization.
pub fn normalize_minified_trace(
    raw: &str,
    symbolicator: &Symbolicator,
    config: &StackprintConfig,
) -> Option<NormalizedChain> {
    let chain = parse(raw).into_chain()?;
    let frames = classify_chain(&chain, Some(symbolicator as &dyn DeclarationLookup));
    Some(symbolicator.symbolicate_chain(frames).normalize(config))
}
