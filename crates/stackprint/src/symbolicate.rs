//! Source-map symbolication of frames thrown from minified code.
//!
//! A [`Symbolicator`] pairs the scopes of a minified file with its source map.
//! Scope names are translated token by token through the map's `names`, and
//! generated sites are mapped back to original files and lines.

use sourcemap::SourceMap;

use crate::classify::{DeclarationLookup, ScopeLookup};
use crate::error::SourceMapError;
use crate::frame::{Chain, Frame, Site};
use crate::scopes::{Declaration, NameComponent, ScopeIndex, extract_declarations};

/// Original name of the identifier a name component was read from.
fn original_name(map: &SourceMap, component: &NameComponent) -> Option<String> {
    let position = component.position()?;
    // source maps count from zero
    let line = position.line.checked_sub(1)?;
    let column = position.column.checked_sub(1)?;

    // closest token at or before the position
    let token = map.lookup_token(line, column)?;
    let exact = token.get_dst_line() == line && token.get_dst_col() >= column.saturating_sub(1);
    if !exact {
        return None;
    }
    token.get_name().map(str::to_string)
}

fn resolve_name(map: &SourceMap, decl: &Declaration) -> String {
    decl.rename(|component| original_name(map, component))
}

/// Translates a minified file's scope names and sites to its original sources.
pub struct Symbolicator {
    scopes: ScopeIndex,
    map: SourceMap,
}

impl Symbolicator {
    /// Extract the scopes of `minified` and decode its source map.
    pub fn new(file: &str, minified: &str, source_map: &[u8]) -> Result<Self, SourceMapError> {
        let map = SourceMap::from_slice(source_map).map_err(|source| SourceMapError::Decode {
            file: file.to_string(),
            source,
        })?;
        let scopes = extract_declarations(file, minified)?;
        Ok(Self::from_parts(scopes, map))
    }

    /// Pair already extracted scopes with a decoded map.
    pub fn from_parts(scopes: ScopeIndex, map: SourceMap) -> Self {
        let scopes = scopes
            .map_names(|decl| resolve_name(&map, decl))
            .into_resolved();
        tracing::debug!(
            file = scopes.file(),
            scopes = scopes.declarations().len(),
            "resolved minified scope names"
        );
        Self { scopes, map }
    }

    /// Scopes of the minified file, under their original names
    pub fn scopes(&self) -> &ScopeIndex {
        &self.scopes
    }

    /// Original position of a site inside the minified file.
    ///
    /// `None` for sites in other files, sites without a line, and positions
    /// the map has no token for on the same generated line.
    pub fn original_site(&self, site: &Site) -> Option<Site> {
        if !self.scopes.matches_file(site.file.as_deref()) {
            return None;
        }
        let line = site.line?.checked_sub(1)?;
        let column = site.column.unwrap_or(1).saturating_sub(1);

        let token = self.map.lookup_token(line, column)?;
        if token.get_dst_line() != line {
            return None;
        }
        Some(Site {
            file: token.get_source().map(str::to_string),
            line: Some(token.get_src_line() + 1),
            column: site.column.map(|_| token.get_src_col() + 1),
        })
    }

    /// Move a classified frame's site to the original source.
    pub fn symbolicate(&self, frame: Frame) -> Frame {
        if frame.tags.native {
            return frame;
        }
        match self.original_site(&frame.site) {
            Some(site) => Frame { site, ..frame },
            None => frame,
        }
    }

    /// Symbolicate every frame of a chain.
    pub fn symbolicate_chain(&self, chain: Chain<Frame>) -> Chain<Frame> {
        chain.map(|frame| self.symbolicate(frame))
    }
}

impl DeclarationLookup for Symbolicator {
    fn lookup(&self, site: &Site) -> ScopeLookup<'_> {
        self.scopes.lookup(site)
    }
}
