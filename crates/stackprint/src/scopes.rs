//! Declaration metadata extracted from JavaScript source.
//!
//! Every function scope in a file is recorded with an inferred name, its
//! invocation kind and its source range. A [`ScopeIndex`] answers "which
//! function contains this position", which lets the classifier separate kinds
//! that look identical in trace text.
//!
//! Names keep the source position of every identifier they were built from,
//! so a source map can later translate a minified name piece by piece.

use serde::Serialize;
use std::fmt;

use swc_common::{BytePos, FileName, SourceMap, Span, sync::Lrc};
use swc_ecma_ast::{
    ArrowExpr, AssignExpr, AssignTarget, Class, ClassDecl, ClassExpr, ClassMember, EsVersion,
    Expr, FnDecl, FnExpr, MemberExpr, MemberProp, MethodKind, ObjectLit, Pat, Prop, PropName,
    PropOrSpread, SimpleAssignTarget, VarDeclarator,
};
use swc_ecma_parser::{EsSyntax, Parser, StringInput, Syntax, lexer::Lexer};
use swc_ecma_visit::{Visit, VisitWith};

use crate::classify::{DeclarationLookup, DeclaredScope, ScopeLookup};
use crate::error::ScopeError;
use crate::frame::{ANONYMOUS_LABEL, InvocationKind, Site};

/// 1-based line / column position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl Position {
    /// Create a position
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// One piece of an inferred name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameComponent {
    text: String,
    position: Option<Position>,
}

impl NameComponent {
    /// Source text of the piece
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Position of the identifier token the piece was taken from. `None` for
    /// punctuation and synthesized text such as `new ` or `<computed>`.
    pub fn position(&self) -> Option<Position> {
        self.position
    }
}

/// An inferred name, as a sequence of identifier tokens and literal text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeName {
    components: Vec<NameComponent>,
}

impl ScopeName {
    fn literal(text: impl Into<String>) -> Self {
        Self {
            components: vec![NameComponent {
                text: text.into(),
                position: None,
            }],
        }
    }

    fn token(text: &str, position: Position) -> Self {
        Self {
            components: vec![NameComponent {
                text: text.to_string(),
                position: Some(position),
            }],
        }
    }

    fn append(mut self, other: ScopeName) -> Self {
        self.components
            .extend(other.components.into_iter().filter(|c| !c.text.is_empty()));
        self
    }

    /// `self.other`
    fn dotted(self, other: ScopeName) -> Self {
        self.append(ScopeName::literal(".")).append(other)
    }

    /// `obj.key` with the last segment replaced by a function's own name.
    fn rename_last(mut self, ident: ScopeName) -> Self {
        match self.components.iter().rposition(|c| c.position.is_none() && c.text == ".") {
            Some(dot) => {
                self.components.truncate(dot + 1);
                self.append(ident)
            }
            None => ident,
        }
    }

    /// The pieces of the name, in order
    pub fn components(&self) -> impl Iterator<Item = &NameComponent> + '_ {
        self.components.iter()
    }
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in &self.components {
            f.write_str(&component.text)?;
        }
        Ok(())
    }
}

/// One function scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Declaration {
    /// Inferred name, e.g. `Klass.prototype.prototypeMethod` or `new Klass`
    pub name: String,
    /// Pieces `name` was built from
    #[serde(skip)]
    pub components: Vec<NameComponent>,
    /// How the function was declared
    pub kind: InvocationKind,
    /// First position of the scope
    pub start: Position,
    /// Position just past the scope
    pub end: Position,
    /// Length in bytes, used to pick the innermost of nested scopes
    pub len: u32,
}

impl Declaration {
    /// Rebuild the name from `components`, letting `map` replace the
    /// identifier tokens it can translate.
    pub fn rename<F>(&self, mut map: F) -> String
    where
        F: FnMut(&NameComponent) -> Option<String>,
    {
        if self.components.is_empty() {
            return self.name.clone();
        }
        self.components
            .iter()
            .map(|c| match c.position {
                Some(_) => map(c).unwrap_or_else(|| c.text.clone()),
                None => c.text.clone(),
            })
            .collect()
    }

    fn covers(&self, line: u32, column: Option<u32>) -> bool {
        match column {
            Some(column) => {
                let pos = Position::new(line, column);
                self.start <= pos && pos <= self.end
            }
            None => self.start.line <= line && line <= self.end.line,
        }
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{} {} [{}]",
            self.start.line, self.start.column, self.end.line, self.end.column, self.name, self.kind
        )
    }
}

/// Declarations of one file, indexed for position lookup
#[derive(Debug, Clone)]
pub struct ScopeIndex {
    file: String,
    line_count: u32,
    declarations: Vec<Declaration>,
    resolved: bool,
}

impl ScopeIndex {
    /// Build an index from already extracted declarations.
    pub fn new(
        file: impl Into<String>,
        line_count: u32,
        mut declarations: Vec<Declaration>,
    ) -> Self {
        declarations.sort_by_key(|d| (d.start, std::cmp::Reverse(d.len)));
        Self {
            file: file.into(),
            line_count,
            declarations,
            resolved: false,
        }
    }

    /// Mark the names as translated back to the original source, so they
    /// replace the labels of frames that fall inside them.
    pub fn into_resolved(mut self) -> Self {
        self.resolved = true;
        self
    }

    /// Replace every declaration's name.
    pub fn map_names<F>(mut self, mut rename: F) -> Self
    where
        F: FnMut(&Declaration) -> String,
    {
        for decl in &mut self.declarations {
            decl.name = rename(decl);
        }
        self
    }

    /// The file this index describes
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Declarations ordered by start position
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Innermost declaration containing the position. Without a column, the
    /// innermost declaration whose lines include `line`.
    pub fn innermost(&self, line: u32, column: Option<u32>) -> Option<&Declaration> {
        self.declarations
            .iter()
            .filter(|d| d.covers(line, column))
            .min_by_key(|d| d.len)
    }

    /// Whether `file` (a path or URL from a trace) refers to this index's file.
    pub fn matches_file(&self, file: Option<&str>) -> bool {
        match file {
            None => true,
            Some(file) => self.file.is_empty() || file.ends_with(&self.file),
        }
    }
}

impl DeclarationLookup for ScopeIndex {
    fn lookup(&self, site: &Site) -> ScopeLookup<'_> {
        let Some(line) = site.line else {
            return ScopeLookup::Unknown;
        };
        if !self.matches_file(site.file.as_deref()) || line > self.line_count {
            return ScopeLookup::Unknown;
        }
        match self.innermost(line, site.column) {
            Some(decl) => ScopeLookup::Declared(DeclaredScope {
                name: &decl.name,
                kind: decl.kind,
                resolved: self.resolved,
            }),
            None => ScopeLookup::TopLevel,
        }
    }
}

impl DeclarationLookup for [ScopeIndex] {
    fn lookup(&self, site: &Site) -> ScopeLookup<'_> {
        self.iter()
            .map(|index| index.lookup(site))
            .find(|result| *result != ScopeLookup::Unknown)
            .unwrap_or(ScopeLookup::Unknown)
    }
}

fn unparen(mut expr: &Expr) -> &Expr {
    while let Expr::Paren(paren) = expr {
        expr = &paren.expr;
    }
    expr
}

fn accessor_prefix(kind: MethodKind) -> &'static str {
    match kind {
        MethodKind::Getter => "get ",
        MethodKind::Setter => "set ",
        MethodKind::Method => "",
    }
}

struct ScopeCollector<'a> {
    cm: &'a SourceMap,
    declarations: Vec<Declaration>,
}

impl ScopeCollector<'_> {
    fn position(&self, pos: BytePos) -> Position {
        let loc = self.cm.lookup_char_pos(pos);
        Position::new(loc.line as u32, loc.col.0 as u32 + 1)
    }

    fn token(&self, sym: &str, span: Span) -> ScopeName {
        ScopeName::token(sym, self.position(span.lo))
    }

    fn record(&mut self, name: ScopeName, kind: InvocationKind, span: Span) {
        let start = self.position(span.lo);
        let end = self.position(span.hi);
        self.declarations.push(Declaration {
            name: name.to_string(),
            components: name.components,
            kind,
            start,
            end,
            len: span.hi.0.saturating_sub(span.lo.0),
        });
    }

    fn prop_name(&self, key: &PropName) -> ScopeName {
        match key {
            PropName::Ident(ident) => self.token(&ident.sym, ident.span),
            // Str.value is Wtf8Atom, as_str() returns Option<&str>
            PropName::Str(s) => {
                ScopeName::literal(format!("<{:?}>", s.value.as_str().unwrap_or_default()))
            }
            PropName::Num(n) => ScopeName::literal(format!("<{}>", n.value)),
            PropName::BigInt(b) => ScopeName::literal(format!("<{}n>", b.value)),
            PropName::Computed(_) => ScopeName::literal("<computed>"),
        }
    }

    fn expr_path(&self, expr: &Expr) -> Option<ScopeName> {
        match expr {
            Expr::Ident(ident) => Some(self.token(&ident.sym, ident.span)),
            Expr::This(_) => Some(ScopeName::literal("this")),
            Expr::Member(member) => self.member_path(member),
            Expr::Paren(paren) => self.expr_path(&paren.expr),
            _ => None,
        }
    }

    fn member_path(&self, member: &MemberExpr) -> Option<ScopeName> {
        let object = self.expr_path(&member.obj)?;
        let prop = match &member.prop {
            MemberProp::Ident(ident) => self.token(&ident.sym, ident.span),
            MemberProp::PrivateName(private) => ScopeName::literal(format!("#{}", private.name)),
            MemberProp::Computed(_) => ScopeName::literal("<computed>"),
        };
        Some(object.dotted(prop))
    }

    fn qualify(&self, name: Option<&ScopeName>, key: &PropName) -> ScopeName {
        match name {
            Some(name) => name.clone().dotted(self.prop_name(key)),
            None => self.prop_name(key),
        }
    }

    /// A function-like value bound to `name` by a declarator, assignment or property.
    fn visit_named_value(&mut self, name: ScopeName, expr: &Expr, prototype: bool) {
        match unparen(expr) {
            Expr::Fn(fn_expr) => {
                let (name, kind) = match &fn_expr.ident {
                    _ if prototype => (name, InvocationKind::PrototypeAssignedMethod),
                    Some(ident) => (
                        name.rename_last(self.token(&ident.sym, ident.span)),
                        InvocationKind::FunctionExpressionNamed,
                    ),
                    None => (name, InvocationKind::FunctionExpressionAnon),
                };
                self.record(name, kind, fn_expr.function.span);
                fn_expr.function.visit_with(self);
            }
            Expr::Arrow(arrow) => {
                let kind = if prototype {
                    InvocationKind::PrototypeAssignedMethod
                } else {
                    InvocationKind::ArrowFunction
                };
                self.record(name, kind, arrow.span);
                arrow.visit_children_with(self);
            }
            Expr::Class(class_expr) => {
                let class_name = match &class_expr.ident {
                    Some(ident) => self.token(&ident.sym, ident.span),
                    None => name,
                };
                self.collect_class(&class_name, &class_expr.class);
            }
            Expr::Object(object) => self.collect_object(Some(&name), object),
            other => other.visit_with(self),
        }
    }

    fn collect_class(&mut self, name: &ScopeName, class: &Class) {
        let constructor = ScopeName::literal("new ").append(name.clone());
        // Field initializers run as part of construction, so the whole body
        // counts as the constructor scope.
        self.record(constructor.clone(), InvocationKind::Constructor, class.span);
        if let Some(super_class) = &class.super_class {
            super_class.visit_with(self);
        }

        for member in &class.body {
            match member {
                ClassMember::Constructor(ctor) => {
                    self.record(constructor.clone(), InvocationKind::Constructor, ctor.span);
                    ctor.visit_children_with(self);
                }
                ClassMember::Method(method) => {
                    let kind = if method.is_static {
                        InvocationKind::ClassStaticMethod
                    } else {
                        InvocationKind::ClassInstanceMethod
                    };
                    let qualified = ScopeName::literal(accessor_prefix(method.kind))
                        .append(name.clone())
                        .dotted(self.prop_name(&method.key));
                    self.record(qualified, kind, method.span);
                    method.function.visit_with(self);
                }
                ClassMember::PrivateMethod(method) => {
                    let qualified = ScopeName::literal(accessor_prefix(method.kind))
                        .append(name.clone())
                        .dotted(ScopeName::literal(format!("#{}", method.key.name)));
                    self.record(qualified, InvocationKind::ClassPrivateMethod, method.span);
                    method.function.visit_with(self);
                }
                ClassMember::ClassProp(prop) => {
                    if let Some(value) = &prop.value {
                        let qualified = name.clone().dotted(self.prop_name(&prop.key));
                        self.visit_named_value(qualified, value, false);
                    }
                }
                other => other.visit_with(self),
            }
        }
    }

    fn collect_object(&mut self, name: Option<&ScopeName>, object: &ObjectLit) {
        for prop in &object.props {
            let PropOrSpread::Prop(prop) = prop else {
                prop.visit_with(self);
                continue;
            };
            match &**prop {
                Prop::Method(method) => {
                    let qualified = self.qualify(name, &method.key);
                    self.record(
                        qualified,
                        InvocationKind::ObjectLiteralMethod,
                        method.function.span,
                    );
                    method.function.visit_with(self);
                }
                Prop::KeyValue(kv) => {
                    let qualified = self.qualify(name, &kv.key);
                    self.visit_named_value(qualified, &kv.value, false)
                }
                Prop::Getter(getter) => {
                    let qualified =
                        ScopeName::literal("get ").append(self.qualify(name, &getter.key));
                    self.record(qualified, InvocationKind::ObjectLiteralMethod, getter.span);
                    getter.body.visit_with(self);
                }
                Prop::Setter(setter) => {
                    let qualified =
                        ScopeName::literal("set ").append(self.qualify(name, &setter.key));
                    self.record(qualified, InvocationKind::ObjectLiteralMethod, setter.span);
                    setter.body.visit_with(self);
                }
                other => other.visit_with(self),
            }
        }
    }
}

impl Visit for ScopeCollector<'_> {
    fn visit_fn_decl(&mut self, node: &FnDecl) {
        let name = self.token(&node.ident.sym, node.ident.span);
        self.record(name, InvocationKind::FunctionDeclaration, node.function.span);
        node.function.visit_with(self);
    }

    fn visit_fn_expr(&mut self, node: &FnExpr) {
        let (name, kind) = match &node.ident {
            Some(ident) => (
                self.token(&ident.sym, ident.span),
                InvocationKind::FunctionExpressionNamed,
            ),
            None => (
                ScopeName::literal(ANONYMOUS_LABEL),
                InvocationKind::FunctionExpressionAnon,
            ),
        };
        self.record(name, kind, node.function.span);
        node.function.visit_with(self);
    }

    fn visit_arrow_expr(&mut self, node: &ArrowExpr) {
        self.record(
            ScopeName::literal(ANONYMOUS_LABEL),
            InvocationKind::ArrowFunction,
            node.span,
        );
        node.visit_children_with(self);
    }

    fn visit_class_decl(&mut self, node: &ClassDecl) {
        let name = self.token(&node.ident.sym, node.ident.span);
        self.collect_class(&name, &node.class);
    }

    fn visit_class_expr(&mut self, node: &ClassExpr) {
        let name = match &node.ident {
            Some(ident) => self.token(&ident.sym, ident.span),
            None => ScopeName::literal(ANONYMOUS_LABEL),
        };
        self.collect_class(&name, &node.class);
    }

    fn visit_object_lit(&mut self, node: &ObjectLit) {
        self.collect_object(None, node);
    }

    fn visit_var_declarator(&mut self, node: &VarDeclarator) {
        match (&node.name, &node.init) {
            (Pat::Ident(binding), Some(init)) => {
                let name = self.token(&binding.id.sym, binding.id.span);
                self.visit_named_value(name, init, false)
            }
            _ => node.visit_children_with(self),
        }
    }

    fn visit_assign_expr(&mut self, node: &AssignExpr) {
        let target = match &node.left {
            AssignTarget::Simple(SimpleAssignTarget::Ident(binding)) => {
                Some(self.token(&binding.id.sym, binding.id.span))
            }
            AssignTarget::Simple(SimpleAssignTarget::Member(member)) => self.member_path(member),
            _ => None,
        };
        match target {
            Some(path) => {
                let prototype = path.to_string().contains(".prototype.");
                self.visit_named_value(path, &node.right, prototype);
            }
            None => node.visit_children_with(self),
        }
    }
}

/// Extract every function scope declared in `src`.
///
/// `file` names the source the way traces refer to it; a trace site matches
/// the index when its file ends with `file`.
pub fn extract_declarations(file: &str, src: &str) -> Result<ScopeIndex, ScopeError> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(Lrc::new(FileName::Anon), src.to_string());

    let lexer = Lexer::new(
        Syntax::Es(EsSyntax::default()),
        EsVersion::Es2022,
        StringInput::from(&*fm),
        None,
    );
    let mut parser = Parser::new_from(lexer);

    let program = parser.parse_program().map_err(|e| ScopeError::Syntax {
        file: file.to_string(),
        message: format!("{:?}", e.kind()),
    })?;

    let recovered = parser.take_errors();
    if !recovered.is_empty() {
        tracing::debug!(file, errors = recovered.len(), "recovered from syntax errors");
    }

    let mut collector = ScopeCollector {
        cm: &cm,
        declarations: Vec::new(),
    };
    program.visit_with(&mut collector);

    tracing::debug!(file, scopes = collector.declarations.len(), "extracted scopes");

    let line_count = src.lines().count() as u32;
    Ok(ScopeIndex::new(file, line_count, collector.declarations))
}
