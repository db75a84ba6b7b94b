//! Frozen function registry and shadow-stack execution.
//!
//! A topology is declared up front: each function has declaration metadata
//! and a one-step body (call another function, throw, return, or never
//! settle). [`RegistryBuilder::build`] validates the wiring and freezes it.
//! Invoking an entry point walks the bodies while keeping a shadow stack of
//! active frames; the throw renders that stack in an engine's dialect.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::classify::{DeclarationLookup, DeclaredScope, ScopeLookup};
use crate::config::stack_trace_limit;
use crate::engine::{ActiveFrame, EngineDialect};
use crate::error::RegistryError;
use crate::frame::{FrameTags, InvocationKind, Site};

/// Calls deeper than this overflow the shadow stack.
pub const MAX_CALL_DEPTH: usize = 1000;

/// Class or object literal a function belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    /// Member of (or constructor for) a class
    Class(String),
    /// Property of an object literal
    Object(String),
}

impl Owner {
    /// Class or object name
    pub fn name(&self) -> &str {
        match self {
            Owner::Class(name) | Owner::Object(name) => name,
        }
    }
}

/// What a function does when invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Call `callee` from `line:column`
    Call {
        callee: String,
        line: u32,
        column: u32,
    },
    /// `throw new Error(message)` at `line:column`
    Throw {
        message: String,
        line: u32,
        column: u32,
    },
    /// Return normally
    Return,
    /// Await something that never resolves (async functions only)
    Pending,
}

/// Declaration metadata plus body of one registered function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    /// The function's own name (`namedFnExpr`, `#privateMethod`, `Klass` for constructors)
    pub name: String,
    /// Name callers use when it differs from the qualified label
    pub binding: Option<String>,
    /// Enclosing class or object literal
    pub owner: Option<Owner>,
    /// Declaration shape
    pub kind: InvocationKind,
    /// `async` function
    pub is_async: bool,
    /// File or URL the function is declared in
    pub file: String,
    /// Behaviour when invoked
    pub body: Body,
}

impl FunctionDecl {
    /// A function that returns normally; chain the builders below to shape it.
    pub fn new(name: impl Into<String>, kind: InvocationKind, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: None,
            owner: None,
            kind,
            is_async: false,
            file: file.into(),
            body: Body::Return,
        }
    }

    pub fn owned_by(mut self, owner: Owner) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn bound_as(mut self, binding: impl Into<String>) -> Self {
        self.binding = Some(binding.into());
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn calls(mut self, callee: impl Into<String>, line: u32, column: u32) -> Self {
        self.body = Body::Call {
            callee: callee.into(),
            line,
            column,
        };
        self
    }

    pub fn throws(mut self, message: impl Into<String>, line: u32, column: u32) -> Self {
        self.body = Body::Throw {
            message: message.into(),
            line,
            column,
        };
        self
    }

    pub fn never_settles(mut self) -> Self {
        self.body = Body::Pending;
        self
    }

    /// Qualified name as static analysis infers it, e.g.
    /// `Klass.prototype.prototypeMethod` or `new Klass`.
    pub fn label(&self) -> String {
        match (&self.owner, self.kind) {
            (Some(owner), InvocationKind::Constructor) => format!("new {}", owner.name()),
            (None, InvocationKind::Constructor) => format!("new {}", self.name),
            (Some(Owner::Class(class)), InvocationKind::PrototypeAssignedMethod) => {
                format!("{}.prototype.{}", class, self.name)
            }
            (Some(owner), _) => format!("{}.{}", owner.name(), self.name),
            (None, _) => self.name.clone(),
        }
    }

    /// Name the function is registered and called under.
    pub fn key(&self) -> String {
        self.binding.clone().unwrap_or_else(|| self.label())
    }

    /// Where this function's active frame points: the call or throw in its body.
    pub fn site(&self) -> Site {
        match &self.body {
            Body::Call { line, column, .. } | Body::Throw { line, column, .. } => {
                Site::new(self.file.clone(), *line, *column)
            }
            Body::Return | Body::Pending => Site {
                file: Some(self.file.clone()),
                line: None,
                column: None,
            },
        }
    }

    /// Tags implied by the declaration.
    pub fn tags(&self) -> FrameTags {
        FrameTags {
            private: self.kind == InvocationKind::ClassPrivateMethod,
            is_static: self.kind == InvocationKind::ClassStaticMethod,
            construct: self.kind == InvocationKind::Constructor,
            native: false,
        }
    }

    /// Whether this function suspends before its call when run asynchronously.
    pub fn suspends(&self) -> bool {
        self.is_async && matches!(self.body, Body::Call { .. })
    }
}

/// Collects declarations before freezing them into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    functions: Vec<FunctionDecl>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function
    pub fn register(mut self, decl: FunctionDecl) -> Self {
        self.functions.push(decl);
        self
    }

    /// Validate names and callees, then freeze.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut by_key = HashMap::with_capacity(self.functions.len());
        for (idx, decl) in self.functions.iter().enumerate() {
            let key = decl.key();
            if by_key.insert(key.clone(), idx).is_some() {
                return Err(RegistryError::Duplicate(key));
            }
        }

        for decl in &self.functions {
            if let Body::Call { callee, .. } = &decl.body
                && !by_key.contains_key(callee)
            {
                return Err(RegistryError::UndeclaredCallee {
                    caller: decl.key(),
                    callee: callee.clone(),
                });
            }
        }

        tracing::debug!(functions = self.functions.len(), "registry frozen");
        Ok(Registry {
            functions: self.functions,
            by_key,
        })
    }
}

/// Error value produced by a throwing scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thrown {
    /// Constructor name (`Error`, `RangeError`, ...)
    pub name: &'static str,
    /// Error message
    pub message: String,
    /// Trace text as the dialect renders it
    pub stack: String,
}

/// Immutable name-to-function table.
#[derive(Debug, Clone)]
pub struct Registry {
    functions: Vec<FunctionDecl>,
    by_key: HashMap<String, usize>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up a function by the name callers use.
    pub fn get(&self, key: &str) -> Option<&FunctionDecl> {
        self.by_key.get(key).map(|&idx| &self.functions[idx])
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered functions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.functions.iter()
    }

    /// Functions active when the chain starting at `entry` stops, outermost
    /// first. Bounded by [`MAX_CALL_DEPTH`].
    pub fn call_path(&self, entry: &str) -> Result<Vec<&FunctionDecl>, RegistryError> {
        let mut decl = self
            .get(entry)
            .ok_or_else(|| RegistryError::UnknownEntry(entry.to_string()))?;
        let mut path = vec![decl];
        while let Body::Call { callee, .. } = &decl.body {
            if path.len() == MAX_CALL_DEPTH {
                break;
            }
            // build() guarantees every callee exists
            let Some(next) = self.get(callee) else { break };
            decl = next;
            path.push(decl);
        }
        Ok(path)
    }

    /// Run `entry` to completion without suspending.
    pub fn invoke(&self, entry: &str, dialect: EngineDialect) -> Result<(), Thrown> {
        Execution::new(self, dialect).call(entry)
    }

    /// Run `entry`, suspending every async caller before it calls on.
    pub async fn invoke_async(&self, entry: &str, dialect: EngineDialect) -> Result<(), Thrown> {
        let mut execution = Execution::new(self, dialect);
        execution.call_async(entry).await
    }
}

impl DeclarationLookup for Registry {
    /// Matches the function whose call or throw sits on the site's line.
    fn lookup(&self, site: &Site) -> ScopeLookup<'_> {
        let Some(line) = site.line else {
            return ScopeLookup::Unknown;
        };
        let found = self.functions.iter().find(|decl| {
            let same_file = site
                .file
                .as_deref()
                .is_none_or(|file| file.ends_with(decl.file.as_str()));
            same_file && decl.site().line == Some(line)
        });
        match found {
            Some(decl) => ScopeLookup::Declared(DeclaredScope {
                name: &decl.name,
                kind: decl.kind,
                resolved: false,
            }),
            None => ScopeLookup::Unknown,
        }
    }
}

type CallFuture<'s> = Pin<Box<dyn Future<Output = Result<(), Thrown>> + 's>>;

struct Execution<'r> {
    registry: &'r Registry,
    dialect: EngineDialect,
    /// Outermost first
    stack: Vec<ActiveFrame<'r>>,
}

impl<'r> Execution<'r> {
    fn new(registry: &'r Registry, dialect: EngineDialect) -> Self {
        Self {
            registry,
            dialect,
            stack: Vec::new(),
        }
    }

    fn throw(&self, name: &'static str, message: String) -> Thrown {
        let frames: Vec<ActiveFrame<'r>> = self.stack.iter().rev().cloned().collect();
        let stack = self
            .dialect
            .render(name, &message, &frames, stack_trace_limit());
        tracing::debug!(error = name, depth = frames.len(), engine = %self.dialect, "thrown");
        Thrown {
            name,
            message,
            stack,
        }
    }

    /// Resolve `key` and push its frame, or throw.
    fn enter(&mut self, key: &str) -> Result<&'r FunctionDecl, Thrown> {
        let registry: &'r Registry = self.registry;
        let Some(decl) = registry.get(key) else {
            return Err(self.throw("ReferenceError", format!("{} is not defined", key)));
        };
        if self.stack.len() >= MAX_CALL_DEPTH {
            return Err(self.throw("RangeError", "Maximum call stack size exceeded".to_string()));
        }
        self.stack.push(ActiveFrame::new(decl));
        Ok(decl)
    }

    fn call(&mut self, key: &str) -> Result<(), Thrown> {
        let decl = self.enter(key)?;
        let result = match &decl.body {
            Body::Call { callee, .. } => self.call(callee),
            Body::Throw { message, .. } => Err(self.throw("Error", message.clone())),
            // a synchronous caller cannot wait on anything
            Body::Return | Body::Pending => Ok(()),
        };
        self.stack.pop();
        result
    }

    fn call_async<'s>(&'s mut self, key: &'s str) -> CallFuture<'s> {
        Box::pin(async move {
            let decl = self.enter(key)?;
            let result = match &decl.body {
                Body::Call { callee, .. } => {
                    if decl.is_async {
                        tokio::task::yield_now().await;
                        if let Some(frame) = self.stack.last_mut() {
                            frame.resumed = true;
                        }
                    }
                    self.call_async(callee).await
                }
                Body::Throw { message, .. } => Err(self.throw("Error", message.clone())),
                Body::Return => Ok(()),
                Body::Pending => {
                    if decl.is_async {
                        std::future::pending::<()>().await;
                    }
                    Ok(())
                }
            };
            self.stack.pop();
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = "/app/chain.js";

    fn chain_registry() -> Registry {
        Registry::builder()
            .register(
                FunctionDecl::new("outer", InvocationKind::FunctionDeclaration, FILE)
                    .calls("Box.open", 2, 5),
            )
            .register(
                FunctionDecl::new("open", InvocationKind::ClassStaticMethod, FILE)
                    .owned_by(Owner::Class("Box".into()))
                    .calls("inner", 6, 9),
            )
            .register(
                FunctionDecl::new("inner", InvocationKind::ArrowFunction, FILE)
                    .throws("boom", 9, 11),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_labels_and_keys() {
        let ctor = FunctionDecl::new("Klass", InvocationKind::Constructor, FILE)
            .owned_by(Owner::Class("Klass".into()));
        assert_eq!(ctor.label(), "new Klass");

        let proto = FunctionDecl::new("m", InvocationKind::PrototypeAssignedMethod, FILE)
            .owned_by(Owner::Class("Klass".into()));
        assert_eq!(proto.label(), "Klass.prototype.m");

        let named = FunctionDecl::new("namedFnExpr", InvocationKind::FunctionExpressionNamed, FILE)
            .bound_as("beepBoop");
        assert_eq!(named.label(), "namedFnExpr");
        assert_eq!(named.key(), "beepBoop");
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let err = Registry::builder()
            .register(FunctionDecl::new("a", InvocationKind::FunctionDeclaration, FILE))
            .register(FunctionDecl::new("a", InvocationKind::ArrowFunction, FILE))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("a".into()));
    }

    #[test]
    fn test_build_rejects_undeclared_callee() {
        let err = Registry::builder()
            .register(
                FunctionDecl::new("a", InvocationKind::FunctionDeclaration, FILE).calls("b", 1, 1),
            )
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::UndeclaredCallee {
                caller: "a".into(),
                callee: "b".into()
            }
        );
    }

    #[test]
    fn test_call_path() {
        let registry = chain_registry();
        let path: Vec<_> = registry.call_path("outer").unwrap().iter().map(|d| d.key()).collect();
        assert_eq!(path, ["outer", "Box.open", "inner"]);
        assert_eq!(
            registry.call_path("missing").unwrap_err(),
            RegistryError::UnknownEntry("missing".into())
        );
    }

    #[test]
    fn test_invoke_throws_with_shadow_stack() {
        let registry = chain_registry();
        let thrown = registry.invoke("outer", EngineDialect::V8).unwrap_err();
        assert_eq!(thrown.name, "Error");
        assert_eq!(thrown.message, "boom");
        let lines: Vec<_> = thrown.stack.lines().collect();
        assert_eq!(lines[0], "Error: boom");
        assert_eq!(lines[1], "    at inner (/app/chain.js:9:11)");
        assert_eq!(lines[2], "    at Function.open (/app/chain.js:6:9)");
        assert_eq!(lines[3], "    at outer (/app/chain.js:2:5)");
    }

    #[test]
    fn test_unknown_entry_is_reference_error() {
        let thrown = chain_registry().invoke("nope", EngineDialect::V8).unwrap_err();
        assert_eq!(thrown.name, "ReferenceError");
        assert_eq!(thrown.stack, "ReferenceError: nope is not defined");
    }

    #[test]
    fn test_recursion_overflows() {
        let registry = Registry::builder()
            .register(
                FunctionDecl::new("again", InvocationKind::FunctionDeclaration, FILE)
                    .calls("again", 1, 20),
            )
            .build()
            .unwrap();
        let thrown = registry.invoke("again", EngineDialect::SpiderMonkey).unwrap_err();
        assert_eq!(thrown.name, "RangeError");
        assert_eq!(registry.call_path("again").unwrap().len(), MAX_CALL_DEPTH);
    }

    #[test]
    fn test_returning_entry_does_not_throw() {
        let registry = Registry::builder()
            .register(FunctionDecl::new("quiet", InvocationKind::FunctionDeclaration, FILE))
            .build()
            .unwrap();
        assert!(registry.invoke("quiet", EngineDialect::V8).is_ok());
    }

    #[tokio::test]
    async fn test_async_callers_become_continuations() {
        let registry = Registry::builder()
            .register(
                FunctionDecl::new("first", InvocationKind::FunctionDeclaration, FILE)
                    .asynchronous()
                    .calls("second", 1, 30),
            )
            .register(
                FunctionDecl::new("second", InvocationKind::ArrowFunction, FILE)
                    .asynchronous()
                    .throws("late", 2, 40),
            )
            .build()
            .unwrap();

        let thrown = registry.invoke_async("first", EngineDialect::V8).await.unwrap_err();
        assert!(thrown.stack.contains("    at second (/app/chain.js:2:40)"));
        assert!(thrown.stack.contains("    at async first (/app/chain.js:1:30)"));

        let firefox = registry
            .invoke_async("first", EngineDialect::SpiderMonkey)
            .await
            .unwrap_err();
        assert_eq!(firefox.stack, "second@/app/chain.js:2:40\nasync*first@/app/chain.js:1:30\n");
    }

    #[test]
    fn test_lookup_by_site_line() {
        let registry = chain_registry();
        let hit = registry.lookup(&Site::new("file:///app/chain.js", 6, 1));
        assert_eq!(
            hit,
            ScopeLookup::Declared(DeclaredScope {
                name: "open",
                kind: InvocationKind::ClassStaticMethod,
                resolved: false,
            })
        );
        assert_eq!(registry.lookup(&Site::new("/app/chain.js", 7, 1)), ScopeLookup::Unknown);
        assert_eq!(registry.lookup(&Site::new("/other.js", 6, 1)), ScopeLookup::Unknown);
    }
}
