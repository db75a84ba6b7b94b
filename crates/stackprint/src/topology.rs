//! Built-in topologies: the sync and async call chains of `fixtures/simple.js`.
//!
//! Every registered site is the position of the call (or `new Error`) inside
//! the corresponding function of the fixture, so the fixture's scope index and
//! the registry agree on which function a captured frame belongs to.

use crate::error::{RegistryError, ScopeError};
use crate::frame::InvocationKind::{self, *};
use crate::harness::Scenario;
use crate::registry::{FunctionDecl, Owner, Registry};
use crate::scopes::{ScopeIndex, extract_declarations};

/// Source of the reference fixture
pub const SIMPLE_JS: &str = include_str!("../fixtures/simple.js");

/// File name traces and the scope index refer to
pub const SIMPLE_JS_FILE: &str = "simple.js";

/// Where the fixture is served from in recorded browser traces
pub const SIMPLE_JS_URL: &str = "http://127.0.0.1:8080/simple.js";

pub const SYNC_ENTRY: &str = "namedFn";
pub const ASYNC_ENTRY: &str = "asyncNamedFn";

/// Kinds along the sync chain, outermost first.
pub const SYNC_KINDS: [InvocationKind; 12] = [
    FunctionDeclaration,
    FunctionExpressionNamed,
    FunctionExpressionAnon,
    ArrowFunction,
    ClassStaticMethod,
    Constructor,
    ClassInstanceMethod,
    ClassPrivateMethod,
    PrototypeAssignedMethod,
    ArrowFunction,
    ObjectLiteralMethod,
    ArrowFunction,
];

/// Kinds along the async chain, outermost first.
pub const ASYNC_KINDS: [InvocationKind; 8] = [
    FunctionDeclaration,
    ArrowFunction,
    ClassStaticMethod,
    ClassInstanceMethod,
    ClassPrivateMethod,
    PrototypeAssignedMethod,
    ObjectLiteralMethod,
    ArrowFunction,
];

fn class(name: &str) -> Owner {
    Owner::Class(name.to_string())
}

fn object(name: &str) -> Owner {
    Owner::Object(name.to_string())
}

fn sync_chain(file: &str) -> Vec<FunctionDecl> {
    vec![
        FunctionDecl::new("namedFn", FunctionDeclaration, file).calls("beepBoop", 3, 21),
        FunctionDecl::new("namedFnExpr", FunctionExpressionNamed, file)
            .bound_as("beepBoop")
            .calls("anonFn", 5, 42),
        FunctionDecl::new("anonFn", FunctionExpressionAnon, file).calls("arrowFn", 7, 29),
        FunctionDecl::new("arrowFn", ArrowFunction, file).calls("Klass.staticMethod", 9, 31),
        FunctionDecl::new("staticMethod", ClassStaticMethod, file)
            .owned_by(class("Klass"))
            .calls("new Klass", 12, 28),
        FunctionDecl::new("Klass", Constructor, file)
            .owned_by(class("Klass"))
            .calls("Klass.classMethod", 14, 25),
        FunctionDecl::new("classMethod", ClassInstanceMethod, file)
            .owned_by(class("Klass"))
            .calls("Klass.#privateMethod", 16, 25),
        FunctionDecl::new("#privateMethod", ClassPrivateMethod, file)
            .owned_by(class("Klass"))
            .calls("Klass.prototype.prototypeMethod", 18, 28),
        FunctionDecl::new("prototypeMethod", PrototypeAssignedMethod, file)
            .owned_by(class("Klass"))
            .calls("globalAssign", 22, 28),
        FunctionDecl::new("globalAssign", ArrowFunction, file)
            .calls("obj.objectLiteralMethod", 24, 27),
        FunctionDecl::new("objectLiteralMethod", ObjectLiteralMethod, file)
            .owned_by(object("obj"))
            .calls("obj.objectLiteralAnon", 27, 32),
        FunctionDecl::new("objectLiteralAnon", ArrowFunction, file)
            .owned_by(object("obj"))
            .throws("", 28, 37),
    ]
}

fn async_chain(file: &str) -> Vec<FunctionDecl> {
    vec![
        FunctionDecl::new("asyncNamedFn", FunctionDeclaration, file)
            .asynchronous()
            .calls("asyncArrowFn", 33, 38),
        FunctionDecl::new("asyncArrowFn", ArrowFunction, file)
            .asynchronous()
            .calls("AsyncKlass.asyncStaticMethod", 34, 52),
        FunctionDecl::new("asyncStaticMethod", ClassStaticMethod, file)
            .owned_by(class("AsyncKlass"))
            .asynchronous()
            .calls("AsyncKlass.asyncClassMethod", 39, 17),
        FunctionDecl::new("asyncClassMethod", ClassInstanceMethod, file)
            .owned_by(class("AsyncKlass"))
            .asynchronous()
            .calls("AsyncKlass.#privateAsyncMethod", 41, 42),
        FunctionDecl::new("#privateAsyncMethod", ClassPrivateMethod, file)
            .owned_by(class("AsyncKlass"))
            .asynchronous()
            .calls("AsyncKlass.prototype.asyncProtoMethod", 42, 45),
        FunctionDecl::new("asyncProtoMethod", PrototypeAssignedMethod, file)
            .owned_by(class("AsyncKlass"))
            .asynchronous()
            .calls("asyncObj.asyncObjectLiteralMethod", 45, 74),
        FunctionDecl::new("asyncObjectLiteralMethod", ObjectLiteralMethod, file)
            .owned_by(object("asyncObj"))
            .asynchronous()
            .calls("asyncObj.asyncObjectLiteralAnon", 49, 54),
        FunctionDecl::new("asyncObjectLiteralAnon", ArrowFunction, file)
            .owned_by(object("asyncObj"))
            .asynchronous()
            .throws("", 50, 48),
    ]
}

/// Registry holding both chains of the fixture, declared in `file`.
pub fn simple_registry(file: &str) -> Result<Registry, RegistryError> {
    sync_chain(file)
        .into_iter()
        .chain(async_chain(file))
        .fold(Registry::builder(), |builder, decl| builder.register(decl))
        .build()
}

/// The built-in scenarios
pub fn simple_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::sync("simple.js sync chain", SYNC_ENTRY),
        Scenario::asynchronous("simple.js async chain", ASYNC_ENTRY),
    ]
}

/// Scope index of the fixture source.
pub fn simple_scope_index() -> Result<ScopeIndex, ScopeError> {
    extract_declarations(SIMPLE_JS_FILE, SIMPLE_JS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{DeclarationLookup, ScopeLookup};

    #[test]
    fn test_paths_follow_declared_kinds() {
        let registry = simple_registry(SIMPLE_JS_URL).unwrap();

        let sync: Vec<_> = registry.call_path(SYNC_ENTRY).unwrap().iter().map(|d| d.kind).collect();
        assert_eq!(sync, SYNC_KINDS);

        let async_kinds: Vec<_> =
            registry.call_path(ASYNC_ENTRY).unwrap().iter().map(|d| d.kind).collect();
        assert_eq!(async_kinds, ASYNC_KINDS);
    }

    #[test]
    fn test_fixture_scopes_agree_with_registry() {
        let registry = simple_registry(SIMPLE_JS_URL).unwrap();
        let index = simple_scope_index().unwrap();

        for decl in registry.iter() {
            let site = decl.site();
            match index.lookup(&site) {
                ScopeLookup::Declared(scope) => {
                    assert_eq!(scope.kind, decl.kind, "{} at {}", decl.label(), site);
                    assert_eq!(scope.name, decl.label(), "{} at {}", decl.label(), site);
                }
                other => panic!("{} at {} resolved to {:?}", decl.label(), site, other),
            }
        }
    }
}
