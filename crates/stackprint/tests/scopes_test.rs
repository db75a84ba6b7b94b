//! Scope extraction on the reference fixture

use stackprint::classify::{DeclarationLookup, ScopeLookup};
use stackprint::scopes::Position;
use stackprint::topology::simple_scope_index;
use stackprint::{InvocationKind, Site};

fn lookup_name(line: u32, column: u32) -> Option<String> {
    let index = simple_scope_index().unwrap();
    match index.lookup(&Site::new("http://127.0.0.1:8080/simple.js", line, column)) {
        ScopeLookup::Declared(scope) => Some(scope.name.to_string()),
        _ => None,
    }
}

#[test]
fn test_declared_names() {
    let index = simple_scope_index().unwrap();
    let names: Vec<_> = index.declarations().iter().map(|d| d.name.as_str()).collect();

    for expected in [
        "namedFn",
        "namedFnExpr",
        "anonFn",
        "arrowFn",
        "new Klass",
        "Klass.staticMethod",
        "Klass.classMethod",
        "Klass.#privateMethod",
        "Klass.prototype.prototypeMethod",
        "globalAssign",
        "obj.objectLiteralMethod",
        "obj.objectLiteralAnon",
        "asyncNamedFn",
        "asyncArrowFn",
        "new AsyncKlass",
        "AsyncKlass.asyncStaticMethod",
        "AsyncKlass.asyncClassMethod",
        "AsyncKlass.#privateAsyncMethod",
        "AsyncKlass.prototype.asyncProtoMethod",
        "asyncObj.asyncObjectLiteralMethod",
        "asyncObj.asyncObjectLiteralAnon",
        "asyncMain",
    ] {
        assert!(names.contains(&expected), "missing {expected}: {names:?}");
    }
}

#[test]
fn test_innermost_scope_wins() {
    // the class body and the constructor both start as `new Klass`
    assert_eq!(lookup_name(14, 25).as_deref(), Some("new Klass"));
    assert_eq!(lookup_name(12, 28).as_deref(), Some("Klass.staticMethod"));
    assert_eq!(lookup_name(22, 28).as_deref(), Some("Klass.prototype.prototypeMethod"));
    assert_eq!(lookup_name(39, 17).as_deref(), Some("AsyncKlass.asyncStaticMethod"));
    assert_eq!(lookup_name(69, 15).as_deref(), Some("asyncMain"));
}

#[test]
fn test_top_level_and_foreign_sites() {
    let index = simple_scope_index().unwrap();
    assert_eq!(
        index.lookup(&Site::new("/home/ci/project/simple.js", 60, 5)),
        ScopeLookup::TopLevel
    );
    assert_eq!(
        index.lookup(&Site::new("/home/ci/project/other.js", 3, 21)),
        ScopeLookup::Unknown
    );
    assert_eq!(
        index.lookup(&Site::new("/home/ci/project/simple.js", 500, 1)),
        ScopeLookup::Unknown
    );
}

#[test]
fn test_prototype_assignment_kind() {
    let index = simple_scope_index().unwrap();
    let decl = index
        .declarations()
        .iter()
        .find(|d| d.name == "Klass.prototype.prototypeMethod")
        .unwrap();
    assert_eq!(decl.kind, InvocationKind::PrototypeAssignedMethod);
    // the arrow starts on the second line of the split member expression
    assert_eq!(decl.start.line, 22);
    assert!(decl.start <= Position::new(22, 28) && Position::new(22, 28) <= decl.end);
}
