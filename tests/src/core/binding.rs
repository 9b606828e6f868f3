use shroud_core::{Binder, Binding, SymbolKind, SymbolTable};
use shroud_tests::{init_tracing, widget_program};

fn token_of(tree: &shroud_core::SyntaxTree, name: &str) -> usize {
    (0..tree.tokens.len()).find(|&i| tree.ident(i) == Some(name)).unwrap()
}

#[test]
fn cross_file_usages_bind_to_their_declarations() {
    init_tracing();
    let program = widget_program();
    let symbols = SymbolTable::build(&program);
    let binder = Binder::new(&program, &symbols);

    let decl_tree = program.units()[0].tree();
    let widget = symbols.declared_at(0, token_of(decl_tree, "Widget")).unwrap();
    let greet = symbols.declared_at(0, token_of(decl_tree, "Greet")).unwrap();
    assert!(matches!(symbols.get(widget).kind, SymbolKind::Type(_)));
    assert_eq!(symbols.get(greet).kind, SymbolKind::Method);

    let use_tree = program.units()[1].tree();
    assert_eq!(binder.bind(1, token_of(use_tree, "Widget")), Binding::Symbol(widget));
    assert_eq!(binder.bind(1, token_of(use_tree, "Greet")), Binding::Symbol(greet));
}

#[test]
fn framework_names_stay_outside_the_program() {
    let program = widget_program();
    let symbols = SymbolTable::build(&program);
    let binder = Binder::new(&program, &symbols);
    let tree = program.units()[1].tree();

    let console = binder.bind(1, token_of(tree, "Console"));
    assert!(console.symbol().is_none());
    let declared = program.units()[0].tree();
    assert!(matches!(binder.bind(0, token_of(declared, "Demo")), Binding::Namespace(_)));
}

#[test]
fn partial_types_share_one_symbol() {
    let program = shroud_core::Program::from_sources(
        "Demo",
        [
            ("a.cs", "partial class Ledger { void Add() {} }"),
            ("b.cs", "partial class Ledger { void Sum() { Add(); } }"),
        ],
    )
    .unwrap();
    let symbols = SymbolTable::build(&program);
    let first = symbols.declared_at(0, token_of(program.units()[0].tree(), "Ledger")).unwrap();
    let second = symbols.declared_at(1, token_of(program.units()[1].tree(), "Ledger")).unwrap();
    assert_eq!(first, second);
    assert_eq!(symbols.get(first).origins.len(), 2);

    let binder = Binder::new(&program, &symbols);
    let add = symbols.declared_at(0, token_of(program.units()[0].tree(), "Add")).unwrap();
    assert_eq!(binder.bind(1, token_of(program.units()[1].tree(), "Add")), Binding::Symbol(add));
}
