use shroud_core::syntax::MemberKind;
use shroud_core::{Program, SourceEdit, Span};
use shroud_tests::{init_tracing, obfuscate, text_of, widget_program, ENTRY, WIDGET};
use shroud_transform::generator::{GeneratorConfig, NameGenerator};
use shroud_transform::pass::{self, ConflictPolicy, UnitOutcome};
use shroud_transform::session::Session;
use shroud_transform::{Context, EditPlan, RewriteKind, Rewriter};
use shroud_utils::errors::RewriteError;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn cross_file_renames_agree() {
    init_tracing();
    let mut program = widget_program();
    let result = obfuscate(&mut program, &RewriteKind::ALL, 17);

    let decl = program.units()[0].tree();
    let ty = decl.types[0].name.clone();
    let method = decl
        .members
        .iter()
        .find(|m| m.kind == MemberKind::Method)
        .map(|m| m.name.clone())
        .unwrap();

    let entry = text_of(&program, "Entry.cs");
    assert!(entry.contains(&format!("new {ty}().{method}()")), "{entry}");
    for unit in program.units() {
        assert!(!unit.text().contains("Widget"), "{}", unit.text());
        assert!(!unit.text().contains("Greet"), "{}", unit.text());
    }
    assert!(entry.contains("static void Main()"));
    assert!(result.coverage.identifier_coverage > 0.5);
    assert!(!result.coverage.surviving_identifiers.contains(&"Widget".to_string()));
}

#[test]
fn attribute_arguments_stay_plain() {
    let mut program = Program::from_sources(
        "Demo",
        [(
            "Legacy.cs",
            "class Legacy\n{\n    [System.Obsolete(\"use the new api\")]\n    public string Old() => \"legacy value\";\n}\n",
        )],
    )
    .unwrap();
    obfuscate(&mut program, &[RewriteKind::StringEncryption], 5);
    let text = program.units()[0].text();
    assert!(text.contains("\"use the new api\""));
    assert!(!text.contains("\"legacy value\""));
}

#[test]
fn out_parameters_round_trip_through_the_loader() {
    let src = r#"using System.Runtime.InteropServices;

static class Native
{
    [DllImport("kernel32.dll")]
    static extern bool QueryPerformanceCounter(out long count);

    static long Now()
    {
        long value;
        QueryPerformanceCounter(out value);
        return value;
    }
}
"#;
    let mut program = Program::from_sources("Demo", [("Native.cs", src)]).unwrap();
    let result = obfuscate(&mut program, &[RewriteKind::ForeignCall], 8);
    let text = program.units()[0].text();

    let start = text.find("static bool QueryPerformanceCounter").unwrap();
    let body = &text[start..];
    let fresh = body.find("count = new long();").unwrap();
    let call = body.find("InvokePInvokeFunction(\"kernel32.dll\", \"QueryPerformanceCounter\"").unwrap();
    let write_back = body.find("count = (long)").unwrap();
    assert!(fresh < call && call < write_back);
    assert!(!text.contains("extern "));
    assert_eq!(result.coverage.after.foreign_imports, 0);
    assert!(text.contains("QueryPerformanceCounter(out value);"));
}

#[test]
fn namespaces_collapse_to_one_name() {
    let mut program = widget_program();
    let result = obfuscate(&mut program, &[RewriteKind::NamespaceCollapse], 21);
    let ns = &result.metadata.namespace;

    for unit in program.units() {
        let tree = unit.tree();
        assert!(tree.namespaces.iter().all(|n| &n.full_name == ns));
        assert!(!unit.text().contains("Demo."), "{}", unit.text());
    }
    assert!(text_of(&program, "Entry.cs").contains(&format!("using {ns};")));
    assert_eq!(result.coverage.after.namespaces, 1);
}

#[test]
fn same_seed_same_output() {
    let run = |seed| {
        let mut program = widget_program();
        obfuscate(&mut program, &RewriteKind::ALL, seed);
        program.units().iter().map(|u| u.text().to_string()).collect::<Vec<_>>()
    };
    assert_eq!(run(42), run(42));
    assert_ne!(run(42), run(43));
}

#[test]
fn long_literals_move_into_resources() {
    let long = "x".repeat(64);
    let src = format!("class Blob\n{{\n    string Big = \"{long}\";\n    string Small = \"tiny\";\n}}\n");
    let mut program = Program::from_sources("Demo", [("Blob.cs", src.as_str())]).unwrap();
    let config = shroud_transform::obfuscator::ObfuscationConfig {
        seed: Some(3),
        passes: vec![RewriteKind::Steganography],
        stego_threshold: 32,
        ..Default::default()
    };
    let result = shroud_transform::obfuscator::Obfuscator::new(config).run(&mut program).unwrap();

    let text = text_of(&program, "Blob.cs");
    assert!(!text.contains(&long));
    assert!(text.contains("\"tiny\""));
    assert_eq!(result.metadata.payloads.len(), 1);
    assert_eq!(result.resources.entries().len(), 1);
    assert!(program.len() > 1, "resource accessors are injected");
}

/// Plans two overlapping edits in the first unit only.
struct Overlapping;

impl Rewriter for Overlapping {
    fn kind(&self) -> RewriteKind {
        RewriteKind::IdentifierRenaming
    }

    fn plan_unit(&self, _ctx: &Context<'_>, unit: usize, _session: &mut Session) -> Result<EditPlan, RewriteError> {
        let mut plan = EditPlan::new(unit);
        if unit == 0 {
            plan.push(SourceEdit::replace(Span::new(0, 9), "namespace"));
            plan.push(SourceEdit::replace(Span::new(4, 12), "space"));
        } else {
            plan.push(SourceEdit::insert(0, "// touched\n"));
        }
        Ok(plan)
    }
}

#[test]
fn conflicting_file_is_left_alone() {
    let mut program = widget_program();
    let generator = NameGenerator::new(GeneratorConfig::default(), StdRng::seed_from_u64(1)).unwrap();
    let mut session = Session::for_program(&program, generator).unwrap();

    let report = pass::run(&mut program, &Overlapping, &mut session, ConflictPolicy::Skip).unwrap();
    assert_eq!(text_of(&program, "Widget.cs"), WIDGET);
    assert_eq!(text_of(&program, "Entry.cs"), format!("// touched\n{ENTRY}"));
    assert!(matches!(report.outcomes[0].1, UnitOutcome::Conflicted { .. }));
    assert_eq!(session.diagnostics().conflicts.len(), 1);

    let mut program = widget_program();
    let err = pass::run(&mut program, &Overlapping, &mut session, ConflictPolicy::Abort).unwrap_err();
    assert!(matches!(err, RewriteError::Conflict { .. }));
}
