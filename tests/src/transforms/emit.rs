use shroud_core::Program;
use shroud_tests::{init_tracing, widget_program};
use shroud_transform::emit::{BuildOptions, ProjectEmitter};
use shroud_transform::obfuscator::{ObfuscationConfig, Obfuscator};
use shroud_transform::RewriteKind;
use shroud_utils::errors::{EmitError, ObfuscateError};
use std::fs;

fn options(dir: &std::path::Path, script: &str) -> BuildOptions {
    BuildOptions {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        output: dir.join("bin"),
        work_dir: Some(dir.join("project")),
        ..BuildOptions::default()
    }
}

#[cfg(unix)]
#[test]
fn emitted_project_carries_sources_and_resources() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let long = "payload ".repeat(20);
    let mut program = Program::from_sources(
        "Demo",
        [("Blob.cs", format!("class Blob {{ string Data = \"{long}\"; static void Main() {{}} }}"))],
    )
    .unwrap();
    let config = ObfuscationConfig {
        seed: Some(9),
        passes: vec![RewriteKind::Steganography, RewriteKind::IdentifierRenaming],
        stego_threshold: 100,
        ..ObfuscationConfig::default()
    };

    let (result, outcome) = Obfuscator::new(config)
        .run_and_emit(&mut program, &ProjectEmitter, &options(dir.path(), "true"))
        .unwrap();
    assert!(outcome.success);
    assert_eq!(result.resources.entries().len(), 1);

    let project = dir.path().join("project");
    let csproj = fs::read_to_string(project.join("Demo.csproj")).unwrap();
    assert!(csproj.contains("<AssemblyName>Demo</AssemblyName>"));
    assert!(csproj.contains("Properties/Resources.resx") || csproj.contains("Properties\\Resources.resx"));
    assert!(project.join("Blob.cs").exists());
    assert!(project.join("Properties/Resources.resx").exists());
}

#[cfg(unix)]
#[test]
fn failed_build_surfaces_compiler_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut program = widget_program();
    let config = ObfuscationConfig::identifiers_only(Some(4));
    let err = Obfuscator::new(config)
        .run_and_emit(&mut program, &ProjectEmitter, &options(dir.path(), "echo 'error CS0103' >&2; exit 1"))
        .unwrap_err();
    match err {
        ObfuscateError::Emit(EmitError::Failed { status, stderr }) => {
            assert_eq!(status, Some(1));
            assert!(stderr.contains("CS0103"));
        }
        other => panic!("unexpected {other:?}"),
    }
}
