//! Shared fixtures for the cross-crate scenario tests.

use shroud_core::Program;
use shroud_transform::obfuscator::{ObfuscationConfig, ObfuscationResult, Obfuscator};
use shroud_transform::RewriteKind;

pub const WIDGET: &str = r#"namespace Demo.Core
{
    public class Widget
    {
        private int greeted;

        public string Greet()
        {
            greeted++;
            return "hello from widget";
        }
    }
}
"#;

pub const ENTRY: &str = r#"using System;
using Demo.Core;

namespace Demo.App
{
    static class Entry
    {
        static void Main()
        {
            Console.WriteLine(new Widget().Greet());
        }
    }
}
"#;

/// Routes `tracing` output through the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn widget_program() -> Program {
    Program::from_sources("Demo", [("Widget.cs", WIDGET), ("Entry.cs", ENTRY)]).unwrap()
}

/// Runs `passes` over `program` with a fixed seed.
pub fn obfuscate(program: &mut Program, passes: &[RewriteKind], seed: u64) -> ObfuscationResult {
    let config = ObfuscationConfig {
        seed: Some(seed),
        passes: passes.to_vec(),
        ..ObfuscationConfig::default()
    };
    Obfuscator::new(config).run(program).unwrap()
}

pub fn text_of<'a>(program: &'a Program, path: &str) -> &'a str {
    program
        .units()
        .iter()
        .find(|u| u.path() == path)
        .map(|u| u.text())
        .unwrap()
}
