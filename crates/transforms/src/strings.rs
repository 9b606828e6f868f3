use crate::crypto::{Cipher, XorCipher};
use crate::inject::HelperRole;
use crate::session::Session;
use crate::util::literal_sites;
use crate::{Context, EditPlan, RewriteKind, Rewriter};
use shroud_core::lexer::quote_literal;
use shroud_core::SourceEdit;
use shroud_utils::errors::RewriteError;
use tracing::debug;

/// Assembly metadata files hold attribute strings only and stay readable.
const SKIPPED_FILES: &[&str] = &["AssemblyInfo.cs"];

/// Replaces string literals with calls into the injected decryptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringEncryptor;

impl StringEncryptor {
    pub fn new() -> Self {
        Self
    }
}

impl Rewriter for StringEncryptor {
    fn kind(&self) -> RewriteKind {
        RewriteKind::StringEncryption
    }

    fn plan_unit(&self, ctx: &Context<'_>, unit: usize, session: &mut Session) -> Result<EditPlan, RewriteError> {
        let mut plan = EditPlan::new(unit);
        let Some(source) = ctx.program.unit(unit) else {
            return Ok(plan);
        };
        if SKIPPED_FILES.contains(&source.file_name()) {
            debug!("Skipping {}", source.path());
            return Ok(plan);
        }

        let tree = source.tree();
        let cipher = XorCipher::new(session.key());
        let decryptor = HelperRole::StringDecryptor.reference(session);
        for site in literal_sites(tree) {
            if tree.namespace_name_at(site.token) == session.namespace() {
                continue;
            }
            let sealed = quote_literal(&cipher.encrypt(&site.value));
            let call = format!("{decryptor}.DecryptString({sealed})");
            plan.push(SourceEdit::replace(site.span, site.wrap(call)));
        }
        debug!("{}: {} literal(s) encrypted", source.path(), plan.edits.len());
        Ok(plan.needs(HelperRole::StringDecryptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GeneratorConfig, NameGenerator};
    use crate::pass::{run, ConflictPolicy};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shroud_core::lexer::string_value;
    use shroud_core::Program;

    fn encrypt(sources: &[(&str, &str)]) -> (Program, Session) {
        let mut program = Program::from_sources("App", sources.iter().copied()).unwrap();
        let generator = NameGenerator::new(GeneratorConfig::default(), StdRng::seed_from_u64(21)).unwrap();
        let mut session = Session::for_program(&program, generator).unwrap();
        run(&mut program, &StringEncryptor, &mut session, ConflictPolicy::Abort).unwrap();
        (program, session)
    }

    #[test]
    fn literals_become_decrypt_calls() {
        let (program, session) = encrypt(&[(
            "a.cs",
            r#"class A { string M() { return "secret" + @"C:\path"; } }"#,
        )]);
        let text = program.units()[0].text();
        assert!(!text.contains("secret") && !text.contains("path\""));
        let call = format!("global::{}.StringEncryptor.DecryptString(", session.namespace());
        assert_eq!(text.matches(&call).count(), 2);

        let tree = program.units()[0].tree();
        let cipher = XorCipher::new(session.key());
        let recovered: Vec<String> = tree
            .tokens
            .iter()
            .filter_map(|t| string_value(&tree.text, t))
            .filter_map(|sealed| cipher.decrypt(&sealed))
            .collect();
        assert!(recovered.contains(&"secret".to_string()));
        assert!(recovered.contains(&"C:\\path".to_string()));
        assert!(session.is_injected(HelperRole::StringDecryptor));
    }

    #[test]
    fn attribute_and_constant_literals_stay() {
        let (program, session) = encrypt(&[(
            "a.cs",
            r#"class A { [System.Obsolete("old")] const string K = "k"; void M(string s = "d") { switch (s) { case "x": break; } } }"#,
        )]);
        let text = program.units()[0].text();
        assert!(text.contains("\"old\"") && text.contains("\"k\"") && text.contains("\"d\"") && text.contains("\"x\""));
        assert!(!session.is_injected(HelperRole::StringDecryptor));
    }

    #[test]
    fn holes_are_parenthesized() {
        let (program, _) = encrypt(&[("a.cs", r#"class A { string M(int n) => $"{n}{Get("k")}"; string Get(string k) => k; }"#)]);
        let text = program.units()[0].text();
        assert!(text.contains("{Get((global::"));
    }

    #[test]
    fn assembly_info_is_skipped() {
        let (program, _) = encrypt(&[
            ("Properties/AssemblyInfo.cs", r#"class Info { string Title = "App"; }"#),
            ("a.cs", r#"class A { string T = "App"; }"#),
        ]);
        assert!(program.units()[0].text().contains("\"App\""));
        assert!(!program.units()[1].text().contains("\"App\""));
    }
}
