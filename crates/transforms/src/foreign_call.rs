//! Redirects foreign-function imports through the injected loader.
//!
//! An imported declaration such as
//!
//! ```text
//! [DllImport("user32.dll")] static extern int MessageBox(IntPtr h, string t, string c, uint f);
//! ```
//!
//! becomes an ordinary method whose body packs its arguments, asks the
//! loader to bind and invoke the native function by `(library, entry point)`
//! at runtime, writes `ref`/`out` arguments back and casts the result.

use crate::inject::HelperRole;
use crate::session::Session;
use crate::util::split_args;
use crate::{Context, EditPlan, RewriteKind, Rewriter};
use shroud_core::lexer::quote_literal;
use shroud_core::syntax::{Attribute, MemberDecl, MemberKind, ParamModifier, TokenRange};
use shroud_core::{SourceEdit, SyntaxTree};
use shroud_utils::errors::RewriteError;
use tracing::debug;

const IMPORT_ATTRIBUTES: &[&str] = &["DllImport", "DllImportAttribute"];

fn is_import(attribute: &Attribute) -> bool {
    IMPORT_ATTRIBUTES.contains(&attribute.name.simple_name())
}

const INTEROP: &str = "global::System.Runtime.InteropServices";

/// Expressions passed to the loader for one import, taken verbatim from the
/// attribute's arguments or set to the runtime's defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Import {
    library: String,
    entry_point: String,
    calling_convention: String,
    char_set: String,
    set_last_error: String,
    exact_spelling: String,
    preserve_sig: String,
}

impl Import {
    fn loader_args(&self) -> String {
        [
            &self.library,
            &self.entry_point,
            &self.calling_convention,
            &self.char_set,
            &self.set_last_error,
            &self.exact_spelling,
            &self.preserve_sig,
        ]
        .map(String::as_str)
        .join(", ")
    }
}

fn descriptor(tree: &SyntaxTree, attribute: &Attribute, method: &str) -> Option<Import> {
    let mut import = Import {
        library: String::new(),
        entry_point: quote_literal(method),
        calling_convention: format!("{INTEROP}.CallingConvention.Winapi"),
        char_set: format!("{INTEROP}.CharSet.Ansi"),
        set_last_error: "false".to_string(),
        exact_spelling: "false".to_string(),
        preserve_sig: "true".to_string(),
    };
    let mut library = None;
    for arg in split_args(tree, attribute.args?) {
        let named = tree.ident(arg.start).is_some()
            && (tree.is_punct(arg.start + 1, "=") || tree.is_punct(arg.start + 1, ":"));
        if !named {
            if library.is_none() {
                library = Some(tree.slice(arg).to_string());
            }
            continue;
        }
        let value = tree.slice(TokenRange::new(arg.start + 2, arg.end)).to_string();
        let slot = match tree.token_text(arg.start) {
            "EntryPoint" => &mut import.entry_point,
            "CallingConvention" => &mut import.calling_convention,
            "CharSet" => &mut import.char_set,
            "SetLastError" => &mut import.set_last_error,
            "ExactSpelling" => &mut import.exact_spelling,
            "PreserveSig" => &mut import.preserve_sig,
            _ => continue,
        };
        *slot = value;
    }
    import.library = library?;
    Some(import)
}

struct Param {
    name: String,
    ty: String,
    text: String,
    by_ref: bool,
    out: bool,
    writes_back: bool,
    no_default_ctor: bool,
}

fn params(tree: &SyntaxTree, decl: &MemberDecl) -> Option<Vec<Param>> {
    tree.params[decl.params.start..decl.params.end]
        .iter()
        .map(|p| {
            let ty = p.type_ref.as_ref()?;
            let after_attributes = p
                .attributes
                .iter()
                .map(|&a| tree.attributes[a].range.end)
                .max()
                .unwrap_or(p.range.start);
            let out = p.has_modifier(ParamModifier::Out);
            let writes_back = out || p.has_modifier(ParamModifier::Ref);
            Some(Param {
                name: tree.token_text(p.name_token).to_string(),
                ty: tree.type_text(ty).to_string(),
                text: tree.slice(TokenRange::new(after_attributes, p.range.end)).to_string(),
                by_ref: writes_back || p.has_modifier(ParamModifier::In),
                out,
                writes_back,
                no_default_ctor: ty.lacks_default_constructor(),
            })
        })
        .collect()
}

/// Leading whitespace of the line the member starts on.
fn indent_of(text: &str, offset: usize) -> &str {
    let line_start = text[..offset].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &text[line_start..offset];
    if prefix.chars().all(char::is_whitespace) {
        prefix
    } else {
        ""
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ForeignCallRewriter;

impl ForeignCallRewriter {
    pub fn new() -> Self {
        Self
    }

    fn rewrite(
        &self,
        tree: &SyntaxTree,
        decl: &MemberDecl,
        session: &mut Session,
    ) -> Result<Option<String>, RewriteError> {
        let lists: Vec<_> = decl.attributes.iter().map(|&a| &tree.attributes[a]).collect();
        let Some(import) = lists.iter().flat_map(|l| l.attributes.iter()).find(|a| is_import(a)) else {
            return Ok(None);
        };
        let Some(import) = descriptor(tree, import, &decl.name) else {
            return Ok(None);
        };
        let (Some(ret), Some(name_token)) = (decl.type_ref.as_ref(), decl.name_token) else {
            return Ok(None);
        };
        let Some(params) = params(tree, decl) else {
            return Ok(None);
        };

        let span = tree.span(decl.range);
        let indent = indent_of(&tree.text, span.start);
        let inner = format!("{indent}    ");
        let ret_text = tree.type_text(ret);
        let loader = HelperRole::ForeignCallLoader.reference(session);
        let args = session.fresh_identifier()?;

        let mut out = String::new();
        for list in &lists {
            if list.target.as_deref() == Some("return") {
                continue;
            }
            let kept: Vec<String> = list
                .attributes
                .iter()
                .filter(|a| !is_import(a))
                .map(|a| {
                    let args = a.args.map(|r| tree.slice(r)).unwrap_or("");
                    format!("{}{}", tree.type_text(&a.name), args)
                })
                .collect();
            if kept.is_empty() {
                continue;
            }
            let target = list.target.as_ref().map(|t| format!("{t}: ")).unwrap_or_default();
            out.push_str(&format!("[{target}{}]\n{indent}", kept.join(", ")));
        }
        for modifier in decl.modifiers.iter().filter(|m| *m != "extern") {
            out.push_str(modifier);
            out.push(' ');
        }
        let signature: Vec<&str> = params.iter().map(|p| p.text.as_str()).collect();
        out.push_str(&format!(
            "{ret_text} {}({})\n{indent}{{\n",
            tree.token_text(name_token),
            signature.join(", ")
        ));

        for p in params.iter().filter(|p| p.out) {
            if p.no_default_ctor {
                out.push_str(&format!("{inner}{} = default({});\n", p.name, p.ty));
            } else {
                out.push_str(&format!("{inner}{} = new {}();\n", p.name, p.ty));
            }
        }
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        out.push_str(&format!("{inner}object[] {args} = new object[] {{ {} }};\n", names.join(", ")));
        let types: Vec<String> = params
            .iter()
            .map(|p| {
                if p.by_ref {
                    format!("typeof({}).MakeByRefType()", p.ty)
                } else {
                    format!("typeof({})", p.ty)
                }
            })
            .collect();
        let call = format!(
            "{loader}.Instance.InvokePInvokeFunction({}, typeof({ret_text}), new global::System.Type[] {{ {} }}, {args})",
            import.loader_args(),
            types.join(", ")
        );
        let result = if ret.is_void() {
            out.push_str(&format!("{inner}{call};\n"));
            None
        } else {
            let result = session.fresh_identifier()?;
            out.push_str(&format!("{inner}var {result} = {call};\n"));
            Some(result)
        };
        for (index, p) in params.iter().enumerate().filter(|(_, p)| p.writes_back) {
            out.push_str(&format!("{inner}{} = ({}){args}[{index}];\n", p.name, p.ty));
        }
        if let Some(result) = result {
            out.push_str(&format!("{inner}return ({ret_text}){result};\n"));
        }
        out.push_str(&format!("{indent}}}"));
        Ok(Some(out))
    }
}

impl Rewriter for ForeignCallRewriter {
    fn kind(&self) -> RewriteKind {
        RewriteKind::ForeignCall
    }

    fn plan_unit(&self, ctx: &Context<'_>, unit: usize, session: &mut Session) -> Result<EditPlan, RewriteError> {
        let mut plan = EditPlan::new(unit);
        let Some(source) = ctx.program.unit(unit) else {
            return Ok(plan);
        };
        let tree = source.tree();
        for decl in tree.members.iter().filter(|m| m.kind == MemberKind::Method) {
            if let Some(replacement) = self.rewrite(tree, decl, session)? {
                debug!("{}: redirecting foreign import {}", source.path(), decl.name);
                plan.push(SourceEdit::replace(tree.span(decl.range), replacement));
            }
        }
        Ok(plan.needs(HelperRole::ForeignCallLoader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GeneratorConfig, NameGenerator};
    use crate::pass::{run, ConflictPolicy};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shroud_core::Program;

    const NATIVE: &str = r#"using System.Runtime.InteropServices;

class Native
{
    [DllImport("kernel32.dll", EntryPoint = "GetTickCount64")]
    public static extern ulong Ticks();

    [DllImport("advapi32.dll", SetLastError = true)]
    [System.Obsolete]
    static extern bool OpenToken(int handle, out int token, ref string label);

    [DllImport("user32.dll")]
    static extern void Beep();

    [DllImport("msvcrt.dll", EntryPoint = "puts", CallingConvention = CallingConvention.Cdecl, CharSet = CharSet.Unicode, ExactSpelling = true, PreserveSig = false)]
    static extern int Print(string text);

    static int Plain() => 1;
}
"#;

    fn redirect() -> (Program, Session) {
        let mut program = Program::from_sources("App", [("native.cs", NATIVE)]).unwrap();
        let generator = NameGenerator::new(GeneratorConfig::default(), StdRng::seed_from_u64(4)).unwrap();
        let mut session = Session::for_program(&program, generator).unwrap();
        run(&mut program, &ForeignCallRewriter, &mut session, ConflictPolicy::Abort).unwrap();
        (program, session)
    }

    #[test]
    fn imports_become_loader_calls() {
        let (program, session) = redirect();
        let text = program.units()[0].text();
        assert!(!text.contains("extern "));
        assert!(!text.contains("DllImport("));
        assert!(text.contains("public static ulong Ticks()"));
        assert!(text.contains("InvokePInvokeFunction(\"kernel32.dll\", \"GetTickCount64\", "));
        assert!(text.contains("InvokePInvokeFunction(\"user32.dll\", \"Beep\", "));
        assert!(text.contains("typeof(void), new global::System.Type[] {  }"));
        assert!(text.contains("[System.Obsolete]"));
        assert!(text.contains("static int Plain() => 1;"));
        assert!(session.is_injected(HelperRole::ForeignCallLoader));
    }

    #[test]
    fn out_parameters_are_constructed_and_written_back() {
        let (program, _) = redirect();
        let text = program.units()[0].text();
        let start = text.find("static bool OpenToken").unwrap();
        let body = &text[start..];
        let body = &body[..body.find("\n    }").unwrap()];

        let init = body.find("token = new int();").unwrap();
        let pack = body.find("new object[] { handle, token, label }").unwrap();
        let call = body.find("InvokePInvokeFunction(").unwrap();
        let write_back = body.find("token = (int)").unwrap();
        assert!(init < pack && pack < call && call < write_back);
        assert!(body.contains("typeof(int).MakeByRefType()"));
        assert!(body.contains("label = (string)"));
        assert!(body.contains("return (bool)"));
        assert!(!body.contains("handle = (int)"));
    }

    #[test]
    fn import_options_reach_the_loader() {
        let (program, _) = redirect();
        let text = program.units()[0].text();
        assert!(text.contains(
            "InvokePInvokeFunction(\"advapi32.dll\", \"OpenToken\", global::System.Runtime.InteropServices.CallingConvention.Winapi, global::System.Runtime.InteropServices.CharSet.Ansi, true, false, true, typeof(bool)"
        ));
        assert!(text.contains(
            "InvokePInvokeFunction(\"msvcrt.dll\", \"puts\", CallingConvention.Cdecl, CharSet.Unicode, false, true, false, typeof(int)"
        ));
    }

    #[test]
    fn rewritten_unit_still_declares_the_methods() {
        let (program, _) = redirect();
        let tree = program.units()[0].tree();
        let names: Vec<&str> = tree.members.iter().map(|m| m.name.as_str()).collect();
        for name in ["Ticks", "OpenToken", "Beep", "Print", "Plain"] {
            assert!(names.contains(&name), "{name}");
        }
    }
}
