mod body;
pub mod binder;
mod cst;
pub mod edit;
pub mod lexer;
mod parser;
pub mod program;
pub mod symbols;
pub mod syntax;
pub mod types;

pub use binder::{Binder, Binding, Ty};
pub use edit::{apply_edits, EditConflict, SourceEdit, Span};
pub use program::{Program, ProgramUnit};
pub use symbols::{Symbol, SymbolId, SymbolKind, SymbolTable};
pub use syntax::SyntaxTree;
