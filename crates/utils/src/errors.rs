use thiserror::Error;

/// Error type for lexing and parsing program units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// The grammar could not be loaded or the parser produced no tree.
    #[error("C# grammar unavailable: {0}")]
    Grammar(String),
    /// Text the grammar cannot place, such as an unterminated literal.
    #[error("invalid syntax at offset {offset} near {found:?}")]
    Invalid { offset: usize, found: String },
    /// A token the grammar requires but the source omits.
    #[error("expected '{expected}' at offset {offset}")]
    Missing { offset: usize, expected: String },
    /// A closing bracket without a matching opener, or a mismatched pair.
    #[error("unbalanced '{delimiter}' at offset {offset}")]
    Unbalanced { offset: usize, delimiter: char },
    /// An opening bracket that is never closed.
    #[error("unclosed '{delimiter}' at offset {offset}")]
    Unclosed { offset: usize, delimiter: char },
}

/// Errors raised while assembling a program from its files.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("syntax error in '{path}': {source}")]
    Syntax {
        path: String,
        #[source]
        source: SyntaxError,
    },

    #[error("duplicate program unit '{0}'")]
    DuplicateUnit(String),

    #[error("could not read file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the name and string generator.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The configured strategy name is not recognised.
    #[error("unsupported generation strategy: {0}")]
    UnsupportedStrategy(String),
    /// Wordlist mode was selected without a corpus path.
    #[error("wordlist strategy requires a wordlist path")]
    MissingWordlist,
    #[error("could not read wordlist '{path}': {source}")]
    WordlistRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The fixed alphabet cannot produce a single identifier character.
    #[error("alphabet contains no identifier characters")]
    EmptyAlphabet,
}

/// Errors raised while synthesizing and merging helper declarations.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("helper template '{role}' does not parse: {source}")]
    Template {
        role: String,
        #[source]
        source: SyntaxError,
    },
    #[error("helper template '{role}' must contain exactly one top-level declaration, found {found}")]
    NotSingleDeclaration { role: String, found: usize },
    #[error("injection produced invalid source in '{path}': {source}")]
    Merge {
        path: String,
        #[source]
        source: SyntaxError,
    },
    #[error("could not place helper in '{path}': {reason}")]
    Placement { path: String, reason: String },
    #[error("could not add helper unit: {0}")]
    Unit(#[from] ProgramError),
}

/// Error type for rewrite passes.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("syntax error after rewrite of '{path}': {source}")]
    Reparse {
        path: String,
        #[source]
        source: SyntaxError,
    },
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),
    #[error("injection error: {0}")]
    Inject(#[from] InjectError),
    #[error("{count} conflicting edit pair(s) in '{path}'")]
    Conflict { path: String, count: usize },
    #[error("payload carrier failed: {0}")]
    Carrier(String),
}

/// Errors raised when the rewritten program is turned into a binary.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not start build command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("build failed with status {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },
    #[error("resource packaging failed: {0}")]
    Resources(String),
}

/// Errors raised while measuring a program.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("program has no units")]
    EmptyProgram,
}

/// Errors that can occur during obfuscation.
#[derive(Debug, Error)]
pub enum ObfuscateError {
    #[error("program error: {0}")]
    Program(#[from] ProgramError),
    #[error("rewrite error: {0}")]
    Rewrite(#[from] RewriteError),
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),
    #[error("injection error: {0}")]
    Inject(#[from] InjectError),
    #[error("emit error: {0}")]
    Emit(#[from] EmitError),
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),
    /// Invalid rewrite pass specified.
    #[error("invalid pass: {0}")]
    InvalidPass(String),
    /// File read/write error.
    #[error("file error: {0}")]
    File(#[from] std::io::Error),
    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
