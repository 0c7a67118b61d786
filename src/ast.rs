use std::path::PathBuf;

/// One program in a pipeline together with its file redirections.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stage {
    /// Program name followed by its arguments.
    pub argv: Vec<String>,
    /// `< file`: read standard input from this file.
    pub input: Option<PathBuf>,
    /// `> file`: write standard output to this file (truncated).
    pub output: Option<PathBuf>,
}

impl Stage {
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

/// A parsed command line: stages connected by `|`, optionally ending in `&`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub background: bool,
    /// The command line as typed, without its trailing newline.
    pub text: String,
}
