//! Generator options and input loading.

use std::path::Path;

use anyhow::Context;

use crate::model::Ast;

/// Pass-wide options, constructed once and threaded through every translator
/// call. Never mutated mid-pass.
#[derive(Debug, Clone)]
pub struct Options {
    /// Indentation unit for the generated C++.
    pub indent: String,
    /// Target Python 3 (module init symbol, string APIs, type flags).
    pub py3: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            indent: "  ".to_string(),
            py3: true,
        }
    }
}

impl Options {
    /// `n` levels of indentation.
    pub fn ind(&self, n: usize) -> String {
        self.indent.repeat(n)
    }
}

/// Load a serialized declaration tree (JSON) produced by the front end.
pub fn load_ast(path: &Path) -> anyhow::Result<Ast> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;
    let ast: Ast = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse declaration tree {}", path.display()))?;
    Ok(ast)
}
