//! Generate CPython extension module sources from a resolved declaration
//! tree.
//!
//! The input is a JSON declaration tree in which every entity already
//! carries its Python name and its fully qualified C++ name. One pass over
//! the tree produces three C++ artifacts:
//!
//! - `<mod>.cc` — the implementation body: wrapper functions, method and
//!   getset tables, type objects, `Ready()`/`Init()`, and the type
//!   conversion definitions,
//! - `<mod>_init.cc` — the interpreter-facing module entry symbol,
//! - `<mod>.h` — conversion declarations for other wrapped units.
//!
//! Output is byte-deterministic for a given input and options.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;

mod assemble;
pub mod config;
pub mod error;
pub mod model;
pub mod names;
pub mod postconv;
pub mod render;
pub mod translate;
pub mod types;

pub use config::Options;
pub use error::GenError;
pub use model::Ast;
pub use translate::Module;

/// The three generated source units.
#[derive(Debug)]
pub struct Artifacts {
    pub base: String,
    pub init: String,
    pub header: String,
}

/// Run one generation pass over an already-loaded tree.
pub fn generate_from_ast(ast: &Ast, opts: &Options) -> Result<Artifacts, GenError> {
    let typemap: HashMap<String, String> = ast
        .typemap
        .iter()
        .filter(|t| !t.postconversion.is_empty())
        .map(|t| (t.lang_type.clone(), t.postconversion.clone()))
        .collect();
    let mut module = Module::new(&ast.module, &typemap, ast.catch_exceptions, opts.clone());
    let base = module.generate_base(ast)?;
    let init = module.generate_init(&ast.source);
    let header = module.generate_header(&ast.source, &ast.api_header);
    Ok(Artifacts {
        base: to_text(base),
        init: to_text(init),
        header: to_text(header),
    })
}

/// Load a declaration tree and write the generated sources into `out_dir`.
pub fn run(input: &Path, out_dir: &Path, opts: &Options) -> anyhow::Result<()> {
    let ast = config::load_ast(input)?;
    tracing::info!(module = %ast.module, "generating extension module sources");
    let artifacts = generate_from_ast(&ast, opts)
        .with_context(|| format!("failed to generate module {}", ast.module))?;
    let modname = ast.module.rsplit('.').next().unwrap_or(&ast.module);
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    for (name, text) in [
        (format!("{modname}.cc"), &artifacts.base),
        (format!("{modname}_init.cc"), &artifacts.init),
        (format!("{modname}.h"), &artifacts.header),
    ] {
        let path = out_dir.join(&name);
        std::fs::write(&path, text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(file = %path.display(), bytes = text.len(), "wrote");
    }
    Ok(())
}

fn to_text(lines: Vec<String>) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}
