//! Artifact assembly: drive one traversal pass and lay out the three
//! output units around it.
//!
//! The implementation body carries the bulk of the glue; the init unit only
//! exposes the interpreter entry symbol; the header publishes the
//! conversion declarations other units include. Output is deterministic:
//! the type set is sorted once by canonical key during base generation and
//! the sorted order is reused for the header.

use crate::error::GenError;
use crate::model::{self, Ast};
use crate::render;
use crate::translate::Module;
use crate::types::TypeDesc;

impl Module {
    /// The implementation body: wrapper functions, tables, type objects,
    /// `Ready()`/`Init()`, and the conversion definitions.
    pub fn generate_base(&mut self, ast: &Ast) -> Result<Vec<String>, GenError> {
        let mut out = Vec::new();
        let mut includes = vec!["PYTHON".to_string(), "pywrap/runtime.h".to_string()];
        if !ast.api_header.is_empty() {
            includes.push(ast.api_header.clone());
        }
        includes.extend(ast.extra_headers.iter().cloned());
        // Container templates calling PyObj* go last.
        includes.push("pywrap/stltypes.h".to_string());
        let wrap_ns = self.wrap_ns.clone();
        render::headlines(&mut out, &ast.source, &includes, &[], Some(&wrap_ns));
        out.push("using namespace pywrap;".to_string());
        out.extend(self.pc_table.clone());
        if model::have_enum(&ast.decls) {
            out.push(String::new());
            out.push("static PyObject *_Enum{}, *_IntEnum{};  // set below in Init()".to_string());
        }
        self.init.extend(ast.extra_init.iter().cloned());
        out.push(String::new());
        for d in &ast.decls {
            self.wrap_decl(&mut out, d, "")?;
        }
        if !self.frames_empty() {
            return Err(GenError::FrameStackNotEmpty);
        }
        out.push(String::new());
        out.push(String::new());
        out.push("// Initialize module".to_string());
        if !self.methods.is_empty() {
            let methods = self.methods.clone();
            render::method_def(&mut out, &self.opts, &methods);
        }
        // Class dict entries are wired after every type is ready.
        let mut dict_wiring = Vec::new();
        for (wtype, _, dict) in &self.types_init {
            for (n, o) in dict {
                dict_wiring.push(format!(
                    "if (PyDict_SetItemString({wtype}.tp_dict, \"{n}\", {o}) < 0) goto err;"
                ));
            }
        }
        self.init.extend(dict_wiring);
        render::ready_function(&mut out, &self.opts, &self.types_init);
        let docstring = if ast.docstring.is_empty() {
            format!("pywrap-generated module for {}", ast.api_header)
        } else {
            ast.docstring.clone()
        };
        render::init_function(
            &mut out,
            &self.opts,
            &self.path,
            &docstring,
            if self.methods.is_empty() { None } else { Some(render::METHODS_TABLE) },
            &self.init,
            &self.dict,
        );
        out.push(String::new());
        out.push(format!("}}  // namespace {}", self.wrap_ns));
        if !self.types.is_empty() {
            let mut sorted: Vec<TypeDesc> = self.types.iter().cloned().collect();
            sorted.sort_by_key(|t| t.order_key());
            let wrap_fq = format!("::{}", self.wrap_ns);
            for (ns, group) in namespace_groups(&sorted) {
                out.push(String::new());
                if let Some(open) = render::open_ns(ns) {
                    out.push(open);
                }
                if !ns.is_empty() && ns != "pywrap" {
                    out.push("using namespace ::pywrap;".to_string());
                }
                for t in group {
                    t.gen_converters(&mut out, &self.opts, &wrap_fq);
                }
                if let Some(close) = render::close_ns(ns) {
                    out.push(String::new());
                    out.push(close);
                }
            }
            self.sorted_types = sorted;
        }
        Ok(out)
    }

    /// The init unit: the interpreter-facing module entry symbol.
    pub fn generate_init(&self, source: &str) -> Vec<String> {
        let mut out = Vec::new();
        render::headlines(
            &mut out,
            source,
            &["PYTHON".to_string()],
            &[],
            Some(&self.wrap_ns),
        );
        out.push(String::new());
        out.push("bool Ready();".to_string());
        out.push("PyObject* Init();".to_string());
        out.push(String::new());
        out.push(format!("}}  // namespace {}", self.wrap_ns));
        render::py_mod_init_function(&mut out, &self.opts, &self.modname, &self.wrap_ns);
        out
    }

    /// The conversion header other wrapped units include.
    pub fn generate_header(&self, source: &str, api_header: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut includes = Vec::new();
        if !api_header.is_empty() {
            includes.push(api_header.to_string());
        }
        includes.push("pywrap/postconv.h".to_string());
        render::headlines(&mut out, source, &includes, &["memory"], None);
        if self.sorted_types.is_empty() {
            out.push("// This module defines no types.".to_string());
            return out;
        }
        for (ns, group) in namespace_groups(&self.sorted_types) {
            out.push(String::new());
            if let Some(open) = render::open_ns(ns) {
                out.push(open);
            }
            if !ns.is_empty() && ns != "pywrap" {
                out.push("using namespace ::pywrap;".to_string());
            }
            out.push(String::new());
            for t in group {
                t.gen_header(&mut out);
            }
            out.push(String::new());
            if let Some(close) = render::close_ns(ns) {
                out.push(close);
            }
        }
        out.push(String::new());
        out.push(format!(
            "// pywrap init_module if (PyObject* m = PyImport_ImportModule(\"{}\")) Py_DECREF(m);",
            self.path
        ));
        out.push("// pywrap init_module else goto err;".to_string());
        out
    }
}

/// Runs of consecutive descriptors sharing a C++ namespace. Input is sorted
/// by `namespace.pyname`, so same-namespace entries are adjacent.
fn namespace_groups(sorted: &[TypeDesc]) -> Vec<(&str, &[TypeDesc])> {
    let mut groups = Vec::new();
    let mut idx = 0;
    while idx < sorted.len() {
        let ns = sorted[idx].namespace();
        let end = sorted[idx..]
            .iter()
            .position(|t| t.namespace() != ns)
            .map(|p| idx + p)
            .unwrap_or(sorted.len());
        groups.push((ns, &sorted[idx..end]));
        idx = end;
    }
    groups
}
