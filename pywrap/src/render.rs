//! Text rendering — decided parameter lists and call expressions in,
//! C++ source lines out.
//!
//! Everything here is a pure function over already-made decisions: the
//! translators pick symbols, calling conventions, and call expressions, and
//! this module only formats them. Nothing in this module consults the
//! declaration tree or the frame stack.

use std::collections::HashMap;

use crate::config::Options;
use crate::model::{FuncDecl, Param};
use crate::names;
use crate::postconv;

pub const WRAPPER_CLASS: &str = "wrapper";
pub const OVERRIDER_CLASS: &str = "Overrider";
pub const METHODS_TABLE: &str = "Methods";
pub const GETSET_TABLE: &str = "Properties";
pub const NEW_ITER: &str = "new_iter";
pub const ITER_NEXT: &str = "iternext";
pub const VARARGS: &str = "METH_VARARGS | METH_KEYWORDS";
pub const NOARGS: &str = "METH_NOARGS";

/// One row of a method table.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub pyname: String,
    pub wrapper: String,
    pub flags: String,
    pub doc: String,
}

/// One row of a getset table.
#[derive(Debug, Clone)]
pub struct PropEntry {
    pub pyname: String,
    pub getter: String,
    /// `nullptr` for read-only properties.
    pub setter: String,
    pub doc: String,
}

/// Type-object slots decided by the class translator. Rendered in one fixed
/// order so identical inputs give identical output.
#[derive(Debug, Default)]
pub struct TpSlots {
    /// Quoted `"module.Qual.Name"` literal.
    pub tp_name: String,
    pub tp_flags: Vec<String>,
    pub tp_iter: Option<String>,
    pub tp_iternext: Option<String>,
    pub tp_getset: Option<String>,
    pub tp_methods: Option<String>,
    pub tp_call: Option<String>,
}

/// `C("escaped string")` — a non-const char* literal for the C API.
pub fn cstr(s: &str) -> String {
    format!("C(\"{}\")", escape(s))
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// File prologue: banner, includes, and the opening of the wrap namespace.
pub fn headlines(
    out: &mut Vec<String>,
    source: &str,
    includes: &[String],
    std_includes: &[&str],
    open_ns: Option<&str>,
) {
    out.push("// This file was automatically generated by pywrap.".to_string());
    out.push(format!("// source: {source}"));
    out.push(String::new());
    for inc in includes {
        if inc == "PYTHON" {
            out.push("#include <Python.h>".to_string());
        } else {
            out.push(format!("#include \"{inc}\""));
        }
    }
    for inc in std_includes {
        out.push(format!("#include <{inc}>"));
    }
    if let Some(ns) = open_ns {
        out.push(String::new());
        out.push(format!("namespace {ns} {{"));
    }
}

/// Open a possibly nested C++ namespace on one line. Empty namespace means
/// global scope: nothing to open.
pub fn open_ns(ns: &str) -> Option<String> {
    if ns.is_empty() {
        return None;
    }
    let opens: Vec<String> = ns.split("::").map(|n| format!("namespace {n} {{")).collect();
    Some(opens.join(" "))
}

pub fn close_ns(ns: &str) -> Option<String> {
    if ns.is_empty() {
        return None;
    }
    let count = ns.split("::").count();
    Some(format!("{}  // namespace {}", "}".repeat(count), ns))
}

/// The call expression a wrapper body invokes: optional setup statements,
/// then `call(args...)`.
#[derive(Debug, Clone)]
pub struct CallBody {
    pub setup: Vec<String>,
    pub call: String,
}

impl CallBody {
    pub fn expr(call: impl Into<String>) -> CallBody {
        CallBody {
            setup: Vec::new(),
            call: call.into(),
        }
    }
}

fn self_arg_type(cpp_type: &str) -> String {
    // `const Foo&` / `Foo&` → `Foo` for a pointer declaration.
    cpp_type
        .trim_start_matches("const ")
        .trim_end_matches('&')
        .trim()
        .to_string()
}

/// Render one wrapper function.
#[allow(clippy::too_many_arguments)]
pub fn function_call(
    out: &mut Vec<String>,
    opts: &Options,
    pyname: &str,
    wname: &str,
    f: &FuncDecl,
    varargs: bool,
    call: &CallBody,
    doc: &str,
    prepend_self: Option<&Param>,
    catch: bool,
    pc: &HashMap<String, String>,
) {
    let i1 = opts.ind(1);
    let i2 = opts.ind(2);
    out.push(String::new());
    if !doc.is_empty() {
        out.push(format!("// {doc}"));
    }
    if varargs {
        out.push(format!(
            "static PyObject* {wname}(PyObject* self, PyObject* args, PyObject* kw) {{"
        ));
    } else {
        out.push(format!("static PyObject* {wname}(PyObject* self) {{"));
    }

    let mut call_args: Vec<String> = Vec::new();
    if let Some(sp) = prepend_self {
        let ty = self_arg_type(&sp.ty.cpp_type);
        out.push(format!("{i1}{ty}* arg0;"));
        out.push(format!("{i1}if (!PyObjAs(self, &arg0)) return nullptr;"));
        call_args.push("*arg0".to_string());
    }
    if varargs && !f.params.is_empty() {
        let n = f.params.len();
        out.push(format!("{i1}PyObject* a[{n}]{{}};"));
        let name_list: Vec<String> = f
            .params
            .iter()
            .map(|p| format!("\"{}\"", p.name))
            .chain(std::iter::once("nullptr".to_string()))
            .collect();
        out.push(format!(
            "{i1}const char* names[] = {{{}}};",
            name_list.join(", ")
        ));
        let refs: Vec<String> = (0..n).map(|k| format!("&a[{k}]")).collect();
        out.push(format!(
            "{i1}if (!PyArg_ParseTupleAndKeywords(args, kw, \"{fmt}:{pyname}\", \
             const_cast<char**>(names), {refs})) return nullptr;",
            fmt = "O".repeat(n),
            refs = refs.join(", ")
        ));
        for (k, p) in f.params.iter().enumerate() {
            let argn = k + 1;
            out.push(format!("{i1}{} arg{argn};", p.ty.cpp_type));
            out.push(format!(
                "{i1}if (!PyObjAs(a[{k}], &arg{argn})) \
                 return ArgError(\"{pyname}\", names[{k}], \"{}\", a[{k}]);",
                escape(&p.ty.cpp_type)
            ));
            call_args.push(format!("std::move(arg{argn})"));
        }
    }

    let (body_i, close_catch) = if catch {
        out.push(format!("{i1}try {{"));
        (i2.clone(), true)
    } else {
        (i1.clone(), false)
    };

    for line in &call.setup {
        out.push(format!("{body_i}{line}"));
    }

    // Returns beyond the C++ return value are output parameters.
    let (from_ret, out_rets): (Option<&Param>, &[Param]) = if f.cpp_void_return {
        (None, &f.returns[..])
    } else if f.returns.is_empty() {
        (None, &[])
    } else {
        (Some(&f.returns[0]), &f.returns[1..])
    };
    for (k, r) in out_rets.iter().enumerate() {
        out.push(format!("{body_i}{} out{k};", r.ty.cpp_type));
        call_args.push(format!("&out{k}"));
    }
    let arglist = call_args.join(", ");

    let mut results: Vec<(String, String)> = Vec::new(); // (expr, postconv)
    match from_ret {
        None => {
            out.push(format!("{body_i}{}({arglist});", call.call));
        }
        Some(r) => {
            out.push(format!(
                "{body_i}{} ret0 = {}({arglist});",
                r.ty.cpp_type, call.call
            ));
            results.push((
                "std::move(ret0)".to_string(),
                postconv::initializer(&r.ty, pc),
            ));
        }
    }
    for (k, r) in out_rets.iter().enumerate() {
        results.push((
            format!("std::move(out{k})"),
            postconv::initializer(&r.ty, pc),
        ));
    }

    match results.len() {
        0 => out.push(format!("{body_i}Py_RETURN_NONE;")),
        1 => out.push(format!(
            "{body_i}return PyObjFrom({}, {});",
            results[0].0, results[0].1
        )),
        n => {
            let convs: Vec<String> = results
                .iter()
                .map(|(e, c)| format!("PyObjFrom({e}, {c})"))
                .collect();
            out.push(format!(
                "{body_i}return Py_BuildValue(\"({})\", {});",
                "N".repeat(n),
                convs.join(", ")
            ));
        }
    }
    if close_catch {
        out.push(format!("{i1}}} catch (const std::exception& e) {{"));
        out.push(format!("{i2}return ::pywrap::SetErrorFromException(e);"));
        out.push(format!("{i1}}}"));
    }
    out.push("}".to_string());
}

/// `__enter__` wrapper: run the guarded call, then hand back self.
pub fn ctxmgr_enter(
    out: &mut Vec<String>,
    opts: &Options,
    wname: &str,
    call: &CallBody,
    doc: &str,
    catch: bool,
) {
    let i1 = opts.ind(1);
    let i2 = opts.ind(2);
    out.push(String::new());
    if !doc.is_empty() {
        out.push(format!("// {doc}"));
    }
    out.push(format!("static PyObject* {wname}(PyObject* self) {{"));
    let body_i = if catch {
        out.push(format!("{i1}try {{"));
        i2.clone()
    } else {
        i1.clone()
    };
    for line in &call.setup {
        out.push(format!("{body_i}{line}"));
    }
    out.push(format!("{body_i}{}();", call.call));
    if catch {
        out.push(format!("{i1}}} catch (const std::exception& e) {{"));
        out.push(format!("{i2}return ::pywrap::SetErrorFromException(e);"));
        out.push(format!("{i1}}}"));
    }
    out.push(format!("{i1}Py_INCREF(self);"));
    out.push(format!("{i1}return self;"));
    out.push("}".to_string());
}

/// The wrapper struct holding the C++ payload.
pub fn wrapper_class_def(out: &mut Vec<String>, opts: &Options, is_iter: bool, cname: &str, ctype: &str) {
    let i1 = opts.ind(1);
    out.push(String::new());
    out.push(format!("struct {WRAPPER_CLASS} {{"));
    out.push(format!("{i1}PyObject_HEAD"));
    if is_iter {
        out.push(format!("{i1}::pywrap::Iterator<{cname}> iter;"));
    } else {
        out.push(format!("{i1}::pywrap::Instance<{ctype}> cpp;"));
    }
    out.push("};".to_string());
}

/// The shadow type that intercepts virtual calls and redirects them into
/// the Python override.
pub fn virtual_overrider(
    out: &mut Vec<String>,
    opts: &Options,
    pyname: &str,
    cname: &str,
    is_abstract: bool,
    vfuncs: &[FuncDecl],
    pc: &HashMap<String, String>,
) {
    let i1 = opts.ind(1);
    let i2 = opts.ind(2);
    let i3 = opts.ind(3);
    let base_id = names::ident(cname);
    out.push(String::new());
    out.push(format!(
        "struct {OVERRIDER_CLASS} : ::pywrap::PyObjRef, {cname} {{"
    ));
    out.push(format!("{i1}using {base_id}::{base_id};"));
    for f in vfuncs {
        let fname = names::ident(&f.name.cpp);
        let pyf = f.name.py.trim_end_matches(['@', '#']);
        let (ret, ret_pc) = match f.returns.first() {
            Some(r) if !f.cpp_void_return => {
                (r.ty.cpp_type.clone(), postconv::initializer(&r.ty, pc))
            }
            _ => ("void".to_string(), postconv::PASS.to_string()),
        };
        let sig: Vec<String> = f
            .params
            .iter()
            .enumerate()
            .map(|(k, p)| format!("{} a{k}", p.ty.cpp_type))
            .collect();
        let ptypes: Vec<String> = f.params.iter().map(|p| p.ty.cpp_type.clone()).collect();
        let pnames: Vec<String> = (0..f.params.len()).map(|k| format!("a{k}")).collect();
        out.push(String::new());
        out.push(format!(
            "{i1}{ret} {fname}({}) override {{",
            sig.join(", ")
        ));
        out.push(format!("{i2}::pywrap::SafeAttr impl(self(), \"{pyf}\");"));
        out.push(format!("{i2}if (impl.get()) {{"));
        let tlist: Vec<String> = std::iter::once(ret.clone()).chain(ptypes).collect();
        out.push(format!(
            "{i3}return ::pywrap::callback::Func<{}>(impl.get(), {ret_pc})({});",
            tlist.join(", "),
            pnames.join(", ")
        ));
        out.push(format!("{i2}}}"));
        if is_abstract {
            out.push(format!(
                "{i2}Py_FatalError(\"@virtual method {pyname}.{pyf} has no Python implementation.\");"
            ));
        } else if ret == "void" {
            out.push(format!("{i2}{base_id}::{fname}({});", pnames.join(", ")));
        } else {
            out.push(format!(
                "{i2}return {base_id}::{fname}({});",
                pnames.join(", ")
            ));
        }
        out.push(format!("{i1}}}"));
    }
    out.push("};".to_string());
}

/// A method table.
pub fn method_def(out: &mut Vec<String>, opts: &Options, methods: &[MethodEntry]) {
    let i1 = opts.ind(1);
    out.push(String::new());
    out.push(format!("static PyMethodDef {METHODS_TABLE}[] = {{"));
    for m in methods {
        out.push(format!(
            "{i1}{{{}, reinterpret_cast<PyCFunction>({}), {}, {}}},",
            cstr(&m.pyname),
            m.wrapper,
            m.flags,
            cstr(&m.doc)
        ));
    }
    out.push(format!("{i1}{{}}"));
    out.push("};".to_string());
}

/// A getset table.
pub fn getset_def(out: &mut Vec<String>, opts: &Options, props: &[PropEntry]) {
    let i1 = opts.ind(1);
    out.push(String::new());
    out.push(format!("static PyGetSetDef {GETSET_TABLE}[] = {{"));
    for p in props {
        out.push(format!(
            "{i1}{{{}, {}, {}, {}}},",
            cstr(&p.pyname),
            p.getter,
            p.setter,
            cstr(&p.doc)
        ));
    }
    out.push(format!("{i1}{{}}"));
    out.push("};".to_string());
}

/// A variable/property getter. `base_guard` is None for final classes
/// (static offset, direct access).
#[allow(clippy::too_many_arguments)]
pub fn var_getter(
    out: &mut Vec<String>,
    opts: &Options,
    getter: &str,
    unproperty: bool,
    base_guard: bool,
    cvar: &str,
    pc: &str,
    get_nested: bool,
) {
    let i1 = opts.ind(1);
    out.push(String::new());
    if unproperty {
        out.push(format!("static PyObject* {getter}(PyObject* self) {{"));
    } else {
        out.push(format!(
            "static PyObject* {getter}(PyObject* self, void* xdata) {{"
        ));
    }
    if base_guard {
        out.push(format!("{i1}auto cpp = ThisPtr(self);"));
        out.push(format!("{i1}if (!cpp) return nullptr;"));
    }
    let amp = if get_nested { "&" } else { "" };
    out.push(format!("{i1}return PyObjFrom({amp}{cvar}, {pc});"));
    out.push("}".to_string());
}

/// A variable/property setter. `set_call` names the C++ setter method to
/// invoke; otherwise the member is assigned directly.
#[allow(clippy::too_many_arguments)]
pub fn var_setter(
    out: &mut Vec<String>,
    opts: &Options,
    setter: &str,
    unproperty: bool,
    base_guard: bool,
    cvar: &str,
    value_type: &str,
    set_call: Option<&str>,
    pyname: &str,
) {
    let i1 = opts.ind(1);
    let i2 = opts.ind(2);
    let fail = if unproperty { "nullptr" } else { "-1" };
    out.push(String::new());
    if unproperty {
        out.push(format!(
            "static PyObject* {setter}(PyObject* self, PyObject* value) {{"
        ));
    } else {
        out.push(format!(
            "static int {setter}(PyObject* self, PyObject* value, void* xdata) {{"
        ));
        out.push(format!("{i1}if (value == nullptr) {{"));
        out.push(format!(
            "{i2}PyErr_SetString(PyExc_TypeError, \"can't delete {pyname} attribute\");"
        ));
        out.push(format!("{i2}return -1;"));
        out.push(format!("{i1}}}"));
    }
    if base_guard {
        out.push(format!("{i1}auto cpp = ThisPtr(self);"));
        out.push(format!("{i1}if (!cpp) return {fail};"));
    }
    out.push(format!("{i1}{value_type} v;"));
    out.push(format!("{i1}if (!PyObjAs(value, &v)) return {fail};"));
    match set_call {
        Some(call) => out.push(format!("{i1}{call}(std::move(v));")),
        None => out.push(format!("{i1}{cvar} = std::move(v);")),
    }
    if unproperty {
        out.push(format!("{i1}Py_RETURN_NONE;"));
    } else {
        out.push(format!("{i1}return 0;"));
    }
    out.push("}".to_string());
}

/// Upcast helper: hand out the base-class pointer as a type-tagged capsule.
pub fn cast_as_capsule(out: &mut Vec<String>, opts: &Options, cppobj: &str, base: &str, wname: &str) {
    let i1 = opts.ind(1);
    out.push(String::new());
    out.push(format!("// Upcast to {base}*"));
    out.push(format!("static PyObject* {wname}(PyObject* self) {{"));
    out.push(format!("{i1}{base}* p = ::pywrap::python::Get({cppobj});"));
    out.push(format!("{i1}if (p == nullptr) return nullptr;"));
    out.push(format!(
        "{i1}return PyCapsule_New(static_cast<void*>(p), C(\"{base}\"), nullptr);"
    ));
    out.push("}".to_string());
}

/// The `tp_iter` slot of a class with a nested `__iter__`.
pub fn new_iter(
    out: &mut Vec<String>,
    opts: &Options,
    cppobj: &str,
    iter_cname: &str,
    iter_wrapper: &str,
    iter_wtype: &str,
) {
    let i1 = opts.ind(1);
    out.push(String::new());
    out.push(format!("static PyObject* {NEW_ITER}(PyObject* self) {{"));
    out.push(format!(
        "{i1}PyObject* it = PyType_GenericNew(&{iter_wtype}, nullptr, nullptr);"
    ));
    out.push(format!("{i1}if (it == nullptr) return nullptr;"));
    out.push(format!(
        "{i1}new(&reinterpret_cast<{iter_wrapper}*>(it)->iter) \
         ::pywrap::Iterator<{iter_cname}>({cppobj});"
    ));
    out.push(format!("{i1}return it;"));
    out.push("}".to_string());
}

/// The `tp_iternext` advance slot.
pub fn iter_next(out: &mut Vec<String>, opts: &Options, cppiter: &str, release_gil: bool, pc: &str) {
    let i1 = opts.ind(1);
    out.push(String::new());
    out.push(format!("static PyObject* {ITER_NEXT}(PyObject* self) {{"));
    if release_gil {
        out.push(format!("{i1}decltype({cppiter}.Next()) v;"));
        out.push(format!("{i1}Py_BEGIN_ALLOW_THREADS"));
        out.push(format!("{i1}v = {cppiter}.Next();"));
        out.push(format!("{i1}Py_END_ALLOW_THREADS"));
    } else {
        out.push(format!("{i1}auto* v = {cppiter}.Next();"));
    }
    out.push(format!("{i1}return v ? PyObjFrom(*v, {pc}) : nullptr;"));
    out.push("}".to_string());
}

/// A PyMethodDef for a capsule-bound callable invoker.
pub fn from_function_def(
    out: &mut Vec<String>,
    opts: &Options,
    defname: &str,
    wname: &str,
    meth: &str,
    doc: &str,
) {
    let i1 = opts.ind(1);
    out.push(String::new());
    out.push(format!("static PyMethodDef {defname} = {{"));
    out.push(format!(
        "{i1}{}, reinterpret_cast<PyCFunction>({wname}), {meth}, {}",
        cstr("__call__"),
        cstr(doc)
    ));
    out.push("};".to_string());
}

/// Type object plus the constructor/destructor glue it references.
#[allow(clippy::too_many_arguments)]
pub fn type_object(
    out: &mut Vec<String>,
    opts: &Options,
    slots: &TpSlots,
    pyname: &str,
    ctor: Option<&str>,
    docstring: &str,
    fqclassname: &str,
    need_dtor: bool,
    iterator: Option<&str>,
    subst_cpp_ptr: Option<&str>,
) {
    let i1 = opts.ind(1);
    let i2 = opts.ind(2);
    let need_dealloc = need_dtor || iterator.is_some();
    if need_dealloc {
        out.push(String::new());
        out.push("static void _dealloc(PyObject* self) {".to_string());
        match iterator {
            Some(it) => {
                out.push(format!("{i1}using ::pywrap::Iterator;"));
                out.push(format!("{i1}{it}.~Iterator();"));
            }
            None => {
                out.push(format!(
                    "{i1}{}.Destruct();",
                    names::get_cpp_obj("cpp", "self")
                ));
            }
        }
        out.push(format!("{i1}Py_TYPE(self)->tp_free(self);"));
        out.push("}".to_string());
    }
    match ctor {
        Some("DEF") => {
            let target = subst_cpp_ptr.unwrap_or(fqclassname);
            out.push(String::new());
            out.push(
                "static int _ctor(PyObject* self, PyObject* args, PyObject* kw) {".to_string(),
            );
            out.push(format!(
                "{i1}if ((args && PyTuple_GET_SIZE(args) != 0) || (kw && PyDict_Size(kw) != 0)) {{"
            ));
            out.push(format!(
                "{i2}PyErr_SetString(PyExc_TypeError, \"{pyname} takes no parameters\");"
            ));
            out.push(format!("{i2}return -1;"));
            out.push(format!("{i1}}}"));
            out.push(format!(
                "{i1}{} = ::pywrap::MakeShared<{target}>();",
                names::get_cpp_obj("cpp", "self")
            ));
            if subst_cpp_ptr.is_some() {
                out.push(format!(
                    "{i1}{}->::pywrap::PyObjRef::Init(self);",
                    names::get_cpp_obj("cpp", "self")
                ));
            }
            out.push(format!("{i1}return 0;"));
            out.push("}".to_string());
        }
        Some(init_wrapper) => {
            out.push(String::new());
            out.push(
                "static int _ctor(PyObject* self, PyObject* args, PyObject* kw) {".to_string(),
            );
            out.push(format!("{i1}PyObject* init = {init_wrapper}(self, args, kw);"));
            out.push(format!("{i1}Py_XDECREF(init);"));
            if subst_cpp_ptr.is_some() {
                out.push(format!("{i1}if (init == nullptr) return -1;"));
                // Init here, not inside __init__: the GIL may be released
                // during the C++ constructor call.
                out.push(format!(
                    "{i1}{}->::pywrap::PyObjRef::Init(self);",
                    names::get_cpp_obj("cpp", "self")
                ));
                out.push(format!("{i1}return 0;"));
            } else {
                out.push(format!("{i1}return init ? 0 : -1;"));
            }
            out.push("}".to_string());
        }
        None => {}
    }
    out.push(String::new());
    out.push(format!("// Python type object for {pyname} ({fqclassname})"));
    out.push(format!("PyTypeObject {WRAPPER_CLASS}_Type = {{"));
    out.push(format!("{i1}PyVarObject_HEAD_INIT(nullptr, 0)"));
    out.push(format!("{i1}.tp_name = {},", slots.tp_name));
    out.push(format!("{i1}.tp_basicsize = sizeof({WRAPPER_CLASS}),"));
    if need_dealloc {
        out.push(format!("{i1}.tp_dealloc = _dealloc,"));
    }
    out.push(format!("{i1}.tp_flags = {},", slots.tp_flags.join(" | ")));
    if !docstring.is_empty() {
        out.push(format!("{i1}.tp_doc = {},", cstr(docstring)));
    }
    if let Some(call) = &slots.tp_call {
        out.push(format!("{i1}.tp_call = {call},"));
    }
    if let Some(iter) = &slots.tp_iter {
        out.push(format!("{i1}.tp_iter = {iter},"));
    }
    if let Some(next) = &slots.tp_iternext {
        out.push(format!("{i1}.tp_iternext = {next},"));
    }
    if let Some(methods) = &slots.tp_methods {
        out.push(format!("{i1}.tp_methods = {methods},"));
    }
    if let Some(getset) = &slots.tp_getset {
        out.push(format!("{i1}.tp_getset = {getset},"));
    }
    if ctor.is_some() {
        out.push(format!("{i1}.tp_init = _ctor,"));
        out.push(format!("{i1}.tp_new = PyType_GenericNew,"));
    }
    out.push("};".to_string());
}

/// `Ready()` — wire bases and ready every wrapped type in declaration order
/// (bases were registered before the classes deriving from them).
pub fn ready_function(
    out: &mut Vec<String>,
    opts: &Options,
    types_init: &[(String, Option<String>, Vec<(String, String)>)],
) {
    let i1 = opts.ind(1);
    let i2 = opts.ind(2);
    out.push(String::new());
    out.push("bool Ready() {".to_string());
    for (wtype, base, _) in types_init {
        if let Some(base) = base {
            if base.contains('.') {
                // Base class wrapped by another module: resolve at runtime.
                out.push(format!("{i1}{{"));
                out.push(format!("{i2}PyObject* base = ImportFQName(\"{base}\");"));
                out.push(format!("{i2}if (base == nullptr) return false;"));
                out.push(format!(
                    "{i2}{wtype}.tp_base = reinterpret_cast<PyTypeObject*>(base);"
                ));
                out.push(format!("{i1}}}"));
            } else {
                out.push(format!("{i1}{wtype}.tp_base = &{base};"));
            }
        }
        out.push(format!("{i1}if (PyType_Ready(&{wtype}) < 0) return false;"));
        out.push(format!(
            "{i1}Py_INCREF(&{wtype});  // For PyModule_AddObject to steal."
        ));
    }
    out.push(format!("{i1}return true;"));
    out.push("}".to_string());
}

/// `Init()` — create the module object and populate its dictionary.
pub fn init_function(
    out: &mut Vec<String>,
    opts: &Options,
    path: &str,
    docstring: &str,
    methods_table: Option<&str>,
    init_lines: &[String],
    dict: &[(String, String)],
) {
    let i1 = opts.ind(1);
    let needs_err =
        !dict.is_empty() || init_lines.iter().any(|l| l.contains("err"));
    out.push(String::new());
    if opts.py3 {
        out.push("static struct PyModuleDef Module = {".to_string());
        out.push(format!("{i1}PyModuleDef_HEAD_INIT,"));
        out.push(format!("{i1}\"{path}\","));
        out.push(format!("{i1}{},", cstr(docstring)));
        out.push(format!("{i1}-1,  // module keeps state in global variables"));
        out.push(format!("{i1}{}", methods_table.unwrap_or("nullptr")));
        out.push("};".to_string());
        out.push(String::new());
        out.push("PyObject* Init() {".to_string());
        out.push(format!("{i1}PyObject* module = PyModule_Create(&Module);"));
        out.push(format!("{i1}if (!module) return nullptr;"));
    } else {
        out.push("PyObject* Init() {".to_string());
        out.push(format!(
            "{i1}PyObject* module = Py_InitModule3(\"{path}\", {}, {});",
            methods_table.unwrap_or("nullptr"),
            cstr(docstring)
        ));
        out.push(format!("{i1}if (!module) return nullptr;"));
    }
    for line in init_lines {
        out.push(format!("{i1}{line}"));
    }
    for (name, obj) in dict {
        out.push(format!(
            "{i1}if (PyModule_AddObject(module, \"{name}\", {obj}) < 0) goto err;"
        ));
    }
    out.push(format!("{i1}return module;"));
    if needs_err {
        out.push("err:".to_string());
        out.push(format!("{i1}Py_DECREF(module);"));
        out.push(format!("{i1}return nullptr;"));
    }
    out.push("}".to_string());
}

/// The interpreter-facing module init entry symbol.
pub fn py_mod_init_function(out: &mut Vec<String>, opts: &Options, modname: &str, ns: &str) {
    let i1 = opts.ind(1);
    out.push(String::new());
    if opts.py3 {
        out.push(format!("PyMODINIT_FUNC PyInit_{modname}() {{"));
        out.push(format!("{i1}if (!{ns}::Ready()) return nullptr;"));
        out.push(format!("{i1}return {ns}::Init();"));
        out.push("}".to_string());
    } else {
        out.push(format!("PyMODINIT_FUNC init{modname}() {{"));
        out.push(format!("{i1}if ({ns}::Ready()) {ns}::Init();"));
        out.push("}".to_string());
    }
}
