//! Emitted-type descriptors.
//!
//! Each wrapped entity registers one descriptor describing the C++ API other
//! compilation units use to interoperate with it: object-from-native and
//! native-from-object conversions. Descriptors are collected in a set (the
//! same wrapped type can be re-introduced by array or smart-pointer
//! instantiations) and emitted in canonical sorted order, grouped by the
//! C++ namespace the native type lives in.

use crate::config::Options;
use crate::names;
use crate::render;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Class(ClassDesc),
    Enum(EnumDesc),
    Capsule(CapsuleDesc),
    Callable(CallableDesc),
}

/// C++ class wrapped as a Python type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassDesc {
    /// Fully qualified C++ class name.
    pub cname: String,
    /// Dotted Python path within the module (`Outer.Inner`).
    pub pyname: String,
    /// Wrapper struct, relative to the wrap namespace (`pyFoo::wrapper`).
    pub wclass: String,
    /// Wrapper type object (`pyFoo::wrapper_Type`).
    pub wtype: String,
    /// Wrapper namespace prefix (`pyFoo::`).
    pub wrapper_ns: String,
    pub can_copy: bool,
    pub can_destruct: bool,
    /// Replacement class this type stands in for (downcast source).
    pub down_cast: Option<String>,
    /// Overrider class, relative to the wrap namespace, when virtual.
    pub virtual_cls: Option<String>,
    pub namespace: String,
}

/// C++ enum surfaced as an `enum.Enum`/`enum.IntEnum` subclass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumDesc {
    pub cname: String,
    pub pyname: String,
    /// `Enum` or `IntEnum`.
    pub pytype: String,
    /// Cache variable holding the created class (`pyFoo::_Color`).
    pub wname: String,
    pub namespace: String,
}

/// Opaque forward declaration passed around as a type-tagged capsule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapsuleDesc {
    pub cname: String,
    pub pyname: String,
    pub namespace: String,
}

/// `std::function<>` handed to Python as a callable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallableDesc {
    /// The std::function spelling.
    pub cname: String,
    /// The Python signature (doc only).
    pub pyname: String,
    /// PyMethodDef of the capsule invoker, relative to the wrap namespace.
    pub defname: String,
    pub namespace: String,
}

impl TypeDesc {
    pub fn namespace(&self) -> &str {
        match self {
            TypeDesc::Class(c) => &c.namespace,
            TypeDesc::Enum(e) => &e.namespace,
            TypeDesc::Capsule(c) => &c.namespace,
            TypeDesc::Callable(c) => &c.namespace,
        }
    }

    fn pyname(&self) -> &str {
        match self {
            TypeDesc::Class(c) => &c.pyname,
            TypeDesc::Enum(e) => &e.pyname,
            TypeDesc::Capsule(c) => &c.pyname,
            TypeDesc::Callable(c) => &c.pyname,
        }
    }

    /// Canonical sort key: the backing set has no useful iteration order.
    pub fn order_key(&self) -> String {
        format!("{}.{}", self.namespace(), self.pyname())
    }

    /// Conversion declarations for the header artifact.
    pub fn gen_header(&self, out: &mut Vec<String>) {
        match self {
            TypeDesc::Class(c) => c.gen_header(out),
            TypeDesc::Enum(e) => e.gen_header(out),
            TypeDesc::Capsule(c) => c.gen_header(out),
            TypeDesc::Callable(c) => c.gen_header(out),
        }
    }

    /// Conversion definitions for the implementation body. `wrap_ns` is the
    /// unit-wide wrapper namespace the wrapper symbols live in.
    pub fn gen_converters(&self, out: &mut Vec<String>, opts: &Options, wrap_ns: &str) {
        match self {
            TypeDesc::Class(c) => c.gen_converters(out, opts, wrap_ns),
            TypeDesc::Enum(e) => e.gen_converters(out, opts, wrap_ns),
            TypeDesc::Capsule(c) => c.gen_converters(out, opts, wrap_ns),
            TypeDesc::Callable(c) => c.gen_converters(out, opts, wrap_ns),
        }
    }
}

fn use_marker(cname: &str, pyname: &str) -> String {
    format!("// pywrap use `{cname}` as {pyname}")
}

impl ClassDesc {
    /// `PyObjAs` output shapes: (C++ type, dereference for assignment).
    fn as_list(&self) -> Vec<(String, &'static str)> {
        let c = &self.cname;
        let mut v = vec![
            (format!("{c}*"), ""),
            (format!("std::shared_ptr<{c}>"), ""),
        ];
        if self.can_destruct {
            v.push((format!("std::unique_ptr<{c}>"), ""));
        }
        if self.can_copy && self.virtual_cls.is_none() {
            v.push((c.clone(), "*"));
            v.push((format!("std::optional<{c}>"), "*"));
        }
        if let Some(down) = &self.down_cast {
            v.push((format!("{down}*"), ""));
        }
        v
    }

    /// `PyObjFrom` argument shapes: (C++ type, nullable, init expression, deleted).
    fn from_list(&self) -> Vec<(String, bool, String, bool)> {
        let c = &self.cname;
        if self.virtual_cls.is_some() {
            // A virtual class instance can only come to life through its
            // Python constructor; no from-conversions.
            return Vec::new();
        }
        let mut v = vec![
            (
                format!("{c}*"),
                true,
                format!("::pywrap::Instance<{c}>(c, ::pywrap::UnOwnedResource());"),
                false,
            ),
            (
                format!("std::shared_ptr<{c}>"),
                true,
                format!("::pywrap::Instance<{c}>(c);"),
                false,
            ),
        ];
        if self.can_destruct {
            v.push((
                format!("std::unique_ptr<{c}>"),
                true,
                format!("::pywrap::Instance<{c}>(std::move(c));"),
                false,
            ));
        }
        if self.can_copy {
            v.push((
                format!("const {c}&"),
                false,
                format!("::pywrap::MakeShared<{c}>(c);"),
                false,
            ));
        } else {
            // Explicitly delete the pass-by-value signatures.
            v.push((format!("const {c}*"), false, String::new(), true));
            v.push((format!("const {c}&"), false, String::new(), true));
        }
        v
    }

    fn gen_header(&self, out: &mut Vec<String>) {
        out.push(use_marker(&self.cname, &self.pyname));
        for (arg, _) in self.as_list() {
            out.push(format!("bool PyObjAs(PyObject* input, {arg}* output);"));
        }
        for (arg, _, _, deleted) in self.from_list() {
            let del = if deleted { " = delete" } else { "" };
            out.push(format!("PyObject* PyObjFrom({arg}, py::PostConv){del};"));
        }
        if let Some(down) = &self.down_cast {
            out.push(format!("PyObject* PyObjFrom({down}&&, py::PostConv);"));
        }
    }

    fn gen_converters(&self, out: &mut Vec<String>, opts: &Options, ns: &str) {
        let i1 = opts.ind(1);
        let i2 = opts.ind(2);
        let c = &self.cname;
        let pytype = format!("{ns}::{}", self.wtype);
        let wobj = format!("{ns}::{}", self.wclass);
        let shared = format!("reinterpret_cast<{wobj}*>(py)->cpp");
        out.push(String::new());
        out.push(format!("// {} to/from {c} conversion", self.pyname));
        let down_arg = self.down_cast.as_ref().map(|d| format!("{d}*"));
        for (arg, deref) in self.as_list() {
            out.push(String::new());
            if Some(&arg) == down_arg.as_ref() {
                // Downcast: locate the wrapped base, then cast to the
                // replacement type.
                out.push(format!("bool PyObjAs(PyObject* py, {arg}* c) {{"));
                out.push(format!("{i1}assert(c != nullptr);"));
                out.push(format!(
                    "{i1}{c}* cpp = {ns}::{}ThisPtr(py);",
                    self.wrapper_ns
                ));
                out.push(format!("{i1}if (cpp == nullptr) return false;"));
                out.push(format!(
                    "{i1}*c = static_cast<{}>(cpp);",
                    arg
                ));
                out.push(format!("{i1}return true;"));
                out.push("}".to_string());
                continue;
            }
            out.push(format!("bool PyObjAs(PyObject* py, {arg}* c) {{"));
            out.push(format!("{i1}assert(c != nullptr);"));
            if arg.ends_with('*') {
                out.push(format!("{i1}if (Py_None == py) {{"));
                out.push(format!("{i2}*c = nullptr;"));
                out.push(format!("{i2}return true;"));
                out.push(format!("{i1}}}"));
            }
            out.push(format!(
                "{i1}{c}* cpp = {ns}::{}ThisPtr(py);",
                self.wrapper_ns
            ));
            out.push(format!("{i1}if (cpp == nullptr) return false;"));
            if arg.starts_with("std::unique_ptr<") {
                if let Some(_v) = &self.virtual_cls {
                    out.push(format!("{i1}auto& shared = {shared};"));
                    // Catch before ownership is renounced; afterwards the
                    // cpp pointer is no good.
                    out.push(format!("{i1}shared->HoldPyObj(py);"));
                    out.push(format!("{i1}if (!shared.Detach()) {{"));
                    out.push(format!("{i2}shared->DropPyObj();"));
                } else {
                    out.push(format!("{i1}if (!{shared}.Detach()) {{"));
                }
                out.push(format!(
                    "{i2}PyErr_SetString(PyExc_ValueError, \"Cannot convert {} \
                     instance to std::unique_ptr.\");",
                    self.pyname
                ));
                out.push(format!("{i2}return false;"));
                out.push(format!("{i1}}}"));
                out.push(format!("{i1}c->reset(cpp);"));
            } else if arg.starts_with("std::shared_ptr<") {
                if self.virtual_cls.is_some() {
                    out.push(format!("{i1}auto& shared = {shared};"));
                    out.push(format!(
                        "{i1}*c = ::pywrap::MakeSharedVirtual<{c}>(shared, py);"
                    ));
                } else {
                    out.push(format!("{i1}*c = ::pywrap::MakeStdShared({shared}, cpp);"));
                }
            } else {
                out.push(format!("{i1}*c = {deref}cpp;"));
            }
            out.push(format!("{i1}return true;"));
            out.push("}".to_string());
        }
        for (arg, nullable, init, deleted) in self.from_list() {
            if deleted {
                continue; // The overload is =deleted in the header.
            }
            out.push(String::new());
            out.push(format!(
                "PyObject* PyObjFrom({arg} c, py::PostConv unused) {{"
            ));
            if nullable {
                out.push(format!("{i1}if (c == nullptr) Py_RETURN_NONE;"));
            }
            out.push(format!(
                "{i1}PyObject* py = PyType_GenericNew(&{pytype}, nullptr, nullptr);"
            ));
            out.push(format!("{i1}{shared} = {init}"));
            out.push(format!("{i1}return py;"));
            out.push("}".to_string());
        }
        if let Some(down) = &self.down_cast {
            out.push(String::new());
            out.push(format!("PyObject* PyObjFrom({down}&& c, py::PostConv pc) {{"));
            out.push(format!(
                "{i1}return PyObjFrom(std::move(static_cast<{c}&&>(c)), pc);"
            ));
            out.push("}".to_string());
        }
    }
}

impl EnumDesc {
    /// Function creating the Enum-derived class and its cache variable.
    /// Emitted inline during traversal; `genw`/`varname` are scope-relative.
    pub fn create_enum(
        &self,
        out: &mut Vec<String>,
        opts: &Options,
        genw: &str,
        varname: &str,
        items: &[(String, i64)],
    ) {
        let i1 = opts.ind(1);
        let pystr = if opts.py3 {
            "PyUnicode_FromString"
        } else {
            "PyString_FromString"
        };
        let pyint = if opts.py3 {
            "PyLong_FromLong"
        } else {
            "PyInt_FromLong"
        };
        out.push(format!(
            "// Create Python Enum object (cached in {varname}) for {}",
            self.cname
        ));
        out.push(format!("static PyObject* {genw}() {{"));
        out.push(format!(
            "{i1}PyObject *py, *py_enum_class{{}}, *names = PyTuple_New({});",
            items.len()
        ));
        out.push(format!("{i1}if (names == nullptr) return nullptr;"));
        for (k, (name, value)) in items.iter().enumerate() {
            out.push(format!(
                "{i1}if ((py = Py_BuildValue(\"(NN)\", {pystr}(\"{name}\"), \
                 {pyint}({value}))) == nullptr) goto err;"
            ));
            out.push(format!("{i1}PyTuple_SET_ITEM(names, {k}, py);"));
        }
        out.push(format!("{i1}py = {pystr}(\"{}\");", self.pyname));
        out.push(format!(
            "{i1}py_enum_class = PyObject_CallFunctionObjArgs(_{}, py, names, nullptr);",
            self.pytype
        ));
        out.push(format!("{i1}Py_DECREF(py);"));
        out.push("err:".to_string());
        out.push(format!("{i1}Py_DECREF(names);"));
        out.push(format!("{i1}return py_enum_class;"));
        out.push("}".to_string());
        out.push(format!(
            "static PyObject* {varname}{{}};  // set by the above in Init()"
        ));
    }

    fn gen_header(&self, out: &mut Vec<String>) {
        out.push(use_marker(&self.cname, &self.pyname));
        out.push(format!(
            "bool PyObjAs(PyObject* input, {}* output);",
            self.cname
        ));
        out.push(format!(
            "PyObject* PyObjFrom(const {}&, py::PostConv);",
            self.cname
        ));
    }

    fn gen_converters(&self, out: &mut Vec<String>, opts: &Options, ns: &str) {
        let i1 = opts.ind(1);
        let i2 = opts.ind(2);
        let c = &self.cname;
        let wname = format!("{ns}::{}", self.wname);
        let underlying = names::enum_int_type(c);
        let pyint = if opts.py3 {
            "PyLong_FromLong"
        } else {
            "PyInt_FromLong"
        };
        out.push(String::new());
        out.push(format!(
            "// {}:{} to/from enum {c} conversion",
            self.pyname, self.pytype
        ));
        out.push(String::new());
        out.push(format!("bool PyObjAs(PyObject* py, {c}* c) {{"));
        out.push(format!("{i1}assert(c != nullptr);"));
        out.push(format!("{i1}if (!PyObject_IsInstance(py, {wname})) {{"));
        out.push(format!(
            "{i2}PyErr_Format(PyExc_TypeError, \"expecting enum {}, got %s %s\", \
             ClassName(py), ClassType(py));",
            self.pyname
        ));
        out.push(format!("{i2}return false;"));
        out.push(format!("{i1}}}"));
        out.push(format!("{i1}{underlying} v;"));
        out.push(format!(
            "{i1}PyObject* value = PyObject_GetAttrString(py, \"value\");"
        ));
        out.push(format!(
            "{i1}if (value == nullptr || !PyObjAs(value, &v)) return false;"
        ));
        out.push(format!("{i1}Py_DECREF(value);"));
        out.push(format!("{i1}*c = {};", names::as_type(c, "v")));
        out.push(format!("{i1}return true;"));
        out.push("}".to_string());
        out.push(String::new());
        out.push(format!(
            "PyObject* PyObjFrom(const {c}& c, py::PostConv) {{"
        ));
        out.push(format!(
            "{i1}return PyObject_CallFunctionObjArgs({wname}, {pyint}("
        ));
        out.push(format!(
            "{i1}{}{}), nullptr);",
            opts.ind(2),
            names::as_type(&underlying, "c")
        ));
        out.push("}".to_string());
    }
}

impl CapsuleDesc {
    fn gen_header(&self, out: &mut Vec<String>) {
        // Trailing '*' distinguishes the capsule type in included files.
        out.push(use_marker(&format!("{} *", self.cname), &self.pyname));
        out.push(format!(
            "bool PyObjAs(PyObject* input, {}** output);",
            self.cname
        ));
        out.push(format!(
            "PyObject* PyObjFrom(const {}*, py::PostConv);",
            self.cname
        ));
    }

    fn gen_converters(&self, out: &mut Vec<String>, opts: &Options, _ns: &str) {
        let i1 = opts.ind(1);
        let i2 = opts.ind(2);
        let c = &self.cname;
        out.push(String::new());
        out.push(format!("// {} to/from {c} conversion", self.pyname));
        out.push(String::new());
        out.push(format!("bool PyObjAs(PyObject* py, {c}** c) {{"));
        out.push(format!("{i1}assert(c != nullptr);"));
        out.push(format!("{i1}if (Py_None == py) {{"));
        out.push(format!("{i2}*c = nullptr;"));
        out.push(format!("{i2}return true;"));
        out.push(format!("{i1}}}"));
        out.push(format!("{i1}if (PyCapsule_CheckExact(py)) {{"));
        out.push(format!(
            "{i2}void* p = PyCapsule_GetPointer(py, C(\"{c}\"));"
        ));
        out.push(format!("{i2}bool ok = PyErr_Occurred() == nullptr;"));
        out.push(format!(
            "{i2}if (ok) *c = {};",
            names::as_type(&format!("{c}*"), "p")
        ));
        out.push(format!("{i2}return ok;"));
        out.push(format!("{i1}}}"));
        gen_base_capsule(out, opts, c, false);
        out.push(format!(
            "{i1}PyErr_Format(PyExc_TypeError, \"expecting {} capsule, got %s %s\", \
             ClassName(py), ClassType(py));",
            self.pyname
        ));
        out.push(format!("{i1}return false;"));
        out.push("}".to_string());
        out.push(String::new());
        out.push(format!(
            "PyObject* PyObjFrom(const {c}* c, py::PostConv) {{"
        ));
        out.push(format!("{i1}if (c == nullptr) Py_RETURN_NONE;"));
        out.push(format!(
            "{i1}return PyCapsule_New((void*)c, C(\"{c}\"), nullptr);"
        ));
        out.push("}".to_string());
    }
}

impl CallableDesc {
    fn gen_header(&self, out: &mut Vec<String>) {
        let title = if self.pyname.is_empty() {
            &self.cname
        } else {
            &self.pyname
        };
        out.push(format!("// {title}"));
        out.push(format!(
            "PyObject* PyObjFrom({}, py::PostConv);",
            self.cname
        ));
    }

    fn gen_converters(&self, out: &mut Vec<String>, opts: &Options, ns: &str) {
        let i1 = opts.ind(1);
        let c = &self.cname;
        out.push(String::new());
        out.push(format!(
            "// Create a Python function that calls {c} cfunction."
        ));
        out.push(format!(
            "PyObject* PyObjFrom({c} cfunction, py::PostConv) {{"
        ));
        out.push(format!("{i1}PyObject* f = FunctionCapsule(cfunction);"));
        out.push(format!("{i1}if (f == nullptr) return nullptr;"));
        out.push(format!(
            "{i1}PyObject* py = PyCFunction_New(&{ns}::{}, f);",
            self.defname
        ));
        out.push(format!("{i1}Py_DECREF(f);"));
        out.push(format!("{i1}return py;"));
        out.push("}".to_string());
    }
}

/// `ThisPtr()` — locate the wrapped native pointer behind a PyObject.
/// Final classes have a static offset; others may be derived Python-side
/// and go through the `as_<Base>` capsule protocol.
pub fn gen_this_pointer(out: &mut Vec<String>, opts: &Options, cname: &str, is_final: bool) {
    let i1 = opts.ind(1);
    let i2 = opts.ind(2);
    let i3 = opts.ind(3);
    let w = render::WRAPPER_CLASS;
    let t = format!("{w}_Type");
    let return_this = format!(
        "return ::pywrap::python::Get(reinterpret_cast<{w}*>(py)->cpp);"
    );
    out.push(String::new());
    out.push(format!("static {cname}* ThisPtr(PyObject* py) {{"));
    out.push(format!("{i1}if (Py_TYPE(py) == &{t}) {{"));
    out.push(format!("{i2}{return_this}"));
    out.push(format!("{i1}}}"));
    if !is_final {
        // py may be an instance of a derived class; try as_Base() where
        // Base is this class.
        gen_base_capsule(out, opts, cname, true);
        out.push(format!(
            "{i1}if (PyObject_IsInstance(py, {})) {{",
            names::as_py_obj(&t)
        ));
        out.push(format!("{i2}if (!base) {{"));
        out.push(format!("{i3}PyErr_Clear();"));
        out.push(format!("{i3}{return_this}"));
        out.push(format!("{i2}}}"));
        out.push(format!(
            "{i2}PyErr_Format(PyExc_ValueError, \"can't convert %s %s to {cname}*\", \
             ClassName(py), ClassType(py));"
        ));
        out.push(format!("{i1}}} else {{"));
        out.push(format!(
            "{i2}PyErr_Format(PyExc_TypeError, \"expecting %s instance, got %s %s\", \
             {t}.tp_name, ClassName(py), ClassType(py));"
        ));
        out.push(format!("{i1}}}"));
    } else {
        out.push(format!(
            "{i1}PyErr_Format(PyExc_TypeError, \"expecting %s instance, got %s %s\", \
             {t}.tp_name, ClassName(py), ClassType(py));"
        ));
    }
    out.push(format!("{i1}return nullptr;"));
    out.push("}".to_string());
}

/// The `as_<Base>()` capsule probe shared by `ThisPtr` and the capsule
/// converters. With `retptr` the found pointer is returned, otherwise it is
/// assigned to the caller's `*c`.
fn gen_base_capsule(out: &mut Vec<String>, opts: &Options, cname: &str, retptr: bool) {
    let i1 = opts.ind(1);
    let i2 = opts.ind(2);
    let i3 = opts.ind(3);
    let i4 = opts.ind(4);
    out.push(format!(
        "{i1}PyObject* base = PyObject_CallMethod(py, C(\"as_{}\"), nullptr);",
        names::mangle(cname)
    ));
    out.push(format!("{i1}if (base) {{"));
    out.push(format!("{i2}if (PyCapsule_CheckExact(base)) {{"));
    out.push(format!(
        "{i3}void* p = PyCapsule_GetPointer(base, C(\"{cname}\"));"
    ));
    out.push(format!("{i3}if (!PyErr_Occurred()) {{"));
    let cast = names::as_type(&format!("{cname}*"), "p");
    if retptr {
        out.push(format!("{i4}{cname}* c = {cast};"));
    } else {
        out.push(format!("{i4}*c = {cast};"));
    }
    out.push(format!("{i4}Py_DECREF(base);"));
    out.push(format!(
        "{i4}return {};",
        if retptr { "c" } else { "true" }
    ));
    out.push(format!("{i3}}}"));
    out.push(format!("{i2}}}"));
    out.push(format!("{i2}Py_DECREF(base);"));
    out.push(format!("{i1}}}"));
}
