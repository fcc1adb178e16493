//! Declaration-tree traversal.
//!
//! [`Module`] walks the tree depth first, keeping the nested class scopes on
//! an explicit [`Frame`] stack. Entering a class opens a C++ namespace in
//! the output and pushes a frame; every member then accumulates rows in the
//! frame (method table, getset table, class dict) while its wrapper function
//! is emitted in place. Leaving the class folds the frame: tables, the type
//! object, and the `ThisPtr` locator are rendered, the namespace closes, and
//! the finished type registers itself with the module.
//!
//! The tree itself is never mutated. Where a declaration needs rewriting
//! (constructor synthesis, implicit virtual flags) the node is cloned first
//! and the clone is rewritten.

use std::collections::{HashMap, HashSet};

use crate::config::Options;
use crate::error::GenError;
use crate::model::{Base, ClassDecl, ConstDecl, Decl, EnumDecl, ForwardDecl, FuncDecl, Param,
                   TypeSpec, VarDecl};
use crate::names;
use crate::postconv;
use crate::render::{self, CallBody, MethodEntry, PropEntry};
use crate::types::{CallableDesc, CapsuleDesc, ClassDesc, EnumDesc, TypeDesc};

const ITER_KW: &str = "__iter__";

/// One nested class scope.
struct Frame {
    /// C++ identifier of the class.
    name: String,
    /// Fully qualified C++ name.
    fqname: String,
    pyname: String,
    /// Generated namespace this class opens (`pyFoo`).
    class_ns: String,
    is_final: bool,
    methods: Vec<MethodEntry>,
    properties: Vec<PropEntry>,
    /// Class attributes wired into `tp_dict` at init (nested types, enums,
    /// class constants).
    dict: Vec<(String, String)>,
    /// Wrapper symbols claimed in this scope.
    symbols: HashSet<String>,
}

impl Frame {
    fn new(name: &str, pyname: &str, fqname: &str, is_final: bool) -> Frame {
        Frame {
            name: name.to_string(),
            fqname: fqname.to_string(),
            pyname: pyname.to_string(),
            class_ns: names::class_namespace(pyname),
            is_final,
            methods: Vec::new(),
            properties: Vec::new(),
            dict: Vec::new(),
            symbols: HashSet::new(),
        }
    }
}

/// Traversal state for one compilation unit.
pub struct Module {
    pub(crate) opts: Options,
    /// Full dotted module path.
    pub(crate) path: String,
    /// Last path component, names the init entry symbol and output files.
    pub(crate) modname: String,
    pub(crate) wrap_ns: String,
    /// lang_type → `_N` post-conversion index.
    pub(crate) pc: HashMap<String, String>,
    /// The rendered `#define _N` table.
    pub(crate) pc_table: Vec<String>,
    pub(crate) types: HashSet<TypeDesc>,
    /// Filled once by base generation, reused for the header.
    pub(crate) sorted_types: Vec<TypeDesc>,
    /// Per wrapped type: (type object, base, tp_dict entries), in
    /// declaration order so bases ready before derived classes.
    pub(crate) types_init: Vec<(String, Option<String>, Vec<(String, String)>)>,
    pub(crate) methods: Vec<MethodEntry>,
    pub(crate) dict: Vec<(String, String)>,
    pub(crate) init: Vec<String>,
    pub(crate) enums: bool,
    pub(crate) catch: bool,
    symbols: HashSet<String>,
    frames: Vec<Frame>,
}

impl Module {
    pub fn new(
        path: &str,
        typemap: &HashMap<String, String>,
        catch_exceptions: bool,
        opts: Options,
    ) -> Module {
        let modname = path.rsplit('.').next().unwrap_or(path).to_string();
        let (pc_table, pc) = postconv::gen_table(typemap);
        Module {
            opts,
            path: path.to_string(),
            modname,
            wrap_ns: names::wrap_namespace(path),
            pc,
            pc_table,
            types: HashSet::new(),
            sorted_types: Vec::new(),
            types_init: Vec::new(),
            methods: Vec::new(),
            dict: Vec::new(),
            init: Vec::new(),
            enums: false,
            catch: catch_exceptions,
            symbols: HashSet::new(),
            frames: Vec::new(),
        }
    }

    pub(crate) fn frames_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Python path of the innermost scope (plus `leaf` when given).
    fn qualname(&self, leaf: &str) -> String {
        let mut parts: Vec<&str> = self.frames.iter().map(|f| f.pyname.as_str()).collect();
        if !leaf.is_empty() {
            parts.push(leaf);
        }
        parts.join(".")
    }

    /// Wrapper-realm path of `name` relative to the unit namespace.
    fn wrap_path(&self, name: &str) -> String {
        let mut parts: Vec<&str> = self.frames.iter().map(|f| f.class_ns.as_str()).collect();
        parts.push(name);
        parts.join("::")
    }

    fn push_method(&mut self, m: MethodEntry) {
        match self.frames.last_mut() {
            Some(f) => f.methods.push(m),
            None => self.methods.push(m),
        }
    }

    fn dict_mut(&mut self) -> &mut Vec<(String, String)> {
        match self.frames.last_mut() {
            Some(f) => &mut f.dict,
            None => &mut self.dict,
        }
    }

    fn claim_symbol(&mut self, sym: &str) -> Result<(), GenError> {
        let scope = match self.frames.last() {
            Some(f) => f.pyname.clone(),
            None => self.modname.clone(),
        };
        let set = match self.frames.last_mut() {
            Some(f) => &mut f.symbols,
            None => &mut self.symbols,
        };
        if !set.insert(sym.to_string()) {
            return Err(GenError::DuplicateSymbol(sym.to_string(), scope));
        }
        Ok(())
    }

    pub fn wrap_decl(
        &mut self,
        out: &mut Vec<String>,
        d: &Decl,
        parent_ns: &str,
    ) -> Result<(), GenError> {
        tracing::debug!(kind = decl_kind(d), "wrapping declaration");
        match d {
            Decl::Class(c) => {
                let ns = if c.namespace.is_empty() { parent_ns } else { &c.namespace };
                self.wrap_class(out, c, ns)
            }
            Decl::Enum(e) => {
                let ns = if e.namespace.is_empty() { parent_ns } else { &e.namespace };
                self.wrap_enum(out, e, ns);
                Ok(())
            }
            Decl::Var(v) => self.wrap_var(out, v),
            Decl::Const(c) => {
                self.wrap_const(c);
                Ok(())
            }
            Decl::Func(f) => self.wrap_func(out, f),
            Decl::Capsule(p) => {
                let ns = if p.namespace.is_empty() { parent_ns } else { &p.namespace };
                self.wrap_capsule(p, ns);
                Ok(())
            }
        }
    }

    fn wrap_func(&mut self, out: &mut Vec<String>, func: &FuncDecl) -> Result<(), GenError> {
        let mut f = func.clone();
        let cname = names::ident(&f.name.cpp).to_string();
        let stripped = f.name.py.trim_end_matches('#').to_string();
        let (pyname, ctxmgr) = match stripped.strip_suffix('@') {
            Some(p) => (p.to_string(), Some(stripped.clone())),
            None => (stripped.clone(), None),
        };
        let in_class = !self.frames.is_empty();
        let wrapper_name = if in_class && cname.starts_with("operator") {
            format!("wrap{pyname}")
        } else if in_class && pyname == "__init__" {
            let fq = self.frames.last().map(|fr| fr.fqname.as_str());
            names::ctor_symbol(fq.unwrap_or(&cname))
        } else {
            names::wrapper_symbol(&f.name.cpp, &pyname)
        };
        self.claim_symbol(&wrapper_name)?;
        if f.ignore_return_value {
            if f.returns.len() >= 2 {
                return Err(GenError::IgnoredReturnCount(pyname, f.returns.len()));
            }
            f.returns.clear();
        }
        for r in &mut f.returns {
            if let Some(cb) = &r.ty.callable {
                if r.ty.cpp_type.is_empty() {
                    r.ty.cpp_type = std_function_spelling(cb);
                }
            }
        }
        let rets = f.returns.clone();
        for (i, r) in rets.iter().enumerate() {
            if r.ty.callable.is_some() {
                self.wrap_callable(out, &r.ty, &cname, i)?;
            }
        }
        let self_param = if f.cpp_opfunction && !f.params.is_empty() {
            Some(f.params.remove(0))
        } else {
            None
        };
        let meth = if let Some(marker) = &ctxmgr {
            if f.classmethod {
                return Err(GenError::CtxMgrClassmethod(pyname));
            }
            // __exit__ always receives (type, value, traceback); __enter__
            // never receives anything.
            if marker == "__exit__@" { render::VARARGS } else { render::NOARGS }
        } else if f.params.is_empty() {
            render::NOARGS
        } else {
            render::VARARGS
        };
        let call = self.function_call_expr(&mut f, &cname, &pyname)?;
        let doc_line = f.docstring.lines().next().unwrap_or("").to_string();
        let catch = self.catch && !f.noexcept;
        if ctxmgr.as_deref() == Some("__enter__@") {
            render::ctxmgr_enter(out, &self.opts, &wrapper_name, &call, &doc_line, catch);
        } else {
            render::function_call(
                out,
                &self.opts,
                &pyname,
                &wrapper_name,
                &f,
                meth == render::VARARGS,
                &call,
                &doc_line,
                self_param.as_ref(),
                catch,
                &self.pc,
            );
        }
        let mut flags = meth.to_string();
        if f.classmethod {
            flags.push_str(" | METH_CLASS");
        }
        self.push_method(MethodEntry {
            pyname,
            wrapper: wrapper_name,
            flags,
            doc: f.docstring.clone(),
        });
        Ok(())
    }

    /// The C++ expression a wrapper body invokes, with any setup statements.
    fn function_call_expr(
        &self,
        f: &mut FuncDecl,
        cname: &str,
        pyname: &str,
    ) -> Result<CallBody, GenError> {
        let Some(frame) = self.frames.last() else {
            return Ok(CallBody::expr(f.name.cpp.clone()));
        };
        if f.classmethod {
            return Ok(CallBody::expr(f.name.cpp.clone()));
        }
        let cpp = names::get_cpp_obj("cpp", "self");
        if f.constructor {
            if !f.returns.is_empty() {
                return Err(GenError::ConstructorReturns(pyname.to_string()));
            }
            let target = if f.is_virtual {
                render::OVERRIDER_CLASS.to_string()
            } else {
                frame.fqname.clone()
            };
            if pyname == "__init__" {
                // C++ constructors do not return anything.
                f.cpp_void_return = true;
                return Ok(CallBody::expr(format!(
                    "{cpp} = ::pywrap::MakeShared<{target}>"
                )));
            }
            // Additional constructors become classmethod factories
            // returning a new instance.
            f.classmethod = true;
            f.cpp_void_return = false;
            f.returns = vec![Param {
                name: String::new(),
                ty: TypeSpec {
                    lang_type: frame.pyname.clone(),
                    cpp_type: format!("std::unique_ptr<{target}>"),
                    ..Default::default()
                },
            }];
            return Ok(CallBody::expr(format!("std::make_unique<{target}>")));
        }
        if f.cpp_opfunction {
            return Ok(CallBody::expr(f.name.cpp.clone()));
        }
        if frame.is_final {
            Ok(CallBody::expr(format!("{cpp}->{cname}")))
        } else {
            // A derived Python instance may hold the payload elsewhere;
            // locate it first. Virtual methods call the named class
            // implementation, not the override.
            let qual = if f.is_virtual {
                format!("{}::", frame.name)
            } else {
                String::new()
            };
            Ok(CallBody {
                setup: vec![
                    format!("{}* c = ThisPtr(self);", frame.fqname),
                    "if (!c) return nullptr;".to_string(),
                ],
                call: format!("c->{qual}{cname}"),
            })
        }
    }

    /// Wrap a `std::function` return value: an invoker over a type-tagged
    /// capsule plus its PyMethodDef, registered as a callable type.
    fn wrap_callable(
        &mut self,
        out: &mut Vec<String>,
        t: &TypeSpec,
        fname: &str,
        retnum: usize,
    ) -> Result<(), GenError> {
        let Some(callable) = &t.callable else {
            return Ok(());
        };
        let id = names::ident(&callable.name.cpp);
        let cname = if id.is_empty() {
            format!("{fname}_ret{retnum}_lambda")
        } else {
            id.to_string()
        };
        let wname = format!("lambda_{cname}");
        let mut cb = (**callable).clone();
        for r in &mut cb.returns {
            if let Some(inner) = &r.ty.callable {
                if r.ty.cpp_type.is_empty() {
                    r.ty.cpp_type = std_function_spelling(inner);
                }
            }
        }
        let rets = cb.returns.clone();
        for (i, r) in rets.iter().enumerate() {
            if r.ty.callable.is_some() {
                self.wrap_callable(out, &r.ty, &cname, i)?;
            }
        }
        let cpp_type = if t.cpp_type.is_empty() {
            std_function_spelling(callable)
        } else {
            t.cpp_type.clone()
        };
        let call = CallBody {
            setup: vec![
                format!("void* fp = PyCapsule_GetPointer(self, typeid({cpp_type}).name());"),
                "if (fp == nullptr) return nullptr;".to_string(),
            ],
            call: format!("(*static_cast<{cpp_type}*>(fp))"),
        };
        let varargs = !cb.params.is_empty();
        render::function_call(
            out,
            &self.opts,
            &cname,
            &wname,
            &cb,
            varargs,
            &call,
            &t.lang_type,
            None,
            self.catch && !cb.noexcept,
            &self.pc,
        );
        let defname = format!("{wname}_def");
        render::from_function_def(
            out,
            &self.opts,
            &defname,
            &wname,
            if varargs { render::VARARGS } else { render::NOARGS },
            &format!("Calls {cpp_type}"),
        );
        self.types.insert(TypeDesc::Callable(CallableDesc {
            cname: cpp_type,
            pyname: t.lang_type.clone(),
            defname,
            namespace: String::new(),
        }));
        Ok(())
    }

    fn wrap_const(&mut self, c: &ConstDecl) {
        let obj = format!(
            "PyObjFrom({}, {})",
            names::as_type(&c.ty.cpp_type, &c.name.cpp),
            postconv::initializer(&c.ty, &self.pc)
        );
        let entry = (c.name.py.clone(), obj);
        self.dict_mut().push(entry);
    }

    fn wrap_var(&mut self, out: &mut Vec<String>, v: &VarDecl) -> Result<(), GenError> {
        let (is_final, class_fq, class_name) = match self.frames.last() {
            Some(f) => (f.is_final, f.fqname.clone(), f.name.clone()),
            None => return Err(GenError::TopLevelVar(v.name.py.clone())),
        };
        if v.cpp_set.is_some() && v.cpp_get.is_none() {
            return Err(GenError::SetterWithoutGetter(v.name.py.clone()));
        }
        let class_cpp_path: String = self
            .frames
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join("::");
        let getter = names::accessor_symbol("get", &class_fq, &v.name.cpp);
        let mut setter = names::accessor_symbol("set", &class_fq, &v.name.cpp);
        let (base_guard, cobj) = if is_final {
            (false, format!("{}->", names::get_cpp_obj("cpp", "self")))
        } else {
            (true, "cpp->".to_string())
        };
        let get = v.cpp_get.as_ref();
        let set = v.cpp_set.as_ref();
        let g_cpp = get.map(|g| g.name.cpp.clone()).unwrap_or_default();
        let g_py = get.map(|g| g.name.py.clone()).unwrap_or_default();
        let mut is_property = false;
        let mut member = v.name.cpp.clone();
        if !g_cpp.is_empty() {
            // Property var: the accessors name C++ methods.
            is_property = true;
            if get.map(|g| g.classmethod).unwrap_or(false)
                || set.map(|s| s.classmethod).unwrap_or(false)
            {
                return Err(GenError::StaticProperty(v.name.py.clone()));
            }
            if set.map(|s| s.name.cpp.is_empty()).unwrap_or(true) {
                setter = "nullptr".to_string();
            }
            member = format!("{}()", names::ident(&g_cpp));
        }
        let cvar = format!("{cobj}{member}");
        let unproperty = !g_py.is_empty();
        if unproperty {
            // Unproperty var: exposed as plain get_/set_ Python methods.
            let g_doc = get.map(|g| g.docstring.clone()).unwrap_or_default();
            let doc = if g_doc.is_empty() {
                format!(
                    "{}()->{}  C++ {}.{} getter",
                    g_py, v.ty.lang_type, class_name, v.name.cpp
                )
            } else {
                format!("{}()->{}\n\n{}", g_py, v.ty.lang_type, g_doc)
            };
            self.push_method(MethodEntry {
                pyname: g_py,
                wrapper: getter.clone(),
                flags: render::NOARGS.to_string(),
                doc,
            });
            let s_py = set.map(|s| s.name.py.clone()).unwrap_or_default();
            if s_py.is_empty() {
                setter = "nullptr".to_string();
            } else {
                let s_doc = set.map(|s| s.docstring.clone()).unwrap_or_default();
                let doc = if s_doc.is_empty() {
                    format!(
                        "{}({})  C++ {}.{} setter",
                        s_py, v.ty.lang_type, class_name, v.name.cpp
                    )
                } else {
                    format!("{}({})\n\n{}", s_py, v.ty.lang_type, s_doc)
                };
                self.push_method(MethodEntry {
                    pyname: s_py,
                    wrapper: setter.clone(),
                    flags: "METH_O".to_string(),
                    doc,
                });
            }
        } else {
            let doc = get
                .map(|g| g.docstring.clone())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| {
                    format!("C++ {} {}.{}", v.ty.cpp_type, class_cpp_path, member)
                });
            let prop = PropEntry {
                pyname: v.name.py.clone(),
                getter: getter.clone(),
                setter: setter.clone(),
                doc,
            };
            if let Some(f) = self.frames.last_mut() {
                f.properties.push(prop);
            }
        }
        let pc = postconv::initializer(&v.ty, &self.pc);
        // Custom containers convert through a pointer; hand out the member
        // address instead of a copy.
        let get_nested = !is_property && !unproperty && v.ty.cpp_toptr_conversion;
        render::var_getter(out, &self.opts, &getter, unproperty, base_guard, &cvar, &pc, get_nested);
        if setter != "nullptr" {
            let set_call = set.and_then(|s| {
                if s.name.cpp.is_empty() {
                    None
                } else {
                    Some(format!("{cobj}{}", names::ident(&s.name.cpp)))
                }
            });
            render::var_setter(
                out,
                &self.opts,
                &setter,
                unproperty,
                base_guard,
                &cvar,
                &v.ty.cpp_type,
                set_call.as_deref(),
                &v.name.py,
            );
        }
        Ok(())
    }

    fn wrap_class(
        &mut self,
        out: &mut Vec<String>,
        c: &ClassDecl,
        cpp_namespace: &str,
    ) -> Result<(), GenError> {
        let cname = names::ident(&c.name.cpp).to_string();
        let pyname = c.name.py.clone();
        let (vfuncs, iterator) = special_class(c)?;
        let is_virtual = !vfuncs.is_empty();
        self.frames.push(Frame::new(&cname, &pyname, &c.name.cpp, c.is_final));
        let ns = names::class_namespace(&pyname);
        out.push(String::new());
        out.push(format!("namespace {ns} {{"));
        if is_virtual {
            render::virtual_overrider(
                out,
                &self.opts,
                &pyname,
                &c.name.cpp,
                c.is_abstract,
                &vfuncs,
                &self.pc,
            );
        }
        // A virtual class implicitly gets itself as a native base so
        // instances upcast into C++ callers expecting the wrapped class.
        let mut bases = c.bases.clone();
        if is_virtual {
            bases.push(Base {
                py: String::new(),
                cpp: c.name.cpp.clone(),
            });
        }
        let iter_class = pyname == ITER_KW;
        render::wrapper_class_def(
            out,
            &self.opts,
            iter_class,
            &c.name.cpp,
            if is_virtual { render::OVERRIDER_CLASS } else { c.name.cpp.as_str() },
        );
        let mut tp_slots = render::TpSlots {
            tp_flags: vec!["Py_TPFLAGS_DEFAULT".to_string()],
            ..Default::default()
        };
        let mut ctor: Option<String> = None;
        if iter_class {
            self.wrap_iter_subclass(out, c)?;
            tp_slots.tp_iter = Some("PyObject_SelfIter".to_string());
            tp_slots.tp_iternext = Some(render::ITER_NEXT.to_string());
        } else {
            if !c.is_final {
                out.push(format!("static {}* ThisPtr(PyObject*);", c.name.cpp));
            }
            if c.cpp_has_def_ctor && (!c.is_abstract || is_virtual) {
                ctor = Some("DEF".to_string());
            }
            for d in &c.members {
                if let Decl::Func(f) = d {
                    if f.name.py == "__init__" {
                        let mut f2 = f.clone();
                        if is_virtual {
                            // Constructors are never virtual; the flag routes
                            // construction into the Overrider.
                            f2.is_virtual = true;
                        }
                        if f2.params.is_empty() {
                            continue; // The default ctor goes through DEF.
                        }
                        ctor = Some(names::ctor_symbol(&c.name.cpp));
                        self.wrap_func(out, &f2)?;
                        continue;
                    }
                    if c.is_abstract && f.is_virtual {
                        continue; // No callable body on the abstract base.
                    }
                }
                self.wrap_decl(out, d, cpp_namespace)?;
            }
            if is_virtual && ctor.is_none() {
                return Err(GenError::VirtualWithoutConstructor(c.name.cpp.clone()));
            }
            if c.is_abstract {
                tp_slots.tp_flags.push("Py_TPFLAGS_IS_ABSTRACT".to_string());
            }
            if !self.opts.py3 {
                tp_slots.tp_flags.push("Py_TPFLAGS_CHECKTYPES".to_string());
            }
            if !c.is_final {
                tp_slots.tp_flags.push("Py_TPFLAGS_BASETYPE".to_string());
            }
            if let Some(iter_cname) = &iterator {
                let n = format!("{}::", names::class_namespace(ITER_KW));
                let w = format!("{n}{}", render::WRAPPER_CLASS);
                render::new_iter(
                    out,
                    &self.opts,
                    &names::get_cpp_obj("cpp", "self"),
                    iter_cname,
                    &w,
                    &format!("{w}_Type"),
                );
                tp_slots.tp_iter = Some(render::NEW_ITER.to_string());
            }
            let props = self.frames.last().map(|f| f.properties.clone()).unwrap_or_default();
            if !props.is_empty() {
                render::getset_def(out, &self.opts, &props);
                tp_slots.tp_getset = Some(render::GETSET_TABLE.to_string());
            }
            for b in &bases {
                if !b.cpp.is_empty() && b.py.is_empty() {
                    let w = format!("as_{}", names::mangle(&b.cpp));
                    // Duplicate bases share one upcast method.
                    let dup = self
                        .frames
                        .last()
                        .map(|f| f.methods.iter().any(|m| m.pyname == w))
                        .unwrap_or(false);
                    if !dup {
                        render::cast_as_capsule(
                            out,
                            &self.opts,
                            &names::get_cpp_obj("cpp", "self"),
                            &b.cpp,
                            &w,
                        );
                        self.push_method(MethodEntry {
                            pyname: w.clone(),
                            wrapper: w,
                            flags: render::NOARGS.to_string(),
                            doc: format!("Upcast to {}*", b.cpp),
                        });
                    }
                }
            }
            let methods = self.frames.last().map(|f| f.methods.clone()).unwrap_or_default();
            if !methods.is_empty() {
                render::method_def(out, &self.opts, &methods);
                tp_slots.tp_methods = Some(render::METHODS_TABLE.to_string());
                for m in &methods {
                    if m.pyname == "__call__" {
                        tp_slots.tp_call = Some(format!("(ternaryfunc){}", m.wrapper));
                    }
                }
            }
        }
        let qualname = self.qualname("");
        tp_slots.tp_name = format!("\"{}.{}\"", self.path, qualname);
        if c.async_dtor && c.cpp_has_trivial_dtor {
            return Err(GenError::AsyncDtorTrivial(pyname.clone()));
        }
        let iter_obj = names::get_cpp_obj("iter", "self");
        render::type_object(
            out,
            &self.opts,
            &tp_slots,
            &pyname,
            ctor.as_deref(),
            &c.docstring,
            &c.name.cpp,
            !c.cpp_has_trivial_dtor,
            if iter_class { Some(iter_obj.as_str()) } else { None },
            if is_virtual { Some(render::OVERRIDER_CLASS) } else { None },
        );
        if !iter_class {
            crate::types::gen_this_pointer(out, &self.opts, &c.name.cpp, c.is_final);
        }
        out.push(format!("}}  // namespace {ns}"));
        let wrapns: String = self
            .frames
            .iter()
            .map(|f| f.class_ns.as_str())
            .collect::<Vec<_>>()
            .join("::")
            + "::";
        let wclass = format!("{wrapns}{}", render::WRAPPER_CLASS);
        let vclass = format!("{wrapns}{}", render::OVERRIDER_CLASS);
        let wtype = format!("{wclass}_Type");
        let frame = self.frames.pop().ok_or(GenError::FrameStackNotEmpty)?;
        let (base, replacement) = process_inheritance(&bases, &pyname)?;
        self.types_init.push((wtype.clone(), base.clone(), frame.dict));
        if iter_class {
            if let Some(b) = base {
                return Err(GenError::IteratorWithBase(pyname, b));
            }
            return Ok(());
        }
        let entry = (pyname.clone(), names::as_py_obj(&wtype));
        self.dict_mut().push(entry);
        let type_ns = if let Some(rep) = &replacement {
            // Converters live in the replaced base's namespace.
            c.cpp_bases
                .iter()
                .find(|b| &b.name == rep)
                .map(|b| b.namespace.clone())
                .unwrap_or_default()
        } else {
            cpp_namespace.to_string()
        };
        self.types.insert(TypeDesc::Class(ClassDesc {
            cname: c.name.cpp.clone(),
            pyname: qualname,
            wclass,
            wtype,
            wrapper_ns: wrapns,
            can_copy: c.cpp_copyable && !c.is_abstract,
            can_destruct: c.cpp_has_public_dtor,
            down_cast: replacement,
            virtual_cls: if is_virtual { Some(vclass) } else { None },
            namespace: type_ns,
        }));
        Ok(())
    }

    /// The nested `__iter__` class body: exactly one `def __next__`.
    fn wrap_iter_subclass(&mut self, out: &mut Vec<String>, c: &ClassDecl) -> Result<(), GenError> {
        if c.members.len() != 1 {
            return Err(GenError::MalformedIterator(
                c.name.cpp.clone(),
                format!("{} members", c.members.len()),
            ));
        }
        match &c.members[0] {
            Decl::Func(f) if f.name.py == "__next__" => {
                let pc = f
                    .returns
                    .first()
                    .map(|r| postconv::initializer(&r.ty, &self.pc))
                    .unwrap_or_else(|| postconv::PASS.to_string());
                render::iter_next(
                    out,
                    &self.opts,
                    &names::get_cpp_obj("iter", "self"),
                    !f.keep_gil,
                    &pc,
                );
                Ok(())
            }
            Decl::Func(f) => Err(GenError::MalformedIterator(
                c.name.cpp.clone(),
                format!("def {}", f.name.py),
            )),
            d => Err(GenError::MalformedIterator(
                c.name.cpp.clone(),
                decl_kind(d).to_string(),
            )),
        }
    }

    fn wrap_enum(&mut self, out: &mut Vec<String>, e: &EnumDecl, cpp_namespace: &str) {
        let pytype = if e.enum_class { "Enum" } else { "IntEnum" };
        let items: Vec<(String, i64)> = e
            .members
            .iter()
            .map(|m| {
                let name = if m.py.is_empty() {
                    names::ident(&m.cpp).to_string()
                } else {
                    m.py.clone()
                };
                (name, m.value)
            })
            .collect();
        let wclass = format!("_{}", e.name.py);
        let genw = format!("wrap{}", names::ident(&e.name.cpp));
        let desc = EnumDesc {
            cname: e.name.cpp.clone(),
            pyname: self.qualname(&e.name.py),
            pytype: pytype.to_string(),
            wname: self.wrap_path(&wclass),
            namespace: cpp_namespace.to_string(),
        };
        let entry = (
            e.name.py.clone(),
            format!("({}={}())", self.wrap_path(&wclass), self.wrap_path(&genw)),
        );
        self.dict_mut().push(entry);
        if !self.enums {
            // The enum module statics are imported once per unit.
            self.enums = true;
            let i1 = self.opts.ind(1);
            self.init.extend([
                "{PyObject* em = PyImport_ImportModule(\"enum\");".to_string(),
                " if (em == nullptr) goto err;".to_string(),
                " _Enum = PyObject_GetAttrString(em, \"Enum\");".to_string(),
                " _IntEnum = PyObject_GetAttrString(em, \"IntEnum\");".to_string(),
                " Py_DECREF(em);}".to_string(),
                "if (!_Enum || !_IntEnum) {".to_string(),
                format!("{i1}Py_XDECREF(_Enum);"),
                format!("{i1}Py_XDECREF(_IntEnum);"),
                format!("{i1}goto err;"),
                "}".to_string(),
            ]);
        }
        out.push(String::new());
        desc.create_enum(out, &self.opts, &genw, &wclass, &items);
        self.types.insert(TypeDesc::Enum(desc));
    }

    fn wrap_capsule(&mut self, p: &ForwardDecl, ns: &str) {
        self.types.insert(TypeDesc::Capsule(CapsuleDesc {
            cname: p.name.cpp.clone(),
            pyname: p.name.py.clone(),
            namespace: ns.to_string(),
        }));
    }
}

/// `R (A, B)` — the std::function signature of a callable.
fn std_function_spelling(f: &FuncDecl) -> String {
    let ret = f
        .returns
        .first()
        .map(|r| r.ty.cpp_type.clone())
        .unwrap_or_else(|| "void".to_string());
    let params: Vec<String> = f.params.iter().map(|p| p.ty.cpp_type.clone()).collect();
    format!("std::function<{ret} ({})>", params.join(", "))
}

/// Scan class members for virtual methods and a nested `__iter__` class.
fn special_class(c: &ClassDecl) -> Result<(Vec<FuncDecl>, Option<String>), GenError> {
    let mut vfuncs = Vec::new();
    let mut iterator = None;
    for d in &c.members {
        match d {
            Decl::Class(n) if n.name.py == ITER_KW => iterator = Some(n.name.cpp.clone()),
            Decl::Func(f) if f.is_virtual => vfuncs.push(f.clone()),
            _ => {}
        }
        if !vfuncs.is_empty() && c.is_final {
            return Err(GenError::FinalClassVirtual(c.name.py.clone()));
        }
    }
    Ok((vfuncs, iterator))
}

/// Split declared bases into the Python base type and a replacement marker.
fn process_inheritance(
    bases: &[Base],
    pyname: &str,
) -> Result<(Option<String>, Option<String>), GenError> {
    if bases.is_empty() {
        return Ok((None, None));
    }
    if bases[0].py == "replacement" {
        if bases[0].cpp.is_empty() {
            return Err(GenError::ReplacementWithoutCppName(pyname.to_string()));
        }
        // A replacement stands in for the whole host-level base list; any
        // other host-visible base next to it is a conflict.
        if bases[1..].iter().any(|b| !b.py.is_empty()) {
            return Err(GenError::MultipleInheritance(pyname.to_string()));
        }
        return Ok((None, Some(bases[0].cpp.clone())));
    }
    let py_bases: Vec<&Base> = bases
        .iter()
        .filter(|b| !b.py.is_empty() && b.cpp.is_empty())
        .collect();
    if py_bases.len() > 1 {
        return Err(GenError::MultipleInheritance(pyname.to_string()));
    }
    if let Some(b) = py_bases.first() {
        let base = if b.py.contains('.') {
            // Wrapped by another module: resolved at runtime by Ready().
            b.py.clone()
        } else {
            format!(
                "{}::{}_Type",
                names::class_namespace(&b.py),
                render::WRAPPER_CLASS
            )
        };
        return Ok((Some(base), None));
    }
    Ok((None, None))
}

fn decl_kind(d: &Decl) -> &'static str {
    match d {
        Decl::Class(_) => "class",
        Decl::Enum(_) => "enum",
        Decl::Var(_) => "var",
        Decl::Const(_) => "const",
        Decl::Func(_) => "func",
        Decl::Capsule(_) => "capsule",
    }
}
