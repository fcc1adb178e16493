//! End-to-end generation tests: build a declaration tree, run one pass, and
//! check the shape of the three emitted units.

use pywrap::{Artifacts, Ast, GenError, Options};
use serde_json::{json, Value};

fn ast(v: Value) -> Ast {
    serde_json::from_value(v).expect("valid declaration tree")
}

fn generate(v: Value) -> Artifacts {
    pywrap::generate_from_ast(&ast(v), &Options::default()).expect("generation must succeed")
}

fn generate_err(v: Value) -> GenError {
    pywrap::generate_from_ast(&ast(v), &Options::default()).expect_err("generation must fail")
}

fn module(decls: Value) -> Value {
    json!({
        "module": "sample.m",
        "source": "sample/m.yaml",
        "api_header": "sample/api.h",
        "decls": decls,
    })
}

#[test]
fn plain_class_with_method() {
    let out = generate(module(json!([{
        "kind": "class",
        "name": {"py": "A", "cpp": "A"},
        "cpp_has_def_ctor": true,
        "cpp_has_trivial_dtor": true,
        "cpp_copyable": true,
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "func", "name": {"py": "M", "cpp": "A::M"}}
        ]
    }])));
    let base = &out.base;
    assert!(base.contains("namespace pyA {"), "class namespace missing:\n{base}");
    assert!(
        base.contains("static PyObject* wrapA_M(PyObject* self) {"),
        "method wrapper missing:\n{base}"
    );
    // Non-final classes locate the payload through ThisPtr.
    assert!(base.contains("A* c = ThisPtr(self);"));
    assert!(base.contains("c->M();"));
    assert!(base.contains(".tp_name = \"sample.m.A\","));
    assert!(base.contains("PyTypeObject wrapper_Type = {"));
    // Default constructor goes through the no-argument DEF path.
    assert!(base.contains("::pywrap::MakeShared<A>();"));
    assert!(base.contains("A takes no parameters"));
    assert!(base.contains("if (PyType_Ready(&pyA::wrapper_Type) < 0) return false;"));
    assert!(base.contains(
        "if (PyModule_AddObject(module, \"A\", reinterpret_cast<PyObject*>(&pyA::wrapper_Type)) < 0) goto err;"
    ));
    // Method table row.
    assert!(base.contains("{C(\"M\"), reinterpret_cast<PyCFunction>(wrapA_M), METH_NOARGS, C(\"\")},"));
    // Header publishes the conversions.
    assert!(out.header.contains("bool PyObjAs(PyObject* input, A** output);"));
    assert!(out.header.contains("PyObject* PyObjFrom(const A&, py::PostConv);"));
    assert!(out.header.contains("PyImport_ImportModule(\"sample.m\")"));
}

#[test]
fn no_virtual_members_no_overrider() {
    let out = generate(module(json!([{
        "kind": "class",
        "name": {"py": "A", "cpp": "A"},
        "cpp_has_def_ctor": true,
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "func", "name": {"py": "M", "cpp": "A::M"}}
        ]
    }])));
    assert!(!out.base.contains("Overrider"), "unexpected shadow type:\n{}", out.base);
}

#[test]
fn virtual_class_gets_overrider_and_upcast() {
    let out = generate(module(json!([{
        "kind": "class",
        "name": {"py": "V", "cpp": "V"},
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "func", "name": {"py": "f", "cpp": "V::f"}, "virtual": true},
            {"kind": "func", "name": {"py": "__init__", "cpp": "V::V"}, "constructor": true,
             "params": [{"name": "x", "type": {"lang_type": "int", "cpp_type": "int"}}]}
        ]
    }])));
    let base = &out.base;
    assert!(base.contains("struct Overrider : ::pywrap::PyObjRef, V {"));
    // The primary constructor builds the shadow type, not the plain class.
    assert!(base.contains("= ::pywrap::MakeShared<Overrider>"));
    assert!(base.contains("static PyObject* wrapV_as___init__"));
    // tp_init glue wires the Python half of the overrider.
    assert!(base.contains("->::pywrap::PyObjRef::Init(self);"));
    // The implicit native base gives C++ callers the upcast protocol.
    assert!(base.contains("static PyObject* as_V(PyObject* self) {"));
    assert!(base.contains("{C(\"as_V\"), reinterpret_cast<PyCFunction>(as_V), METH_NOARGS, C(\"Upcast to V*\")},"));
    // Virtual method wrappers pin the named implementation.
    assert!(base.contains("c->V::f();"));
}

#[test]
fn virtual_without_constructor_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "class",
        "name": {"py": "V", "cpp": "V"},
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "func", "name": {"py": "f", "cpp": "V::f"}, "virtual": true}
        ]
    }])));
    assert!(matches!(err, GenError::VirtualWithoutConstructor(c) if c == "V"));
}

#[test]
fn final_class_with_virtual_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "class",
        "name": {"py": "F", "cpp": "F"},
        "final": true,
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "func", "name": {"py": "f", "cpp": "F::f"}, "virtual": true}
        ]
    }])));
    assert!(matches!(err, GenError::FinalClassVirtual(c) if c == "F"));
}

#[test]
fn final_class_skips_thisptr_lookup() {
    let out = generate(module(json!([{
        "kind": "class",
        "name": {"py": "F", "cpp": "F"},
        "final": true,
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "func", "name": {"py": "M", "cpp": "F::M"}}
        ]
    }])));
    let base = &out.base;
    // Static payload offset: the method dereferences the wrapper directly.
    assert!(base.contains("reinterpret_cast<wrapper*>(self)->cpp->M();"));
    assert!(!base.contains("static F* ThisPtr(PyObject*);"));
    assert!(!base.contains("Py_TPFLAGS_BASETYPE"));
}

#[test]
fn additional_constructor_becomes_classmethod_factory() {
    let out = generate(module(json!([{
        "kind": "class",
        "name": {"py": "A", "cpp": "A"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "func", "name": {"py": "FromSize", "cpp": "A::A"}, "constructor": true,
             "params": [{"name": "n", "type": {"lang_type": "int", "cpp_type": "int"}}]}
        ]
    }])));
    let base = &out.base;
    assert!(base.contains("std::make_unique<A>"));
    assert!(base.contains("METH_VARARGS | METH_KEYWORDS | METH_CLASS"));
    assert!(base.contains("std::unique_ptr<A> ret0 = std::make_unique<A>(std::move(arg1));"));
}

#[test]
fn constructor_with_returns_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "class",
        "name": {"py": "A", "cpp": "A"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "func", "name": {"py": "__init__", "cpp": "A::A"}, "constructor": true,
             "params": [{"name": "n", "type": {"lang_type": "int", "cpp_type": "int"}}],
             "returns": [{"name": "", "type": {"lang_type": "int", "cpp_type": "int"}}]}
        ]
    }])));
    assert!(matches!(err, GenError::ConstructorReturns(n) if n == "__init__"));
}

#[test]
fn member_variable_lands_in_getset_table() {
    let out = generate(module(json!([{
        "kind": "class",
        "name": {"py": "A", "cpp": "A"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "var", "name": {"py": "x", "cpp": "x"},
             "type": {"lang_type": "int", "cpp_type": "int"}}
        ]
    }])));
    let base = &out.base;
    assert!(base.contains("static PyGetSetDef Properties[] = {"));
    assert!(base.contains("{C(\"x\"), get_A_x, set_A_x, C(\"C++ int A.x\")},"));
    assert!(base.contains("static PyObject* get_A_x(PyObject* self, void* xdata) {"));
    assert!(base.contains("can't delete x attribute"));
    assert!(base.contains(".tp_getset = Properties,"));
}

#[test]
fn setter_without_getter_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "class",
        "name": {"py": "A", "cpp": "A"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "var", "name": {"py": "x", "cpp": "x"},
             "type": {"lang_type": "int", "cpp_type": "int"},
             "cpp_set": {"name": {"py": "", "cpp": "A::set_x"}}}
        ]
    }])));
    assert!(matches!(err, GenError::SetterWithoutGetter(n) if n == "x"));
}

#[test]
fn static_property_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "class",
        "name": {"py": "A", "cpp": "A"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "var", "name": {"py": "x", "cpp": "x"},
             "type": {"lang_type": "int", "cpp_type": "int"},
             "cpp_get": {"name": {"py": "", "cpp": "A::get_x"}, "classmethod": true}}
        ]
    }])));
    assert!(matches!(err, GenError::StaticProperty(n) if n == "x"));
}

#[test]
fn unproperty_accessors_become_methods() {
    let out = generate(module(json!([{
        "kind": "class",
        "name": {"py": "A", "cpp": "A"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "var", "name": {"py": "x", "cpp": "x"},
             "type": {"lang_type": "int", "cpp_type": "int"},
             "cpp_get": {"name": {"py": "get_x", "cpp": ""}},
             "cpp_set": {"name": {"py": "set_x", "cpp": ""}}}
        ]
    }])));
    let base = &out.base;
    assert!(base.contains("{C(\"get_x\"), reinterpret_cast<PyCFunction>(get_A_x), METH_NOARGS,"));
    assert!(base.contains("{C(\"set_x\"), reinterpret_cast<PyCFunction>(set_A_x), METH_O,"));
    assert!(!base.contains("PyGetSetDef"));
}

#[test]
fn top_level_var_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "var", "name": {"py": "x", "cpp": "x"},
        "type": {"lang_type": "int", "cpp_type": "int"}
    }])));
    assert!(matches!(err, GenError::TopLevelVar(n) if n == "x"));
}

#[test]
fn enum_members_and_one_time_import() {
    let out = generate(module(json!([{
        "kind": "enum",
        "name": {"py": "E", "cpp": "E"},
        "enum_class": true,
        "members": [
            {"py": "X", "cpp": "E::kX", "value": 1},
            {"py": "Y", "cpp": "E::kY", "value": 2}
        ]
    }, {
        "kind": "enum",
        "name": {"py": "Mode", "cpp": "Mode"},
        "members": [
            {"py": "", "cpp": "Mode::kFast", "value": 0}
        ]
    }])));
    let base = &out.base;
    assert!(base.contains("static PyObject *_Enum{}, *_IntEnum{};  // set below in Init()"));
    assert!(base.contains("static PyObject* wrapE() {"));
    assert!(base.contains("names = PyTuple_New(2);"));
    assert!(base.contains("Py_BuildValue(\"(NN)\", PyUnicode_FromString(\"X\"), PyLong_FromLong(1))"));
    assert!(base.contains("Py_BuildValue(\"(NN)\", PyUnicode_FromString(\"Y\"), PyLong_FromLong(2))"));
    // enum_class maps to Enum, a plain enum to IntEnum.
    assert!(base.contains("PyObject_CallFunctionObjArgs(_Enum, py, names, nullptr);"));
    assert!(base.contains("PyObject_CallFunctionObjArgs(_IntEnum, py, names, nullptr);"));
    // Member without a Python name falls back to the C++ identifier.
    assert!(base.contains("PyUnicode_FromString(\"kFast\")"));
    assert!(base.contains("if (PyModule_AddObject(module, \"E\", (_E=wrapE())) < 0) goto err;"));
    // The enum module is imported exactly once.
    assert_eq!(base.matches("PyImport_ImportModule(\"enum\")").count(), 1);
    assert!(out.header.contains("bool PyObjAs(PyObject* input, E* output);"));
}

#[test]
fn same_name_in_different_scopes_gets_distinct_symbols() {
    let out = generate(module(json!([
        {"kind": "func", "name": {"py": "reset", "cpp": "audio::reset"}},
        {"kind": "func", "name": {"py": "reset", "cpp": "video::reset"}}
    ])));
    let base = &out.base;
    assert!(base.contains("static PyObject* wrapaudio_reset(PyObject* self) {"));
    assert!(base.contains("static PyObject* wrapvideo_reset(PyObject* self) {"));
    assert!(base.contains("audio::reset();"));
    assert!(base.contains("video::reset();"));
}

#[test]
fn duplicate_symbols_are_rejected() {
    let err = generate_err(module(json!([
        {"kind": "func", "name": {"py": "reset", "cpp": "audio::reset"}},
        {"kind": "func", "name": {"py": "reset", "cpp": "audio::reset"}}
    ])));
    assert!(matches!(err, GenError::DuplicateSymbol(s, _) if s == "wrapaudio_reset"));
}

#[test]
fn const_uses_postconversion_table() {
    let out = generate(json!({
        "module": "sample.m",
        "source": "sample/m.yaml",
        "api_header": "sample/api.h",
        "typemap": [
            {"lang_type": "str", "postconversion": "UnicodeFromBytes"}
        ],
        "decls": [
            {"kind": "const", "name": {"py": "NAME", "cpp": "kName"},
             "type": {"lang_type": "str", "cpp_type": "const char*"}}
        ]
    }));
    let base = &out.base;
    assert!(base.contains("#define _0 py::postconv::PASS"));
    assert!(base.contains("#define _1 UnicodeFromBytes"));
    assert!(base.contains(
        "if (PyModule_AddObject(module, \"NAME\", PyObjFrom(static_cast<const char*>(kName), _1)) < 0) goto err;"
    ));
}

#[test]
fn iterator_subclass_wires_protocol_slots() {
    let out = generate(module(json!([{
        "kind": "class",
        "name": {"py": "Range", "cpp": "Range"},
        "cpp_has_def_ctor": true,
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [{
            "kind": "class",
            "name": {"py": "__iter__", "cpp": "RangeIter"},
            "members": [
                {"kind": "func", "name": {"py": "__next__", "cpp": "RangeIter::Next"},
                 "returns": [{"name": "", "type": {"lang_type": "int", "cpp_type": "int"}}]}
            ]
        }]
    }])));
    let base = &out.base;
    assert!(base.contains("::pywrap::Iterator<RangeIter> iter;"));
    assert!(base.contains("static PyObject* iternext(PyObject* self) {"));
    // __next__ releases the GIL unless the tree keeps it.
    assert!(base.contains("Py_BEGIN_ALLOW_THREADS"));
    assert!(base.contains(".tp_iter = PyObject_SelfIter,"));
    assert!(base.contains(".tp_iternext = iternext,"));
    // The owner class hands out fresh iterators.
    assert!(base.contains("static PyObject* new_iter(PyObject* self) {"));
    assert!(base.contains(".tp_iter = new_iter,"));
}

#[test]
fn malformed_iterator_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "class",
        "name": {"py": "Range", "cpp": "Range"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [{
            "kind": "class",
            "name": {"py": "__iter__", "cpp": "RangeIter"},
            "members": [
                {"kind": "func", "name": {"py": "advance", "cpp": "RangeIter::Next"}}
            ]
        }]
    }])));
    assert!(matches!(err, GenError::MalformedIterator(c, f) if c == "RangeIter" && f == "def advance"));
}

#[test]
fn empty_iterator_class_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "class",
        "name": {"py": "Range", "cpp": "Range"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [{
            "kind": "class",
            "name": {"py": "__iter__", "cpp": "RangeIter"},
            "members": []
        }]
    }])));
    assert!(matches!(err, GenError::MalformedIterator(c, f) if c == "RangeIter" && f == "0 members"));
}

#[test]
fn derived_iterator_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "class",
        "name": {"py": "Range", "cpp": "Range"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [{
            "kind": "class",
            "name": {"py": "__iter__", "cpp": "RangeIter"},
            "bases": [{"py": "Base", "cpp": ""}],
            "members": [
                {"kind": "func", "name": {"py": "__next__", "cpp": "RangeIter::Next"},
                 "returns": [{"name": "", "type": {"lang_type": "int", "cpp_type": "int"}}]}
            ]
        }]
    }])));
    assert!(matches!(err, GenError::IteratorWithBase(..)));
}

#[test]
fn multiple_inheritance_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "class",
        "name": {"py": "C", "cpp": "C"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "bases": [{"py": "A", "cpp": ""}, {"py": "B", "cpp": ""}],
        "members": []
    }])));
    assert!(matches!(err, GenError::MultipleInheritance(c) if c == "C"));
}

#[test]
fn local_and_imported_bases() {
    let out = generate(module(json!([
        {"kind": "class", "name": {"py": "A", "cpp": "A"},
         "cpp_has_trivial_dtor": true, "cpp_has_public_dtor": true, "members": []},
        {"kind": "class", "name": {"py": "B", "cpp": "B"},
         "cpp_has_trivial_dtor": true, "cpp_has_public_dtor": true,
         "bases": [{"py": "A", "cpp": ""}], "members": []},
        {"kind": "class", "name": {"py": "C", "cpp": "C"},
         "cpp_has_trivial_dtor": true, "cpp_has_public_dtor": true,
         "bases": [{"py": "other.mod.Base", "cpp": ""}], "members": []}
    ])));
    let base = &out.base;
    assert!(base.contains("pyB::wrapper_Type.tp_base = &pyA::wrapper_Type;"));
    assert!(base.contains("PyObject* base = ImportFQName(\"other.mod.Base\");"));
}

#[test]
fn replacement_base_declares_downcast() {
    let out = generate(module(json!([{
        "kind": "class",
        "name": {"py": "Grid", "cpp": "FancyGrid"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "cpp_copyable": true,
        "bases": [{"py": "replacement", "cpp": "BasicGrid"}],
        "cpp_bases": [{"name": "BasicGrid", "namespace": "grids"}],
        "members": []
    }])));
    assert!(out.header.contains("PyObject* PyObjFrom(BasicGrid&&, py::PostConv);"));
    assert!(out.header.contains("bool PyObjAs(PyObject* input, BasicGrid** output);"));
    assert!(out.header.contains("namespace grids {"));
    assert!(out.base.contains("bool PyObjAs(PyObject* py, BasicGrid** c) {"));
    assert!(out.base.contains("*c = static_cast<BasicGrid*>(cpp);"));
}

#[test]
fn replacement_without_cpp_name_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "class",
        "name": {"py": "Grid", "cpp": "FancyGrid"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "bases": [{"py": "replacement", "cpp": ""}],
        "members": []
    }])));
    assert!(matches!(err, GenError::ReplacementWithoutCppName(c) if c == "Grid"));
}

#[test]
fn replacement_with_extra_host_base_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "class",
        "name": {"py": "Grid", "cpp": "FancyGrid"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "bases": [{"py": "replacement", "cpp": "BasicGrid"}, {"py": "Other", "cpp": ""}],
        "members": []
    }])));
    assert!(matches!(err, GenError::MultipleInheritance(c) if c == "Grid"));
}

#[test]
fn context_manager_markers() {
    let out = generate(module(json!([{
        "kind": "class",
        "name": {"py": "Lock", "cpp": "Lock"},
        "cpp_has_def_ctor": true,
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "func", "name": {"py": "__enter__@", "cpp": "Lock::Acquire"}},
            {"kind": "func", "name": {"py": "__exit__@", "cpp": "Lock::Release"}}
        ]
    }])));
    let base = &out.base;
    // __enter__ takes nothing and returns self.
    assert!(base.contains("Py_INCREF(self);"));
    assert!(base.contains("{C(\"__enter__\"), reinterpret_cast<PyCFunction>(wrapLock_Acquire_as___enter__), METH_NOARGS,"));
    // __exit__ always gets the (type, value, traceback) calling convention.
    assert!(base.contains("{C(\"__exit__\"), reinterpret_cast<PyCFunction>(wrapLock_Release_as___exit__), METH_VARARGS | METH_KEYWORDS,"));
}

#[test]
fn context_manager_classmethod_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "class",
        "name": {"py": "Lock", "cpp": "Lock"},
        "cpp_has_def_ctor": true,
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [
            {"kind": "func", "name": {"py": "__enter__@", "cpp": "Lock::Acquire"},
             "classmethod": true}
        ]
    }])));
    assert!(matches!(err, GenError::CtxMgrClassmethod(n) if n == "__enter__"));
}

#[test]
fn ignored_return_value_with_two_returns_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "func",
        "name": {"py": "poll_all", "cpp": "PollAll"},
        "ignore_return_value": true,
        "returns": [
            {"name": "", "type": {"lang_type": "int", "cpp_type": "int"}},
            {"name": "ok", "type": {"lang_type": "bool", "cpp_type": "bool"}}
        ]
    }])));
    assert!(matches!(err, GenError::IgnoredReturnCount(n, 2) if n == "poll_all"));
}

#[test]
fn async_dtor_on_trivial_destructor_is_rejected() {
    let err = generate_err(module(json!([{
        "kind": "class",
        "name": {"py": "Job", "cpp": "Job"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "async_dtor": true,
        "members": []
    }])));
    assert!(matches!(err, GenError::AsyncDtorTrivial(c) if c == "Job"));
}

#[test]
fn callable_return_registers_invoker() {
    let out = generate(module(json!([{
        "kind": "func",
        "name": {"py": "handler", "cpp": "GetHandler"},
        "returns": [{
            "name": "",
            "type": {
                "lang_type": "(x:int)->None",
                "cpp_type": "",
                "callable": {
                    "name": {"py": "", "cpp": ""},
                    "params": [{"name": "x", "type": {"lang_type": "int", "cpp_type": "int"}}]
                }
            }
        }]
    }])));
    let base = &out.base;
    assert!(base.contains("static PyObject* lambda_GetHandler_ret0_lambda"));
    assert!(base.contains("PyCapsule_GetPointer(self, typeid(std::function<void (int)>).name());"));
    assert!(base.contains("static PyMethodDef lambda_GetHandler_ret0_lambda_def = {"));
    assert!(out.header.contains("PyObject* PyObjFrom(std::function<void (int)>, py::PostConv);"));
}

#[test]
fn capsule_forward_decl() {
    let out = generate(module(json!([
        {"kind": "capsule", "name": {"py": "Handle", "cpp": "grid::Handle"}, "namespace": "grid"}
    ])));
    assert!(out.header.contains("// pywrap use `grid::Handle *` as Handle"));
    assert!(out.header.contains("bool PyObjAs(PyObject* input, grid::Handle** output);"));
    assert!(out.base.contains("PyCapsule_New((void*)c, C(\"grid::Handle\"), nullptr);"));
}

#[test]
fn output_is_deterministic() {
    let tree = module(json!([
        {"kind": "class", "name": {"py": "B", "cpp": "nsb::B"}, "namespace": "nsb",
         "cpp_has_trivial_dtor": true, "cpp_has_public_dtor": true, "members": []},
        {"kind": "class", "name": {"py": "A", "cpp": "nsa::A"}, "namespace": "nsa",
         "cpp_has_trivial_dtor": true, "cpp_has_public_dtor": true, "members": []},
        {"kind": "enum", "name": {"py": "E", "cpp": "nsa::E"}, "namespace": "nsa",
         "members": [{"py": "X", "cpp": "nsa::E::kX", "value": 1}]},
        {"kind": "capsule", "name": {"py": "H", "cpp": "H"}}
    ]));
    let first = generate(tree.clone());
    let second = generate(tree);
    assert_eq!(first.base, second.base);
    assert_eq!(first.init, second.init);
    assert_eq!(first.header, second.header);
    // Descriptors are grouped by namespace in canonical order.
    let a = first.header.find("`nsa::A`").expect("A conversions");
    let e = first.header.find("`nsa::E`").expect("E conversions");
    let b = first.header.find("`nsb::B`").expect("B conversions");
    assert!(a < e && e < b, "namespace groups out of order");
}

#[test]
fn init_unit_exposes_entry_symbol() {
    let out = generate(module(json!([])));
    assert!(out.init.contains("namespace sample_m_pywrap {"));
    assert!(out.init.contains("bool Ready();"));
    assert!(out.init.contains("PyObject* Init();"));
    assert!(out.init.contains("PyMODINIT_FUNC PyInit_m() {"));
}

#[test]
fn py2_option_changes_entry_and_strings() {
    let tree = ast(module(json!([{
        "kind": "enum", "name": {"py": "E", "cpp": "E"},
        "members": [{"py": "X", "cpp": "E::kX", "value": 1}]
    }])));
    let opts = Options {
        py3: false,
        ..Options::default()
    };
    let out = pywrap::generate_from_ast(&tree, &opts).expect("py2 generation");
    assert!(out.init.contains("PyMODINIT_FUNC initm() {"));
    assert!(out.base.contains("Py_InitModule3(\"sample.m\""));
    assert!(out.base.contains("PyString_FromString(\"X\")"));
}

#[test]
fn empty_module_header_says_so() {
    let out = generate(module(json!([
        {"kind": "func", "name": {"py": "go", "cpp": "go"}}
    ])));
    assert!(out.header.contains("// This module defines no types."));
}

#[test]
fn nested_class_wires_class_dict() {
    let out = generate(module(json!([{
        "kind": "class",
        "name": {"py": "Outer", "cpp": "Outer"},
        "cpp_has_trivial_dtor": true,
        "cpp_has_public_dtor": true,
        "members": [{
            "kind": "class",
            "name": {"py": "Inner", "cpp": "Outer::Inner"},
            "cpp_has_trivial_dtor": true,
            "cpp_has_public_dtor": true,
            "members": []
        }]
    }])));
    let base = &out.base;
    assert!(base.contains("namespace pyOuter {"));
    assert!(base.contains("namespace pyInner {"));
    assert!(base.contains(".tp_name = \"sample.m.Outer.Inner\","));
    assert!(base.contains(
        "if (PyDict_SetItemString(pyOuter::pyInner::wrapper_Type.tp_dict"
    ) || base.contains(
        "if (PyDict_SetItemString(pyOuter::wrapper_Type.tp_dict, \"Inner\", reinterpret_cast<PyObject*>(&pyOuter::pyInner::wrapper_Type)) < 0) goto err;"
    ));
    // Nested types ready before the enclosing class.
    let inner_ready = base.find("PyType_Ready(&pyOuter::pyInner::wrapper_Type)").expect("inner ready");
    let outer_ready = base.find("PyType_Ready(&pyOuter::wrapper_Type)").expect("outer ready");
    assert!(inner_ready < outer_ready);
}

#[test]
fn extra_init_and_module_docstring() {
    let out = generate(json!({
        "module": "sample.m",
        "source": "sample/m.yaml",
        "api_header": "sample/api.h",
        "docstring": "Sample bindings.",
        "extra_init": ["if (RegisterThing(module) < 0) goto err;"],
        "decls": [
            {"kind": "const", "name": {"py": "N", "cpp": "kN"},
             "type": {"lang_type": "int", "cpp_type": "int"}}
        ]
    }));
    assert!(out.base.contains("C(\"Sample bindings.\"),"));
    assert!(out.base.contains("if (RegisterThing(module) < 0) goto err;"));
}

#[test]
fn run_writes_three_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("m.json");
    let tree = module(json!([
        {"kind": "func", "name": {"py": "go", "cpp": "go"}}
    ]));
    std::fs::write(&input, serde_json::to_string(&tree).expect("serialize")).expect("write input");
    let out = dir.path().join("gen");
    pywrap::run(&input, &out, &Options::default()).expect("run");
    assert!(out.join("m.cc").exists());
    assert!(out.join("m_init.cc").exists());
    assert!(out.join("m.h").exists());
    let base = std::fs::read_to_string(out.join("m.cc")).expect("read base");
    assert!(base.contains("// This file was automatically generated by pywrap."));
}

#[test]
fn catch_exceptions_wraps_calls() {
    let out = generate(json!({
        "module": "sample.m",
        "source": "sample/m.yaml",
        "api_header": "sample/api.h",
        "catch_exceptions": true,
        "decls": [
            {"kind": "func", "name": {"py": "risky", "cpp": "Risky"}},
            {"kind": "func", "name": {"py": "safe", "cpp": "Safe"}, "noexcept": true}
        ]
    }));
    let base = &out.base;
    assert!(base.contains("::pywrap::SetErrorFromException(e);"));
    // The noexcept function body carries no try block.
    let safe = base.find("static PyObject* wrapSafe").expect("safe wrapper");
    let safe_body = &base[safe..safe + 200];
    assert!(!safe_body.contains("try {"), "noexcept call must not be guarded:\n{safe_body}");
}
