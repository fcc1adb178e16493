//! Input model — the resolved declaration tree handed over by the front end.
//!
//! The tree arrives fully matched: every entity carries both its Python name
//! and its fully qualified C++ name, plus the derived flags (copyable, public
//! dtor, ...) the matcher computed. The generator treats the tree as
//! read-only; the few places that need to rewrite a declaration (synthesized
//! factory constructors, implicit virtual flags) clone the node first.

use serde::Deserialize;

/// A matched name pair: how the entity is addressed from Python (`py`) and
/// its fully qualified C++ spelling (`cpp`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Name {
    #[serde(default)]
    pub py: String,
    #[serde(default)]
    pub cpp: String,
}

/// One declaration, dispatched by `kind` during traversal.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decl {
    Class(ClassDecl),
    Enum(EnumDecl),
    Var(VarDecl),
    Const(ConstDecl),
    Func(FuncDecl),
    /// Opaque forward declaration, exposed as a capsule.
    Capsule(ForwardDecl),
}

/// A type expression. `params` holds container element types (used for
/// post-conversion initializers); `callable` is set when the type is a
/// `std::function` signature.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypeSpec {
    #[serde(default)]
    pub lang_type: String,
    #[serde(default)]
    pub cpp_type: String,
    #[serde(default)]
    pub params: Vec<TypeSpec>,
    #[serde(default)]
    pub callable: Option<Box<FuncDecl>>,
    /// Set by the matcher for custom containers that convert through a
    /// pointer; field getters then hand out the address of the member.
    #[serde(default)]
    pub cpp_toptr_conversion: bool,
}

/// A function parameter or return value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Param {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: TypeSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FuncDecl {
    pub name: Name,
    #[serde(default)]
    pub docstring: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub returns: Vec<Param>,
    #[serde(default)]
    pub classmethod: bool,
    #[serde(rename = "virtual", default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub constructor: bool,
    #[serde(default)]
    pub ignore_return_value: bool,
    /// The C++ function returns void; every declared return is an output
    /// parameter.
    #[serde(default)]
    pub cpp_void_return: bool,
    /// Free function adopted as a method; its first parameter is `self`.
    #[serde(default)]
    pub cpp_opfunction: bool,
    #[serde(default)]
    pub noexcept: bool,
    /// Keep the GIL held across the C++ call (iterator `__next__` only).
    #[serde(default)]
    pub keep_gil: bool,
    #[serde(default)]
    pub namespace: String,
}

/// Getter/setter designation on a variable. A *property* accessor names a
/// C++ method (`name.cpp` set); an *unproperty* accessor names a Python
/// method (`name.py` set).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Accessor {
    #[serde(default)]
    pub name: Name,
    #[serde(default)]
    pub classmethod: bool,
    #[serde(default)]
    pub docstring: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VarDecl {
    pub name: Name,
    #[serde(rename = "type", default)]
    pub ty: TypeSpec,
    #[serde(default)]
    pub cpp_get: Option<Accessor>,
    #[serde(default)]
    pub cpp_set: Option<Accessor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConstDecl {
    pub name: Name,
    #[serde(rename = "type", default)]
    pub ty: TypeSpec,
}

/// A declared base. The front end fills `py` for Python-level inheritance;
/// the matcher adds entries with only `cpp` for C++ parent classes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Base {
    #[serde(default)]
    pub py: String,
    #[serde(default)]
    pub cpp: String,
}

/// A C++ base class as seen in the header, with its enclosing namespace.
/// Consulted only to resolve the namespace of a `replacement` base.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CppBase {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassDecl {
    pub name: Name,
    #[serde(default)]
    pub docstring: String,
    #[serde(default)]
    pub members: Vec<Decl>,
    #[serde(default)]
    pub bases: Vec<Base>,
    #[serde(default)]
    pub cpp_bases: Vec<CppBase>,
    #[serde(rename = "final", default)]
    pub is_final: bool,
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub cpp_has_def_ctor: bool,
    #[serde(default)]
    pub cpp_has_trivial_dtor: bool,
    #[serde(default)]
    pub cpp_copyable: bool,
    #[serde(default)]
    pub cpp_has_public_dtor: bool,
    /// `@async__del__` — run the destructor off-thread.
    #[serde(default)]
    pub async_dtor: bool,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnumMember {
    #[serde(default)]
    pub py: String,
    #[serde(default)]
    pub cpp: String,
    pub value: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnumDecl {
    pub name: Name,
    /// `enum class` maps to `enum.Enum`, plain enums to `enum.IntEnum`.
    #[serde(default)]
    pub enum_class: bool,
    #[serde(default)]
    pub members: Vec<EnumMember>,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardDecl {
    pub name: Name,
    #[serde(default)]
    pub namespace: String,
}

/// A (native type spelling, post-conversion hook) pair. Values of
/// `lang_type` get the named conversion applied after the generic one.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeMapEntry {
    pub lang_type: String,
    #[serde(default)]
    pub postconversion: String,
}

/// The whole compilation unit: one module, one declaration tree.
#[derive(Debug, Clone, Deserialize)]
pub struct Ast {
    /// Full dotted module path (`pkg.sub.name`).
    pub module: String,
    /// Interface description file this tree came from (for headlines).
    #[serde(default)]
    pub source: String,
    /// The C++ API header being wrapped.
    #[serde(default)]
    pub api_header: String,
    #[serde(default)]
    pub extra_headers: Vec<String>,
    #[serde(default)]
    pub docstring: String,
    #[serde(default)]
    pub typemap: Vec<TypeMapEntry>,
    /// Extra statements appended to the module `Init()` routine.
    #[serde(default)]
    pub extra_init: Vec<String>,
    /// Wrap C++ calls in try/catch (unless a function is `noexcept`).
    #[serde(default)]
    pub catch_exceptions: bool,
    #[serde(default)]
    pub decls: Vec<Decl>,
}

/// True if the tree declares any enum, at any nesting depth. Gates the
/// one-time emission of the cached `enum` module statics.
pub fn have_enum(decls: &[Decl]) -> bool {
    decls.iter().any(|d| match d {
        Decl::Enum(_) => true,
        Decl::Class(c) => have_enum(&c.members),
        _ => false,
    })
}
