//! Name resolution across the three naming realms.
//!
//! Every entity lives in three realms at once: the Python realm (pyname),
//! the C++ realm (fully qualified cname), and the wrapper realm where the
//! generated glue symbol (wname) emerges. All wrapper symbols are derived
//! here so the derivation stays in one place and stays deterministic.

/// Strip the qualification off a C++ name: `a::b::C` → `C`.
pub fn ident(cpp_name: &str) -> &str {
    match cpp_name.rfind("::") {
        Some(pos) => &cpp_name[pos + 2..],
        None => cpp_name,
    }
}

/// Transform a canonical C++ type spelling into a valid identifier.
///
/// Not injective on its own (`A::B` and `A_B` mangle the same); callers
/// always feed fully qualified names so the enclosing scope path is part of
/// the result and symbols from different scopes cannot collide.
pub fn mangle(cname: &str) -> String {
    let c = cname
        .trim_matches(&[' ', ':', '>'][..])
        .replace("::", "_")
        .replace('<', "_")
        .replace('-', "_")
        .replace(", ", "_")
        .replace('*', "_ptr")
        .replace("&&", "_rref")
        .replace('&', "_ref")
        .replace(' ', "");
    c.split(['<', '>', ',', ' '])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Wrapper symbol for a plain function or method. Mangles the fully
/// qualified C++ name; when the Python name differs from the C++ identifier
/// an explicit `_as_` suffix carries it.
pub fn wrapper_symbol(fq_cpp_name: &str, pyname: &str) -> String {
    let mut w = format!("wrap{}", mangle(fq_cpp_name));
    if ident(fq_cpp_name) != pyname {
        w.push_str("_as_");
        w.push_str(pyname);
    }
    w
}

/// Fixed synthetic symbol for a class constructor, distinct from any user
/// method of that class.
pub fn ctor_symbol(class_fq_cpp_name: &str) -> String {
    format!("wrap{}_as___init__", mangle(class_fq_cpp_name))
}

/// Accessor symbol for a variable getter/setter.
pub fn accessor_symbol(prefix: &str, class_fq_cpp_name: &str, member: &str) -> String {
    format!("{}_{}", prefix, mangle(&format!("{class_fq_cpp_name}::{member}")))
}

/// The C++ namespace a wrapped class opens in the generated unit.
pub fn class_namespace(pyname: &str) -> String {
    format!("py{pyname}")
}

/// SWIG-like mangling of the dotted module path into the unit-wide wrapper
/// namespace. Unique per module so several units can be statically linked.
pub fn wrap_namespace(full_dotted_modname: &str) -> String {
    let uniq = full_dotted_modname.replace('_', "__").replace('.', "_");
    format!("{uniq}_pywrap")
}

/// `static_cast<t>(v)`
pub fn as_type(t: &str, v: &str) -> String {
    format!("static_cast<{t}>({v})")
}

/// `reinterpret_cast<PyObject*>(&s)`
pub fn as_py_obj(s: &str) -> String {
    format!("reinterpret_cast<PyObject*>(&{s})")
}

/// The `std::underlying_type` spelling for an enum.
pub fn enum_int_type(enum_cpp_name: &str) -> String {
    format!("typename std::underlying_type<{enum_cpp_name}>::type")
}

/// Access the C++ payload member of a wrapper PyObject.
pub fn get_cpp_obj(member: &str, py: &str) -> String {
    format!("reinterpret_cast<wrapper*>({py})->{member}")
}
