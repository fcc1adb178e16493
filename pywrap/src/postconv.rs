//! Post-conversion initializers for `PyObjFrom` calls.
//!
//! The type-map pairs a native type spelling with a conversion applied after
//! the generic object-from-native step. The table is rendered once per unit
//! as `#define _N <conversion>` lines (sorted for deterministic output) and
//! every later initializer refers to the indexes, so a mapped `str` renders
//! as `_1`, `list<str>` as `{_1}`, and an unmapped type as the pass-through
//! `{}`.

use std::collections::HashMap;

use crate::model::TypeSpec;

/// The "no conversion" initializer.
pub const PASS: &str = "{}";

/// Render the `#define` table and return the spelling→index map used by
/// [`initializer`]. Keys are emitted in sorted order.
pub fn gen_table(typemap: &HashMap<String, String>) -> (Vec<String>, HashMap<String, String>) {
    let mut lines = Vec::new();
    let mut index = HashMap::new();
    if typemap.is_empty() {
        return (lines, index);
    }
    lines.push(String::new());
    lines.push("#define _0 py::postconv::PASS".to_string());
    let mut keys: Vec<&String> = typemap.keys().collect();
    keys.sort();
    for (i, key) in keys.into_iter().enumerate() {
        lines.push(format!("#define _{} {}", i + 1, typemap[key]));
        index.insert(key.clone(), format!("_{}", i + 1));
    }
    (lines, index)
}

/// Transform a (possibly nested container) type into a post-conversion
/// initializer list over the table indexes.
pub fn initializer(ty: &TypeSpec, index: &HashMap<String, String>) -> String {
    if ty.callable.is_some() {
        return PASS.to_string();
    }
    if index.is_empty() {
        return PASS.to_string();
    }
    inner(ty, index, false)
}

fn inner(ty: &TypeSpec, index: &HashMap<String, String>, nested: bool) -> String {
    let expr = if !ty.params.is_empty() {
        let parts: Vec<String> = ty.params.iter().map(|p| inner(p, index, true)).collect();
        format!("{{{}}}", parts.join(","))
    } else {
        index
            .get(&ty.lang_type)
            .cloned()
            .unwrap_or_else(|| "_0".to_string())
    };
    // Collapse an all-pass initializer at the top level.
    if nested || !expr.trim_matches(&['{', '_', '0', ',', '}'][..]).is_empty() {
        expr
    } else {
        PASS.to_string()
    }
}
