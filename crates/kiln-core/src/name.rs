//! Helpers for the three spellings of a type name.
//!
//! - internal: `com/example/Outer$Inner` (as stored in artifacts)
//! - binary: `com.example.Outer$Inner`
//! - root: `com.example.Outer` (outermost enclosing type)

use smol_str::SmolStr;

/// Separator between an outer type name and a nested type name.
pub const NESTED_SEPARATOR: char = '$';

/// Package prefixes that are never tracked as project-local dependencies.
pub const DEFAULT_SYSTEM_PREFIXES: &[&str] = &["java.", "javax.", "jdk.", "sun.", "com.sun."];

pub fn internal_to_binary(internal: &str) -> SmolStr {
    SmolStr::new(internal.replace('/', "."))
}

pub fn binary_to_internal(binary: &str) -> String {
    binary.replace('.', "/")
}

/// Package part of a binary name, or `""` for the unnamed package.
pub fn package_of(binary: &str) -> &str {
    match binary.rfind('.') {
        Some(idx) => &binary[..idx],
        None => "",
    }
}

/// Simple name of a (possibly nested) binary type name.
pub fn simple_name(binary: &str) -> &str {
    let tail = match binary.rfind('.') {
        Some(idx) => &binary[idx + 1..],
        None => binary,
    };
    match tail.rfind(NESTED_SEPARATOR) {
        Some(idx) => &tail[idx + 1..],
        None => tail,
    }
}

/// Binary name of the type directly enclosing `binary`, if it is nested.
pub fn outer_binary_name(binary: &str) -> Option<&str> {
    let pkg_end = binary.rfind('.').map(|idx| idx + 1).unwrap_or(0);
    let idx = binary[pkg_end..].rfind(NESTED_SEPARATOR)?;
    if idx == 0 {
        return None;
    }
    Some(&binary[..pkg_end + idx])
}

/// Binary name of the outermost type enclosing `binary` (itself when top-level).
pub fn root_binary_name(binary: &str) -> &str {
    let pkg_end = binary.rfind('.').map(|idx| idx + 1).unwrap_or(0);
    match binary[pkg_end..].find(NESTED_SEPARATOR) {
        Some(0) | None => binary,
        Some(idx) => &binary[..pkg_end + idx],
    }
}

/// Whether `binary` falls under one of the given framework/system prefixes.
pub fn is_system_name<S: AsRef<str>>(binary: &str, prefixes: &[S]) -> bool {
    prefixes
        .iter()
        .any(|prefix| binary.starts_with(prefix.as_ref()))
}
