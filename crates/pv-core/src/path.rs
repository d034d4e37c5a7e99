//! Qualified path helpers.
//!
//! Paths are `/`-separated. A path starting with `/` is absolute, anything else
//! is relative to the module which declares the variable. `..` refers to the
//! parent module, `.` to the module itself.

use crate::PvError;

/// Last path component (the variable name itself).
pub fn unqualified_name(qualified: &str) -> &str {
    match qualified.rfind('/') {
        Some(pos) => &qualified[pos + 1..],
        None => qualified,
    }
}

/// Everything before the last component, `.` if there is none.
pub fn path_name(qualified: &str) -> &str {
    match qualified.rfind('/') {
        Some(0) => "/",
        Some(pos) => &qualified[..pos],
        None => ".",
    }
}

pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Resolve `path` against the absolute module path `base`.
///
/// The result is normalized: no empty components, no `.` or `..`.
pub fn resolve(base: &str, path: &str) -> Result<String, PvError> {
    let mut components: Vec<&str> = Vec::new();
    let start = if is_absolute(path) {
        String::new()
    } else {
        base.to_string()
    };
    for part in start.split('/').chain(path.split('/')) {
        match part {
            "" | "." => {}
            ".." => {
                if components.pop().is_none() {
                    return Err(PvError::logic(format!(
                        "path '{path}' relative to '{base}' leaves the root"
                    )));
                }
            }
            name => components.push(name),
        }
    }
    Ok(format!("/{}", components.join("/")))
}

/// Append a single component to an absolute path.
pub fn join(base: &str, name: &str) -> String {
    if base == "/" || base.is_empty() {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_qualified_names() {
        assert_eq!(unqualified_name("/a/b/status"), "status");
        assert_eq!(unqualified_name("status"), "status");
        assert_eq!(path_name("/a/b/status"), "/a/b");
        assert_eq!(path_name("/status"), "/");
        assert_eq!(path_name("status"), ".");
    }

    #[test]
    fn resolve_relative_and_absolute() {
        assert_eq!(resolve("/a/b", "x").unwrap(), "/a/b/x");
        assert_eq!(resolve("/a/b", "../x").unwrap(), "/a/x");
        assert_eq!(resolve("/a/b", "./c/../x").unwrap(), "/a/b/x");
        assert_eq!(resolve("/a/b", "/Debug/x").unwrap(), "/Debug/x");
        assert_eq!(resolve("/", "x").unwrap(), "/x");
    }

    #[test]
    fn resolve_rejects_escaping_root() {
        let err = resolve("/a", "../../x").unwrap_err();
        assert!(err.to_string().contains("leaves the root"));
    }

    #[test]
    fn join_components() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }
}
