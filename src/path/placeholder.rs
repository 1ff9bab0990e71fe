// src/path/placeholder.rs

//! Placeholder expansion and collapse
//!
//! Paths stored inside a tree (metadata, generated shell stubs, install
//! rules) use symbolic tokens instead of absolute locations so that the tree
//! can be moved or mounted elsewhere.

use super::PackageIdentity;
use std::path::Path;

/// Token for the tree root
pub const SIT_TOKEN: &str = "${SIT}";

/// Replace package placeholders with values derived from `identity`
///
/// `${INSTALL_ROOT}` expands to `${SIT}/<canonical path>`, keeping the tree
/// itself symbolic. Legacy names are accepted as aliases.
pub fn expand_placeholders(s: &str, identity: &PackageIdentity) -> String {
    let install_root = format!("{}/{}", SIT_TOKEN, identity.canonical_path());
    let start_path = format!("{}/{}", SIT_TOKEN, identity.category);

    s.replace("${INSTALL_ROOT}", &install_root)
        .replace("${PACKAGE_CATEGORY}", &identity.category)
        .replace("${PACKAGE_NAME}", &identity.name)
        .replace("${PACKAGE_VERSION}", &identity.version)
        // legacy aliases
        .replace("${PROJECT_NAME}", &identity.name)
        .replace("${FULL_VERSION}", &identity.version)
        .replace("${PROJECT_START_PATH}", &start_path)
}

/// Replace occurrences of `tree_root` with `${SIT}`
///
/// Only whole path prefixes are replaced: `/hri/sit/latest/lib` collapses,
/// `/hri/sit/latestX` and `/opt/hri/sit/latest` do not.
pub fn collapse_to_placeholder(s: &str, tree_root: &Path) -> String {
    let root = tree_root.to_string_lossy();
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for (start, _) in s.match_indices(root) {
        let end = start + root.len();
        let before = s[..start].chars().next_back();
        let after = s[end..].chars().next();
        let bounded = !before.is_some_and(|c| is_path_char(c) || c == '/')
            && !after.is_some_and(is_path_char);
        if bounded {
            out.push_str(&s[last..start]);
            out.push_str(SIT_TOKEN);
            last = end;
        }
    }
    out.push_str(&s[last..]);
    out
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '+' | '~')
}

/// Remove every known tree token or tree prefix from `s`
///
/// Turns `${SIT}/Libraries/Foo/1.0`, `sit://Libraries/Foo/1.0` or
/// `/hri/sit/latest/Libraries/Foo/1.0` into `Libraries/Foo/1.0`.
pub fn strip(s: &str, roots: &[&Path]) -> String {
    let mut out = s.to_string();
    for token in ["${SIT}/", "${SIT}\\", "${SIT}", "%SIT%/", "%SIT%\\", "%SIT%", "sit://"] {
        out = out.replace(token, "");
    }
    for root in roots {
        let root = root.to_string_lossy();
        let root = root.trim_end_matches('/');
        if root.is_empty() {
            continue;
        }
        out = out.replace(&format!("{}/", root), "");
    }
    out
}

/// Expand `${NAME}` references through `lookup`
///
/// Unknown names are left untouched so they remain visible in logs.
pub fn expand_vars<F>(s: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::parse_canonical_path;

    #[test]
    fn test_expand_placeholders() {
        let id = parse_canonical_path("Libraries/Foo/1.0").unwrap();
        assert_eq!(
            expand_placeholders("${INSTALL_ROOT}/lib/${PACKAGE_NAME}", &id),
            "${SIT}/Libraries/Foo/1.0/lib/Foo"
        );
        assert_eq!(
            expand_placeholders("${PACKAGE_CATEGORY}:${PACKAGE_VERSION}", &id),
            "Libraries:1.0"
        );
    }

    #[test]
    fn test_expand_legacy_aliases() {
        let id = parse_canonical_path("Libraries/Foo/1.0").unwrap();
        assert_eq!(
            expand_placeholders("${PROJECT_START_PATH}/${PROJECT_NAME}/${FULL_VERSION}", &id),
            "${SIT}/Libraries/Foo/1.0"
        );
    }

    #[test]
    fn test_collapse_is_inverse_of_root_expansion() {
        let root = Path::new("/hri/sit/latest");
        let collapsed = collapse_to_placeholder("/hri/sit/latest/Libraries/Foo/1.0/lib", root);
        assert_eq!(collapsed, "${SIT}/Libraries/Foo/1.0/lib");
        assert_eq!(collapsed.replace(SIT_TOKEN, "/hri/sit/latest"), "/hri/sit/latest/Libraries/Foo/1.0/lib");

        assert_eq!(collapse_to_placeholder("/opt/other", root), "/opt/other");
    }

    #[test]
    fn test_collapse_only_whole_prefixes() {
        let root = Path::new("/hri/sit/latest/");
        assert_eq!(collapse_to_placeholder("/hri/sit/latestX/lib", root), "/hri/sit/latestX/lib");
        assert_eq!(collapse_to_placeholder("/opt/hri/sit/latest/lib", root), "/opt/hri/sit/latest/lib");
        assert_eq!(collapse_to_placeholder("/hri/sit/latest", root), "${SIT}");
        assert_eq!(
            collapse_to_placeholder("PATH=/hri/sit/latest/bin:/hri/sit/latest.old/bin", root),
            "PATH=${SIT}/bin:/hri/sit/latest.old/bin"
        );
        assert_eq!(
            collapse_to_placeholder("\"/hri/sit/latest/a\" \"/hri/sit/latest/b\"", root),
            "\"${SIT}/a\" \"${SIT}/b\""
        );
    }

    #[test]
    fn test_strip() {
        let proxy = Path::new("/home/me/.HRI/sit/latest");
        let root = Path::new("/hri/sit/latest");
        let roots = [proxy, root];

        assert_eq!(strip("${SIT}/Libraries/Foo/1.0", &roots), "Libraries/Foo/1.0");
        assert_eq!(strip("sit://Libraries/Foo/1.0", &roots), "Libraries/Foo/1.0");
        assert_eq!(strip("%SIT%/Libraries/Foo/1.0", &roots), "Libraries/Foo/1.0");
        assert_eq!(strip("/hri/sit/latest/Libraries/Foo/1.0", &roots), "Libraries/Foo/1.0");
        assert_eq!(strip("/home/me/.HRI/sit/latest/Libraries/Foo/1.0", &roots), "Libraries/Foo/1.0");
    }

    #[test]
    fn test_expand_vars() {
        let lookup = |name: &str| match name {
            "MAKEFILE_PLATFORM" => Some("focal64".to_string()),
            _ => None,
        };
        assert_eq!(expand_vars("lib/${MAKEFILE_PLATFORM}", lookup), "lib/focal64");
        assert_eq!(expand_vars("${UNKNOWN}/x", lookup), "${UNKNOWN}/x");
        assert_eq!(expand_vars("open ${brace", lookup), "open ${brace");
        assert_eq!(expand_vars("plain", lookup), "plain");
    }
}
