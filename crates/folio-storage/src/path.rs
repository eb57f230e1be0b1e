//! Content-root-relative path handling shared by all backends.
//!
//! Every backend funnels its path arguments through [`normalize_path`] before
//! doing any I/O. This is the single place where traversal outside the content
//! root is detected.

use crate::storage::{StorageError, StorageErrorKind};

/// Normalize a content-root-relative path.
///
/// - `\` is treated as a separator, as is `/`
/// - empty segments and `.` are dropped (so leading `/` is ignored)
/// - `..` pops the previous segment
///
/// The result uses `/` separators with no leading or trailing separator; the
/// root itself normalizes to `""`.
///
/// # Errors
///
/// Returns [`StorageErrorKind::PathTraversal`] if a `..` segment would climb
/// above the root or the path carries a drive prefix (`C:`), and
/// [`StorageErrorKind::InvalidPath`] if it contains a NUL byte.
pub fn normalize_path(path: &str) -> Result<String, StorageError> {
    if path.contains('\0') {
        return Err(StorageError::new(StorageErrorKind::InvalidPath).with_path(path));
    }

    let mut segments: Vec<&str> = Vec::new();
    for (index, segment) in path.split(['/', '\\']).enumerate() {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(StorageError::path_traversal(path));
                }
            }
            drive if index == 0 && is_drive_prefix(drive) => {
                return Err(StorageError::path_traversal(path));
            }
            name => segments.push(name),
        }
    }
    Ok(segments.join("/"))
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Join two relative paths with `/`, treating an empty side as absent.
#[must_use]
pub fn join_path(base: &str, child: &str) -> String {
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_owned(),
        (false, true) => base.to_owned(),
        (false, false) => format!("{}/{}", base.trim_end_matches('/'), child),
    }
}

/// Last segment of a normalized path.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Parent of a normalized path (`""` for top-level names).
#[must_use]
pub fn parent_path(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plain_path() {
        assert_eq!(
            normalize_path("posts/hello/index.md").unwrap(),
            "posts/hello/index.md"
        );
    }

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize_path("").unwrap(), "");
        assert_eq!(normalize_path("/").unwrap(), "");
        assert_eq!(normalize_path(".").unwrap(), "");
    }

    #[test]
    fn test_normalize_dot_segments_inside_root() {
        assert_eq!(normalize_path("./posts//a/../b/").unwrap(), "posts/b");
        assert_eq!(normalize_path("/posts/a").unwrap(), "posts/a");
    }

    #[test]
    fn test_normalize_backslashes() {
        assert_eq!(normalize_path("posts\\a\\index.md").unwrap(), "posts/a/index.md");
    }

    #[test]
    fn test_traversal_rejected() {
        let err = normalize_path("../../secret").unwrap_err();

        assert_eq!(err.kind, StorageErrorKind::PathTraversal);
        assert_eq!(err.path.as_deref(), Some("../../secret"));
    }

    #[test]
    fn test_traversal_after_descent_rejected() {
        let err = normalize_path("posts/../../etc/passwd").unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::PathTraversal);
    }

    #[test]
    fn test_backslash_traversal_rejected() {
        let err = normalize_path("posts\\..\\..\\secret").unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::PathTraversal);
    }

    #[test]
    fn test_drive_prefix_rejected() {
        let err = normalize_path("C:\\Windows").unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::PathTraversal);
    }

    #[test]
    fn test_nul_rejected() {
        let err = normalize_path("a\0b").unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::InvalidPath);
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "a.md"), "a.md");
        assert_eq!(join_path("posts", ""), "posts");
        assert_eq!(join_path("posts", "a.md"), "posts/a.md");
        assert_eq!(join_path("posts/", "a.md"), "posts/a.md");
    }

    #[test]
    fn test_file_name_and_parent() {
        assert_eq!(file_name("posts/a/index.md"), "index.md");
        assert_eq!(file_name("index.md"), "index.md");
        assert_eq!(parent_path("posts/a/index.md"), "posts/a");
        assert_eq!(parent_path("index.md"), "");
    }
}
