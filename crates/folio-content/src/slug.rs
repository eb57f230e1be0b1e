//! Slug and file-name sanitization.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::error::ContentError;

/// Turn arbitrary text into a URL-safe ASCII slug.
///
/// Accents are stripped through NFKD decomposition, everything is lowercased,
/// and each run of other characters becomes a single `-`. The result has no
/// leading or trailing `-` and may be empty.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut separator = false;
    for c in text.nfkd() {
        if c.is_ascii_alphanumeric() {
            if separator && !slug.is_empty() {
                slug.push('-');
            }
            separator = false;
            slug.push(c.to_ascii_lowercase());
        } else if !is_combining_mark(c) {
            separator = true;
        }
    }
    slug
}

/// Build a stored image name from an uploaded file name.
///
/// The base name is slugified (falling back to `image`), the extension is kept
/// lowercased, and `timestamp_ms` is appended to the base so repeated uploads
/// of the same file do not collide.
///
/// # Errors
///
/// Returns [`ContentError::InvalidFileName`] for an empty name.
pub fn sanitize_image_name(filename: &str, timestamp_ms: i64) -> Result<String, ContentError> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename).trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(ContentError::InvalidFileName(filename.to_owned()));
    }

    let (base, extension) = match name.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() => (base, ext),
        _ => (name, ""),
    };
    let extension: String = extension
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    let mut base = slugify(base);
    if base.is_empty() {
        base.push_str("image");
    }

    if extension.is_empty() {
        Ok(format!("{base}-{timestamp_ms}"))
    } else {
        Ok(format!("{base}-{timestamp_ms}.{extension}"))
    }
}

/// Check that `name` is a single path segment.
pub(crate) fn validate_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
    }

    #[test]
    fn test_slugify_strips_accents() {
        assert_eq!(slugify("Crème brûlée!"), "creme-brulee");
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("  --Rust & Go: 2024 -- "), "rust-go-2024");
    }

    #[test]
    fn test_slugify_compatibility_forms() {
        assert_eq!(slugify("ﬁle №5"), "file-no5");
    }

    #[test]
    fn test_slugify_non_latin_is_empty() {
        assert_eq!(slugify("日本語"), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_sanitize_image_name() {
        assert_eq!(
            sanitize_image_name("My Photo.JPG", 1_700_000_000_000).unwrap(),
            "my-photo-1700000000000.jpg"
        );
    }

    #[test]
    fn test_sanitize_image_name_strips_directories() {
        assert_eq!(
            sanitize_image_name("../../etc/passwd.png", 1).unwrap(),
            "passwd-1.png"
        );
        assert_eq!(
            sanitize_image_name("C:\\Users\\me\\Café.PNG", 2).unwrap(),
            "cafe-2.png"
        );
    }

    #[test]
    fn test_sanitize_image_name_without_extension() {
        assert_eq!(sanitize_image_name("diagram", 5).unwrap(), "diagram-5");
        assert_eq!(sanitize_image_name(".hidden", 5).unwrap(), "hidden-5");
    }

    #[test]
    fn test_sanitize_image_name_fallback_base() {
        assert_eq!(sanitize_image_name("写真.png", 7).unwrap(), "image-7.png");
    }

    #[test]
    fn test_sanitize_image_name_rejects_empty() {
        assert!(matches!(
            sanitize_image_name("", 1),
            Err(ContentError::InvalidFileName(_))
        ));
        assert!(sanitize_image_name("images/..", 1).is_err());
    }

    #[test]
    fn test_validate_segment() {
        assert!(validate_segment("hello-world"));
        assert!(!validate_segment(""));
        assert!(!validate_segment(".."));
        assert!(!validate_segment("a/b"));
        assert!(!validate_segment("a\\b"));
    }
}
