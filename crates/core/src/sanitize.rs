//! Title and filename sanitizing.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Strip diacritics: decompose (NFD), drop combining marks, recompose.
pub fn strip_diacritics(input: &str) -> String {
    input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect()
}

/// Sanitize a display title.
///
/// Diacritics are stripped, every character that is not a letter, digit,
/// underscore or whitespace is removed, and whitespace runs collapse to a
/// single space.
pub fn sanitize_title(input: &str) -> String {
    let stripped = strip_diacritics(input);
    let kept: String = stripped
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sanitize a filename, keeping its extension untouched.
pub fn sanitize_filename(name: &str) -> String {
    let (base, ext) = split_extension(name);
    match ext {
        Some(ext) => format!("{}.{ext}", sanitize_title(base)),
        None => sanitize_title(base),
    }
}

/// Split `name` into stem and extension at the last dot.
///
/// A leading dot (hidden file) is not treated as an extension separator.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => (&name[..pos], Some(&name[pos + 1..])),
        _ => (name, None),
    }
}
