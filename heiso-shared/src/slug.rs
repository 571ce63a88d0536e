//! URL slugs

/// Converts `input` into a URL-friendly slug.
///
/// Lowercases and trims the input, turns anything that is not a letter, digit
/// or whitespace into `-`, collapses runs of whitespace, `_` and `-` into a
/// single `-`, and strips leading and trailing dashes. Letters outside ASCII
/// are kept.
///
/// ```
/// use heiso_shared::slug::slugify;
///
/// assert_eq!(slugify("  Hello, World!  "), "hello-world");
/// assert_eq!(slugify("關於 我們"), "關於-我們");
/// ```
pub fn slugify(input: &str) -> String {
    let lowered = input.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_dash = false;

    for c in lowered.trim().chars() {
        let separator = c.is_whitespace() || c == '_' || c == '-' || !c.is_alphanumeric();
        if separator {
            pending_dash = true;
            continue;
        }
        if pending_dash && !out.is_empty() {
            out.push('-');
        }
        pending_dash = false;
        out.push(c);
    }

    out
}
