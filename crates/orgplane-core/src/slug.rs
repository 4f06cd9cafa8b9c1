//! URL-safe tenant slugs derived from organization names.

/// Longest slug the registry accepts.
pub const MAX_SLUG_LEN: usize = 50;

/// Lowercase `name`, collapse every run of characters outside `[a-z0-9]`
/// into a single `-`, and trim dashes from both ends. The result is at
/// most [`MAX_SLUG_LEN`] characters and may be empty.
pub fn normalize(name: &str) -> String {
    let mut slug = String::with_capacity(name.len().min(MAX_SLUG_LEN));
    let mut pending_dash = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    truncate(slug, MAX_SLUG_LEN)
}

/// `base` with a disambiguating suffix, still within [`MAX_SLUG_LEN`].
pub fn with_suffix(base: &str, suffix: &str) -> String {
    let room = MAX_SLUG_LEN.saturating_sub(suffix.len() + 1);
    let head = truncate(base.to_string(), room);
    if head.is_empty() {
        suffix.to_string()
    } else {
        format!("{head}-{suffix}")
    }
}

fn truncate(mut slug: String, max: usize) -> String {
    // Slugs are ASCII, so byte and char boundaries coincide.
    slug.truncate(max);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
