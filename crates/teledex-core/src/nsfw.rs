//! Keyword-based NSFW heuristic.

/// Keywords that flag an entity as NSFW (matched case-insensitively as substrings)
pub const NSFW_KEYWORDS: &[&str] = &[
    "18+",
    "nsfw",
    "adult",
    "xxx",
    "porn",
    "sex",
    "adult content",
    "mature content",
    "21+",
    "explicit",
];

/// Returns `true` if any keyword appears in the title, description or identifier.
#[must_use]
pub fn is_nsfw(title: &str, description: &str, identifier: &str) -> bool {
    let haystack = [title, description, identifier]
        .map(str::to_lowercase)
        .join(" ");
    NSFW_KEYWORDS
        .iter()
        .any(|keyword| haystack.contains(&keyword.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_in_any_field() {
        assert!(is_nsfw("Late night XXX", "", "pack"));
        assert!(is_nsfw("Cats", "Mature Content inside", "cats"));
        assert!(is_nsfw("Cats", "", "nsfw_cats"));
        assert!(is_nsfw("Club 21+", "", "club"));
    }

    #[test]
    fn test_clean_entity() {
        assert!(!is_nsfw("Rust News", "Daily crab facts", "rustnews"));
        assert!(!is_nsfw("", "", ""));
    }
}
