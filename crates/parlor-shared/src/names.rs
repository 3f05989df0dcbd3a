//! Normalization rules for channel names and display names.

use crate::error::ValidationError;

/// Normalize a raw channel name into its stored slug form.
///
/// Lowercases the input, keeps `[a-z0-9_]`, collapses every other run of
/// characters into a single `-`, and trims hyphens from both ends, so
/// `"My Team!!"` becomes `"my-team"`. An input that normalizes to the empty
/// string is rejected.
pub fn normalize_channel_name(raw: &str) -> Result<String, ValidationError> {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_gap = false;

    for c in raw.chars().flat_map(|c| c.to_lowercase()) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            if pending_gap && !slug.is_empty() {
                slug.push('-');
            }
            pending_gap = false;
            slug.push(c);
        } else {
            pending_gap = true;
        }
    }

    // No trailing trim needed: a gap only materializes in front of a kept
    // character, so the slug never ends with '-'.
    if slug.is_empty() {
        return Err(ValidationError::EmptyChannelName);
    }
    Ok(slug)
}

/// Validate and trim a display name. Length bounds are in characters, not
/// bytes, so multi-byte names are measured fairly.
pub fn validate_display_name(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if !(3..=32).contains(&len) {
        return Err(ValidationError::InvalidDisplayName);
    }
    Ok(trimmed.to_string())
}

/// The lowercase form used for prefix search and uniqueness-insensitive
/// lookups.
pub fn username_lower(username: &str) -> String {
    username.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_collapses_and_trims() {
        assert_eq!(normalize_channel_name("My Team!!").unwrap(), "my-team");
        assert_eq!(normalize_channel_name("  general  ").unwrap(), "general");
        assert_eq!(normalize_channel_name("a//b//c").unwrap(), "a-b-c");
        assert_eq!(normalize_channel_name("---dev---").unwrap(), "dev");
    }

    #[test]
    fn slug_keeps_underscores_and_digits() {
        assert_eq!(normalize_channel_name("_ops_").unwrap(), "_ops_");
        assert_eq!(normalize_channel_name("Team 2024").unwrap(), "team-2024");
    }

    #[test]
    fn slug_rejects_unusable_input() {
        assert!(matches!(
            normalize_channel_name("!!!"),
            Err(ValidationError::EmptyChannelName)
        ));
        assert!(normalize_channel_name("").is_err());
    }

    #[test]
    fn display_name_bounds_are_in_chars() {
        assert_eq!(validate_display_name("  Ada  ").unwrap(), "Ada");
        assert!(validate_display_name("ab").is_err());
        assert!(validate_display_name(&"x".repeat(33)).is_err());
        // Three multi-byte characters are three characters, not nine bytes.
        assert_eq!(validate_display_name("アダア").unwrap(), "アダア");
    }
}
