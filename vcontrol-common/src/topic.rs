//! Topic construction for readings and the control channel.
//!
//! Topics follow the pattern:
//! `<base_topic>/<sanitized command>` for readings and
//! `<base_topic>/commands` for inbound command batches.

use crate::error::{Error, Result};

/// Subtopic that carries inbound, comma-separated command batches.
pub const COMMANDS_SUBTOPIC: &str = "commands";

/// Characters the bus reserves for wildcards and selectors.
const RESERVED_CHARS: [char; 4] = ['*', '$', '?', '#'];

/// Append a subtopic to a base topic.
///
/// A separator is inserted unless the base already ends with one. A blank
/// subtopic returns the base unchanged.
///
/// # Example
/// ```
/// use vcontrol_common::topic::build_topic;
///
/// assert_eq!(build_topic("a/b", "c"), "a/b/c");
/// assert_eq!(build_topic("a/b/", "c"), "a/b/c");
/// assert_eq!(build_topic("a/b", "  "), "a/b");
/// ```
pub fn build_topic(base: &str, subtopic: &str) -> String {
    if subtopic.trim().is_empty() {
        return base.to_string();
    }

    if base.ends_with('/') {
        format!("{}{}", base, subtopic)
    } else {
        format!("{}/{}", base, subtopic)
    }
}

/// Turn a command name into a topic-safe subtopic.
///
/// ASCII letters, digits, `-`, `_` and `/` are kept; every other character
/// becomes `_`. Leading and trailing `/` are trimmed. The result may be
/// empty.
///
/// # Example
/// ```
/// use vcontrol_common::topic::sanitize_subtopic;
///
/// assert_eq!(sanitize_subtopic("get Temp#A"), "get_Temp_A");
/// assert_eq!(sanitize_subtopic("/heating/getTempA/"), "heating/getTempA");
/// ```
pub fn sanitize_subtopic(command: &str) -> String {
    let replaced: String = command
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/') {
                c
            } else {
                '_'
            }
        })
        .collect();

    replaced.trim_matches('/').to_string()
}

/// Check that a base topic can be used as a concrete publication key.
///
/// Rejects wildcard or selector characters and empty path segments. A
/// single trailing `/` is tolerated since [`build_topic`] absorbs it.
pub fn validate_base_topic(base: &str) -> Result<()> {
    if let Some(c) = base.chars().find(|c| RESERVED_CHARS.contains(c)) {
        return Err(Error::topic(base, format!("reserved character '{}'", c)));
    }

    let trimmed = base.strip_suffix('/').unwrap_or(base);
    if trimmed.split('/').any(str::is_empty) {
        return Err(Error::topic(base, "empty path segment"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_topic() {
        assert_eq!(build_topic("a/b", "c"), "a/b/c");
        assert_eq!(build_topic("a/b/", "c"), "a/b/c");
        assert_eq!(build_topic("a/b", ""), "a/b");
        assert_eq!(build_topic("a/b/", ""), "a/b/");
        assert_eq!(
            build_topic("vcontrol", COMMANDS_SUBTOPIC),
            "vcontrol/commands"
        );
    }

    #[test]
    fn test_sanitize_subtopic() {
        assert_eq!(sanitize_subtopic("get Temp#A"), "get_Temp_A");
        assert_eq!(sanitize_subtopic("getTempA"), "getTempA");
        assert_eq!(sanitize_subtopic("a-b_c/d"), "a-b_c/d");
        assert_eq!(sanitize_subtopic("//x//"), "x");
        assert_eq!(sanitize_subtopic("temp°C"), "temp_C");
    }

    #[test]
    fn test_sanitize_can_be_empty() {
        assert_eq!(sanitize_subtopic(""), "");
        assert_eq!(sanitize_subtopic("///"), "");
    }

    #[test]
    fn test_validate_base_topic() {
        assert!(validate_base_topic("home/heating").is_ok());
        assert!(validate_base_topic("home/heating/").is_ok());
        assert!(validate_base_topic("home/*").is_err());
        assert!(validate_base_topic("home//heating").is_err());
        assert!(validate_base_topic("/home").is_err());
    }
}
