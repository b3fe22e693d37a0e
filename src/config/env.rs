//! Environment variable overrides (spec.md §4.2, §6). Applied last, after
//! the global and repo-local files, so they always win.

/// Parse a loosely-typed boolean: `true/false/1/0/yes/no/on/off`,
/// case-insensitively.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an array-valued env var: either a bracketed literal
/// (`[a, b, c]`) or bare comma-separated values, trimming whitespace
/// around each element.
pub fn parse_array(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing_is_case_insensitive() {
        for s in ["true", "TRUE", "1", "yes", "YES", "on"] {
            assert_eq!(parse_bool(s), Some(true), "{s}");
        }
        for s in ["false", "FALSE", "0", "no", "off"] {
            assert_eq!(parse_bool(s), Some(false), "{s}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn array_parsing_accepts_bracketed_and_bare_csv() {
        assert_eq!(
            parse_array("[nvim, lazygit, agent]"),
            vec!["nvim", "lazygit", "agent"]
        );
        assert_eq!(
            parse_array("nvim, lazygit,agent"),
            vec!["nvim", "lazygit", "agent"]
        );
        assert_eq!(parse_array("\"build\", 'dist/**'"), vec!["build", "dist/**"]);
    }
}
