//! Pure, deterministic naming helpers.
//!
//! Everything here is a pure function of its inputs so that two processes
//! operating on the same repository compute identical tmux session/window
//! names without coordinating (spec.md §8, invariant 3).

pub const BRANCH_TYPES: &[&str] = &["feat", "fix", "chore", "docs", "refactor", "test"];

const MAX_SESSION_NAME: usize = 100;
const MAX_WINDOW_NAME: usize = 60;

/// Normalize a human title into a branch slug: lowercase, `[a-z0-9/-]`,
/// collapsed dashes/slashes, no leading/trailing `-`/`/`.
pub fn slugify(input: &str) -> String {
    let lower = input.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    for ch in lower.chars() {
        if ch.is_ascii_alphanumeric() || ch == '/' || ch == '-' {
            out.push(ch);
        } else if ch.is_whitespace() || ch == '_' {
            out.push('-');
        }
        // everything else is dropped
    }

    let collapsed = collapse_runs(collapse_runs(out, '-'), '/');
    collapsed.trim_matches(|c| c == '-' || c == '/').to_string()
}

fn collapse_runs(input: String, ch: char) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_was_ch = false;
    for c in input.chars() {
        if c == ch {
            if !prev_was_ch {
                out.push(c);
            }
            prev_was_ch = true;
        } else {
            out.push(c);
            prev_was_ch = false;
        }
    }
    out
}

/// Build `<type>/<slug>` from a branch type and a human title.
pub fn make_branch_name(branch_type: &str, title: &str) -> Result<String, crate::error::SproutError> {
    let branch_type = branch_type.to_lowercase();
    if !BRANCH_TYPES.contains(&branch_type.as_str()) {
        return Err(crate::error::SproutError::InvalidBranchType(branch_type));
    }
    let slug = slugify(title);
    if slug.is_empty() {
        return Err(crate::error::SproutError::EmptySlug(title.to_string()));
    }
    Ok(format!("{branch_type}/{slug}"))
}

/// Normalize a string into a filesystem/tmux-safe name:
/// `[A-Za-z0-9._-]`, no `--`, no leading/trailing `-`, `"default"` when
/// the cleaned result would be empty.
pub fn safe_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' || ch == '-' {
            out.push(ch);
        } else {
            out.push('-');
        }
    }
    let collapsed = collapse_runs(out, '-');
    let trimmed = collapsed.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "default".to_string()
    } else {
        trimmed
    }
}

fn truncate_chars(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        input.to_string()
    } else {
        input.chars().take(max).collect()
    }
}

/// `"<prefix>-<safeRepoName>"`, or bare `safeRepoName` when prefix is empty.
pub fn session_name_for_repo(prefix: &str, repo_name: &str) -> String {
    let repo = safe_name(repo_name);
    if prefix.trim().is_empty() {
        repo
    } else {
        format!("{}-{}", safe_name(prefix), repo)
    }
}

/// Repo session name + `-` + safe(branch, else basename of path). Capped at
/// 100 characters total.
pub fn session_name_for_worktree(
    prefix: &str,
    repo_name: &str,
    branch_or_path_basename: &str,
) -> String {
    let base = session_name_for_repo(prefix, repo_name);
    let suffix = safe_name(branch_or_path_basename);
    let full = format!("{base}-{suffix}");
    truncate_chars(&full, MAX_SESSION_NAME)
}

pub fn main_window_name(branch: &str) -> String {
    truncate_chars(&safe_name(branch), MAX_WINDOW_NAME)
}

pub fn agent_window_name(branch: &str) -> String {
    truncate_chars(&format!("agent-{}", safe_name(branch)), MAX_WINDOW_NAME)
}

pub fn git_window_name(branch: &str) -> String {
    truncate_chars(&format!("git-{}", safe_name(branch)), MAX_WINDOW_NAME)
}

/// `"tool-<safe(first token)>"`, with a `-2`, `-3`, ... suffix to
/// disambiguate against `existing` names within the same session.
pub fn tool_window_name(command: &str, existing: &[String]) -> String {
    let first_token = command.split_whitespace().next().unwrap_or(command);
    let base = truncate_chars(&format!("tool-{}", safe_name(first_token)), MAX_WINDOW_NAME);
    dedupe_name(&base, existing)
}

/// Disambiguate `name` against `existing` with `-2`, `-3`, ... suffixes.
pub fn dedupe_name(name: &str, existing: &[String]) -> String {
    if !existing.iter().any(|n| n == name) {
        return name.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{name}-{n}");
        if !existing.iter().any(|e| e == &candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Add OAuth Support!"), "add-oauth-support");
        assert_eq!(slugify("  leading/trailing  "), "leading/trailing");
        assert_eq!(slugify("a--b//c"), "a-b/c");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn make_branch_name_validates_type_and_slug() {
        assert_eq!(
            make_branch_name("feat", "my feature").unwrap(),
            "feat/my-feature"
        );
        assert!(matches!(
            make_branch_name("bogus", "x"),
            Err(crate::error::SproutError::InvalidBranchType(_))
        ));
        assert!(matches!(
            make_branch_name("feat", "---"),
            Err(crate::error::SproutError::EmptySlug(_))
        ));
    }

    #[test]
    fn safe_name_closure() {
        assert_eq!(safe_name("my repo!!"), "my-repo");
        assert_eq!(safe_name(""), "default");
        assert_eq!(safe_name("---"), "default");
        assert_eq!(safe_name("a.b_c-d"), "a.b_c-d");
    }

    #[test]
    fn session_names_differ_per_branch() {
        let a = session_name_for_worktree("sprout", "myrepo", "feat/x");
        let b = session_name_for_worktree("sprout", "myrepo", "feat/y");
        assert_ne!(a, b);
        assert!(a.starts_with("sprout-myrepo-"));
    }

    #[test]
    fn tool_window_name_dedupes() {
        let existing = vec!["tool-htop".to_string()];
        assert_eq!(tool_window_name("htop", &existing), "tool-htop-2");
        assert_eq!(tool_window_name("top", &existing), "tool-top");
    }

    proptest! {
        #[test]
        fn slugify_idempotent_and_closed(s in ".{0,64}") {
            let once = slugify(&s);
            let twice = slugify(&once);
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '/' || c == '-'));
            prop_assert!(!once.contains("--"));
            prop_assert!(!once.contains("//"));
            prop_assert!(!once.starts_with('-') && !once.starts_with('/'));
            prop_assert!(!once.ends_with('-') && !once.ends_with('/'));
        }

        #[test]
        fn safe_name_closed(s in ".{0,64}") {
            let cleaned = safe_name(&s);
            prop_assert!(cleaned.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'));
            prop_assert!(!cleaned.contains("--"));
            prop_assert!(!cleaned.starts_with('-') && !cleaned.ends_with('-'));
        }
    }
}
