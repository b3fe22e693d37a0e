//! Configuration Resolver — merges defaults, a global file, a repo-local
//! file, and environment overrides into one frozen [`Configuration`] value
//! per process (spec.md §4.2).

pub mod env;
pub mod windows;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{SproutError, SproutResult};
use windows::WindowSpec;

/// A single compiled copy-exclusion pattern (spec.md §4.4, Open Question:
/// "the source's copy-exclusion matching is implemented in two places ...
/// an implementer should consolidate and document the canonical matcher" —
/// this is that consolidation; both the Tree Copier and any future caller
/// go through [`ExclusionSet::is_excluded`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionPattern {
    /// Exact path-segment match, e.g. `build` — excludes any path that has
    /// `build` as one of its `/`-separated components.
    ExactSegment(String),
    /// `prefix/**` — excludes anything under `prefix/`.
    DirPrefix(String),
    /// `*.ext` — excludes by the last path segment's suffix.
    Suffix(String),
    /// `prefix/` (trailing slash, no `**`) — same as `DirPrefix` but
    /// written without the glob suffix.
    TrailingSlash(String),
}

impl ExclusionPattern {
    pub fn compile(raw: &str) -> Self {
        if let Some(prefix) = raw.strip_suffix("/**") {
            ExclusionPattern::DirPrefix(prefix.to_string())
        } else if let Some(suffix) = raw.strip_prefix('*') {
            ExclusionPattern::Suffix(suffix.to_string())
        } else if let Some(prefix) = raw.strip_suffix('/') {
            ExclusionPattern::TrailingSlash(prefix.to_string())
        } else {
            ExclusionPattern::ExactSegment(raw.to_string())
        }
    }

    pub fn matches(&self, relative_path: &str) -> bool {
        match self {
            ExclusionPattern::ExactSegment(seg) => {
                relative_path.split('/').any(|part| part == seg)
            }
            ExclusionPattern::DirPrefix(prefix) | ExclusionPattern::TrailingSlash(prefix) => {
                relative_path == prefix.as_str()
                    || relative_path.starts_with(&format!("{prefix}/"))
            }
            ExclusionPattern::Suffix(suffix) => relative_path
                .rsplit('/')
                .next()
                .unwrap_or(relative_path)
                .ends_with(suffix),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet(Vec<ExclusionPattern>);

impl ExclusionSet {
    pub fn compile(patterns: &[String]) -> Self {
        Self(patterns.iter().map(|p| ExclusionPattern::compile(p)).collect())
    }

    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.0.iter().any(|p| p.matches(relative_path))
    }
}

fn default_session_tools() -> Vec<String> {
    vec!["nvim".to_string(), "lazygit".to_string(), "agent".to_string()]
}

fn default_exclusions() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        "target".to_string(),
        ".DS_Store".to_string(),
    ]
}

/// The frozen, process-wide configuration value. Built once via
/// [`Configuration::load`]; never mutated thereafter.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub base_branch: Option<String>,
    pub worktree_root_template: String,
    pub auto_launch: bool,
    pub auto_start_agent: bool,
    pub session_tools: Vec<String>,
    pub agent_command: String,
    pub agent_command_by_type: BTreeMap<String, String>,
    pub default_agent_type: Option<String>,
    pub session_prefix: String,
    pub copy_untracked_exclude: ExclusionSet,
    pub update_check: bool,
    pub window_names_global: BTreeMap<String, Vec<String>>,
    pub legacy_layouts: BTreeMap<String, BTreeMap<String, BTreeMap<usize, String>>>,
    pub structured_windows_repo_local: Vec<WindowSpec>,
    pub structured_windows_by_repo: BTreeMap<String, Vec<WindowSpec>>,
    pub emit_cd_marker: bool,
    pub debug_log_path: Option<PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            base_branch: None,
            worktree_root_template: "../{repo}.worktrees".to_string(),
            auto_launch: true,
            auto_start_agent: false,
            session_tools: default_session_tools(),
            agent_command: "claude".to_string(),
            agent_command_by_type: BTreeMap::new(),
            default_agent_type: None,
            session_prefix: "sprout".to_string(),
            copy_untracked_exclude: ExclusionSet::compile(&default_exclusions()),
            update_check: true,
            window_names_global: BTreeMap::new(),
            legacy_layouts: BTreeMap::new(),
            structured_windows_repo_local: Vec::new(),
            structured_windows_by_repo: BTreeMap::new(),
            emit_cd_marker: false,
            debug_log_path: default_debug_log_path(),
        }
    }
}

fn default_debug_log_path() -> Option<PathBuf> {
    xdg_config_home().map(|dir| dir.join("sprout").join("debug.log"))
}

fn xdg_config_home() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
}

/// One layer's worth of overrides, all-optional so later layers can merge
/// shallowly over earlier ones.
#[derive(Debug, Clone, Default)]
struct RawLayer {
    base_branch: Option<String>,
    worktree_root_template: Option<String>,
    auto_launch: Option<bool>,
    auto_start_agent: Option<bool>,
    session_tools: Option<Vec<String>>,
    agent_command: Option<String>,
    agent_command_by_type: BTreeMap<String, String>,
    default_agent_type: Option<String>,
    session_prefix: Option<String>,
    copy_untracked_exclude: Option<Vec<String>>,
    update_check: Option<bool>,
    window_names_global: BTreeMap<String, Vec<String>>,
    legacy_layouts: BTreeMap<String, BTreeMap<String, BTreeMap<usize, String>>>,
    structured_windows_top_level: Vec<WindowSpec>,
    structured_windows_by_repo: BTreeMap<String, Vec<WindowSpec>>,
    launch_nvim: Option<bool>,
    launch_lazygit: Option<bool>,
}

fn apply_layer(base: &mut Configuration, layer: RawLayer) {
    if let Some(v) = layer.base_branch {
        base.base_branch = Some(v);
    }
    if let Some(v) = layer.worktree_root_template {
        base.worktree_root_template = v;
    }
    if let Some(v) = layer.auto_launch {
        base.auto_launch = v;
    }
    if let Some(v) = layer.auto_start_agent {
        base.auto_start_agent = v;
    }
    if let Some(v) = layer.session_tools {
        base.session_tools = dedupe_preserve_order(v);
    }
    if let Some(v) = layer.agent_command {
        base.agent_command = v;
    }
    base.agent_command_by_type.extend(layer.agent_command_by_type);
    if let Some(v) = layer.default_agent_type {
        base.default_agent_type = Some(v);
    }
    if let Some(v) = layer.session_prefix {
        base.session_prefix = v;
    }
    if let Some(v) = layer.copy_untracked_exclude {
        base.copy_untracked_exclude = ExclusionSet::compile(&v);
    }
    if let Some(v) = layer.update_check {
        base.update_check = v;
    }
    base.window_names_global.extend(layer.window_names_global);
    for (repo, wins) in layer.legacy_layouts {
        base.legacy_layouts.entry(repo).or_default().extend(wins);
    }
    if !layer.structured_windows_top_level.is_empty() {
        base.structured_windows_repo_local = layer.structured_windows_top_level;
    }
    base.structured_windows_by_repo.extend(layer.structured_windows_by_repo);

    // Legacy booleans mutate the ordered tool list: insert at end if
    // missing when enabling, remove when disabling (spec.md §4.2).
    if let Some(enabled) = layer.launch_nvim {
        mutate_tool_list(&mut base.session_tools, "nvim", enabled);
    }
    if let Some(enabled) = layer.launch_lazygit {
        mutate_tool_list(&mut base.session_tools, "lazygit", enabled);
    }
}

fn mutate_tool_list(tools: &mut Vec<String>, name: &str, enabled: bool) {
    let present = tools.iter().any(|t| t.eq_ignore_ascii_case(name));
    if enabled && !present {
        tools.push(name.to_string());
    } else if !enabled && present {
        tools.retain(|t| !t.eq_ignore_ascii_case(name));
    }
}

fn dedupe_preserve_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let trimmed = item.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.insert(key) {
            out.push(trimmed);
        }
    }
    out
}

/// Strip `#`-comments outside quoted strings.
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut quote_char = ' ';
    for (idx, ch) in line.char_indices() {
        if in_quotes {
            if ch == quote_char {
                in_quotes = false;
            }
        } else if ch == '"' || ch == '\'' {
            in_quotes = true;
            quote_char = ch;
        } else if ch == '#' {
            return &line[..idx];
        }
    }
    line
}

fn parse_scalar(raw: &str) -> String {
    raw.trim().trim_matches('"').trim_matches('\'').to_string()
}

fn parse_value_array(raw: &str) -> Vec<String> {
    env::parse_array(raw)
}

fn parse_flat_source(content: &str, file: &Path) -> SproutResult<RawLayer> {
    let mut layer = RawLayer::default();
    let mut pending_structured_toml = String::new();
    let mut in_structured_block = false;

    for (idx, raw_line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let stripped = strip_comment(raw_line);
        let trimmed = stripped.trim();

        if trimmed.starts_with("[[windows]]") || trimmed.starts_with("[repos.") || in_structured_block {
            in_structured_block = true;
            pending_structured_toml.push_str(raw_line);
            pending_structured_toml.push('\n');
            continue;
        }

        if trimmed.is_empty() {
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(SproutError::ConfigParse {
                file: file.to_path_buf(),
                line: line_no,
                message: format!("expected `key = value`, got {trimmed:?}"),
            });
        };
        let key = key.trim();
        let value = value.trim();

        apply_flat_key(&mut layer, key, value);
    }

    if !pending_structured_toml.is_empty() {
        apply_structured_toml(&mut layer, &pending_structured_toml, file)?;
    }

    Ok(layer)
}

fn apply_flat_key(layer: &mut RawLayer, key: &str, value: &str) {
    match key {
        "base_branch" => layer.base_branch = Some(parse_scalar(value)),
        "worktree_root_template" => layer.worktree_root_template = Some(parse_scalar(value)),
        "auto_launch" => layer.auto_launch = env::parse_bool(value),
        "auto_start_agent" => layer.auto_start_agent = env::parse_bool(value),
        "session_tools" => layer.session_tools = Some(parse_value_array(value)),
        "launch_nvim" => layer.launch_nvim = env::parse_bool(value),
        "launch_lazygit" => layer.launch_lazygit = env::parse_bool(value),
        "agent_command" => layer.agent_command = Some(parse_scalar(value)),
        "default_agent_type" => layer.default_agent_type = Some(parse_scalar(value)),
        "session_prefix" => layer.session_prefix = Some(parse_scalar(value)),
        "copy_untracked_exclude" => layer.copy_untracked_exclude = Some(parse_value_array(value)),
        "update_check" => layer.update_check = env::parse_bool(value),
        _ => {
            if let Some(agent_type) = key.strip_prefix("agent_command_") {
                layer
                    .agent_command_by_type
                    .insert(agent_type.to_string(), parse_scalar(value));
            } else if let Some(name) = key.strip_prefix("window_") {
                layer
                    .window_names_global
                    .insert(name.to_string(), parse_value_array(value));
            } else if let Some(rest) = key.strip_prefix("layout_") {
                apply_legacy_layout_key(layer, rest, value);
            }
        }
    }
}

/// `layout_<repo>_win_<name>_pane_<N>`
fn apply_legacy_layout_key(layer: &mut RawLayer, rest: &str, value: &str) {
    let Some(win_idx) = rest.find("_win_") else { return };
    let repo = &rest[..win_idx];
    let after_win = &rest[win_idx + "_win_".len()..];
    let Some(pane_idx) = after_win.find("_pane_") else { return };
    let window = &after_win[..pane_idx];
    let pane_num_str = &after_win[pane_idx + "_pane_".len()..];
    let Ok(pane_num) = pane_num_str.parse::<usize>() else { return };

    layer
        .legacy_layouts
        .entry(repo.to_string())
        .or_default()
        .entry(window.to_string())
        .or_default()
        .insert(pane_num, parse_scalar(value));
}

fn apply_structured_toml(layer: &mut RawLayer, toml_text: &str, file: &Path) -> SproutResult<()> {
    #[derive(serde::Deserialize)]
    struct TopLevel {
        #[serde(default)]
        windows: Vec<WindowSpec>,
        #[serde(default)]
        repos: BTreeMap<String, windows::WindowsTable>,
    }

    let parsed: TopLevel = toml::from_str(toml_text).map_err(|e| {
        let line = e.span().map(|s| line_of_offset(toml_text, s.start)).unwrap_or(1);
        SproutError::ConfigParse {
            file: file.to_path_buf(),
            line,
            message: e.message().to_string(),
        }
    })?;

    layer.structured_windows_top_level = parsed.windows;
    for (repo, table) in parsed.repos {
        layer.structured_windows_by_repo.insert(repo, table.windows);
    }
    Ok(())
}

fn line_of_offset(text: &str, offset: usize) -> usize {
    text[..offset.min(text.len())].matches('\n').count() + 1
}

fn read_layer(path: &Path) -> SproutResult<Option<RawLayer>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| SproutError::ConfigParse {
        file: path.to_path_buf(),
        line: 0,
        message: e.to_string(),
    })?;
    Ok(Some(parse_flat_source(&content, path)?))
}

fn env_layer() -> RawLayer {
    let mut layer = RawLayer::default();
    if let Ok(v) = std::env::var("SPROUT_BASE_BRANCH") {
        layer.base_branch = Some(v);
    }
    if let Ok(v) = std::env::var("SPROUT_WORKTREE_ROOT_TEMPLATE") {
        layer.worktree_root_template = Some(v);
    }
    if let Ok(v) = std::env::var("SPROUT_AUTO_LAUNCH") {
        layer.auto_launch = env::parse_bool(&v);
    }
    if let Ok(v) = std::env::var("SPROUT_AUTO_START_AGENT") {
        layer.auto_start_agent = env::parse_bool(&v);
    }
    if let Ok(v) = std::env::var("SPROUT_SESSION_TOOLS") {
        layer.session_tools = Some(env::parse_array(&v));
    }
    if let Ok(v) = std::env::var("SPROUT_AGENT_COMMAND") {
        layer.agent_command = Some(v);
    }
    if let Ok(v) = std::env::var("SPROUT_DEFAULT_AGENT_TYPE") {
        layer.default_agent_type = Some(v);
    }
    if let Ok(v) = std::env::var("SPROUT_SESSION_PREFIX") {
        layer.session_prefix = Some(v);
    }
    if let Ok(v) = std::env::var("SPROUT_COPY_UNTRACKED_EXCLUDE") {
        layer.copy_untracked_exclude = Some(env::parse_array(&v));
    }
    if let Ok(v) = std::env::var("SPROUT_UPDATE_CHECK") {
        layer.update_check = env::parse_bool(&v);
    }
    for (key, value) in std::env::vars() {
        if let Some(agent_type) = key.strip_prefix("SPROUT_AGENT_COMMAND_") {
            if agent_type.is_empty() {
                continue;
            }
            layer
                .agent_command_by_type
                .insert(agent_type.to_lowercase(), value);
        }
    }
    layer
}

fn discover_repo_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(".git").exists() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

impl Configuration {
    /// Load a fully layered configuration for the process currently
    /// running in `cwd`.
    pub fn load(cwd: &Path) -> SproutResult<Self> {
        let mut config = Configuration::default();

        let global_path = std::env::var("SPROUT_CONFIG")
            .ok()
            .map(PathBuf::from)
            .or_else(|| xdg_config_home().map(|d| d.join("sprout").join("config.toml")));
        if let Some(path) = global_path {
            if let Some(layer) = read_layer(&path)? {
                apply_layer(&mut config, layer);
            }
        }

        if let Some(repo_root) = discover_repo_root(cwd) {
            let repo_local = repo_root.join(".sprout.toml");
            if let Some(layer) = read_layer(&repo_local)? {
                apply_layer(&mut config, layer);
            }
        }

        apply_layer(&mut config, env_layer());

        if let Ok(v) = std::env::var("SPROUT_EMIT_CD_MARKER") {
            config.emit_cd_marker = env::parse_bool(&v).unwrap_or(false);
        }
        if let Ok(v) = std::env::var("SPROUT_DEBUG_LOG") {
            config.debug_log_path = if v.is_empty() { None } else { Some(PathBuf::from(v)) };
        }

        Ok(config)
    }

    /// Resolve the agent command for a given agent type, falling back to
    /// the plain `agent_command`.
    pub fn agent_command_for(&self, agent_type: Option<&str>) -> String {
        let agent_type = agent_type.or(self.default_agent_type.as_deref());
        if let Some(t) = agent_type {
            if let Some(cmd) = self.agent_command_by_type.get(t) {
                return cmd.clone();
            }
        }
        self.agent_command.clone()
    }

    /// Expand `{repo}` in the worktree root template and resolve the
    /// result against `repo_root` when relative.
    pub fn worktree_root_for(&self, repo_root: &Path, repo_name: &str) -> PathBuf {
        let expanded = self.worktree_root_template.replace("{repo}", repo_name);
        let expanded_path = PathBuf::from(expanded);
        if expanded_path.is_absolute() {
            expanded_path
        } else {
            repo_root.join(expanded_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_set_matches_spec_example() {
        let set = ExclusionSet::compile(&[
            "build".to_string(),
            "dist/**".to_string(),
            "*.log".to_string(),
            "tmp/".to_string(),
        ]);
        for excluded in [
            "build",
            "build/output/app",
            "dist/assets/x",
            "tmp/cache",
            "logs/app.log",
        ] {
            assert!(set.is_excluded(excluded), "{excluded} should be excluded");
        }
        for kept in ["notes/logs.txt", "src/build-ing", "builds/app"] {
            assert!(!set.is_excluded(kept), "{kept} should be kept");
        }
    }

    #[test]
    fn legacy_booleans_mutate_tool_list() {
        let mut tools = vec!["agent".to_string()];
        mutate_tool_list(&mut tools, "nvim", true);
        assert_eq!(tools, vec!["agent".to_string(), "nvim".to_string()]);
        mutate_tool_list(&mut tools, "nvim", false);
        assert_eq!(tools, vec!["agent".to_string()]);
    }

    #[test]
    fn session_tools_dedupe_preserving_first_occurrence() {
        let deduped = dedupe_preserve_order(vec![
            "Nvim".to_string(),
            "lazygit".to_string(),
            "nvim".to_string(),
            "  ".to_string(),
        ]);
        assert_eq!(deduped, vec!["Nvim".to_string(), "lazygit".to_string()]);
    }

    #[test]
    fn flat_file_parses_scalars_arrays_and_magic_keys() {
        let content = r#"
            # a comment
            base_branch = "main"
            session_tools = [nvim, lazygit]
            agent_command_reviewer = "claude --mode review"
            window_build = "cargo, watch"
        "#;
        let layer = parse_flat_source(content, Path::new("test.toml")).unwrap();
        assert_eq!(layer.base_branch.as_deref(), Some("main"));
        assert_eq!(
            layer.session_tools,
            Some(vec!["nvim".to_string(), "lazygit".to_string()])
        );
        assert_eq!(
            layer.agent_command_by_type.get("reviewer").map(String::as_str),
            Some("claude --mode review")
        );
        assert_eq!(
            layer.window_names_global.get("build"),
            Some(&vec!["cargo".to_string(), "watch".to_string()])
        );
    }

    #[test]
    fn legacy_layout_key_decomposes_repo_window_pane() {
        let mut layer = RawLayer::default();
        apply_legacy_layout_key(&mut layer, "myrepo_win_main_pane_0", "nvim .");
        apply_legacy_layout_key(&mut layer, "myrepo_win_main_pane_1", "lazygit");
        let win = &layer.legacy_layouts["myrepo"]["main"];
        assert_eq!(win[&0], "nvim .");
        assert_eq!(win[&1], "lazygit");
    }

    #[test]
    fn worktree_root_expands_repo_placeholder_relative_to_repo_root() {
        let config = Configuration::default();
        let root = config.worktree_root_for(Path::new("/home/dev/myrepo"), "myrepo");
        assert_eq!(root, PathBuf::from("/home/dev/myrepo/../myrepo.worktrees"));
    }
}
