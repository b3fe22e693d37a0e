//! `sprout shell-hook` — print the shell integration script (spec.md §6).

use anyhow::{bail, Result};

const BASH_ZSH_HOOK: &str = r#"spr() {
  local __sprout_cd=""
  local __sprout_line
  local __sprout_status="0"
  while IFS= read -r __sprout_line; do
    case "$__sprout_line" in
      __SPROUT_CD__=*)
        __sprout_cd="${__sprout_line#__SPROUT_CD__=}"
        ;;
      __sprout_exit__*)
        __sprout_status="${__sprout_line#__sprout_exit__}"
        ;;
      *)
        printf '%s\n' "$__sprout_line"
        ;;
    esac
  done < <(SPROUT_EMIT_CD_MARKER=1 command sprout "$@"; echo "__sprout_exit__$?")
  if [ -n "$__sprout_cd" ]; then
    cd "$__sprout_cd" || return 1
  fi
  return "$__sprout_status"
}
"#;

const FISH_HOOK: &str = r#"function spr
    set -l sprout_cd ""
    for line in (SPROUT_EMIT_CD_MARKER=1 command sprout $argv | string split0)
        if string match -q '__SPROUT_CD__=*' -- $line
            set sprout_cd (string replace '__SPROUT_CD__=' '' -- $line)
        else
            echo $line
        end
    end
    set -l sprout_status $status
    if test -n "$sprout_cd"
        cd $sprout_cd
    end
    return $sprout_status
end
"#;

pub fn execute(shell: &str) -> Result<()> {
    match shell {
        "zsh" | "bash" => print!("{BASH_ZSH_HOOK}"),
        "fish" => print!("{FISH_HOOK}"),
        other => bail!("unsupported shell {other:?} (expected zsh, bash, or fish)"),
    }
    Ok(())
}
