//! `sprout version` — print version information (spec.md §6).

use console::style;

pub fn execute() {
    println!("{} {}", style("sprout").cyan().bold(), style(env!("CARGO_PKG_VERSION")).dim());
}
