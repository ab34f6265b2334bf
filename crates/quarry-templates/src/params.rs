//! Legacy `{name}` parameter substitution
//!
//! The older, pre-Jinja parameter style used by some saved queries. The
//! scanner is a plain regex over the whole text: it does not tokenize, so a
//! brace group inside a quoted string literal is substituted too. That
//! behavior is long-standing and queries in the wild rely on it, so it is
//! kept as-is.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex must compile"));

/// Substitute `{name}` holes with their bindings. Unbound holes are kept
/// verbatim.
pub fn apply_parameters(sql: &str, params: &HashMap<String, String>) -> String {
    PARAM_RE
        .replace_all(sql, |caps: &regex::Captures<'_>| {
            match params.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// The `{name}` holes a query references, in order of first appearance.
pub fn parameter_names(sql: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PARAM_RE.captures_iter(sql) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
