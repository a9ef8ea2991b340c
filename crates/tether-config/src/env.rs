use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Matches `{{ env.VAR }}` and `{{ env.VAR | default("fallback") }}`
fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#)
            .expect("placeholder regex is valid")
    })
}

/// Expand environment placeholders in raw TOML text
///
/// Runs before deserialization so config structs hold plain values. Lines
/// whose first non-blank character is `#` are copied untouched, which keeps
/// commented-out secrets from failing the load.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut lines = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
        } else {
            lines.push(expand_line(line)?);
        }
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(line: &str) -> Result<String, String> {
    let mut expanded = String::with_capacity(line.len());
    let mut cursor = 0;

    for captures in placeholder().captures_iter(line) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        expanded.push_str(&line[cursor..whole.start()]);
        expanded.push_str(&resolve(&captures)?);
        cursor = whole.end();
    }

    expanded.push_str(&line[cursor..]);
    Ok(expanded)
}

fn resolve(captures: &Captures<'_>) -> Result<String, String> {
    let key = captures.get(1).map_or("", |m| m.as_str());
    let fallback = captures.get(2).map(|m| m.as_str());

    let Some(var_name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(var_name), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_owned()),
        (Err(_), None) => Err(format!("environment variable not found: `{var_name}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_placeholders() {
        let input = "model = \"odsc-llm\"";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn single_env_var() {
        temp_env::with_var("TETHER_TEST_KEY", Some("hello"), || {
            let result = expand_env("api_key = \"{{ env.TETHER_TEST_KEY }}\"").unwrap();
            assert_eq!(result, "api_key = \"hello\"");
        });
    }

    #[test]
    fn several_vars_on_several_lines() {
        let vars = [("TETHER_A", Some("a")), ("TETHER_B", Some("b"))];
        temp_env::with_vars(vars, || {
            let result = expand_env("x = \"{{ env.TETHER_A }}-{{env.TETHER_B}}\"\ny = \"{{ env.TETHER_B }}\"\n").unwrap();
            assert_eq!(result, "x = \"a-b\"\ny = \"b\"\n");
        });
    }

    #[test]
    fn missing_env_var() {
        temp_env::with_var_unset("TETHER_MISSING", || {
            let err = expand_env("key = \"{{ env.TETHER_MISSING }}\"").unwrap_err();
            assert!(err.contains("TETHER_MISSING"));
        });
    }

    #[test]
    fn unsupported_scope() {
        let err = expand_env("key = \"{{ vault.TOKEN }}\"").unwrap_err();
        assert!(err.contains("only variables scoped with 'env.'"));
    }

    #[test]
    fn commented_lines_skip_expansion() {
        temp_env::with_var_unset("TETHER_MISSING", || {
            let input = "  # api_key = \"{{ env.TETHER_MISSING }}\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }

    #[test]
    fn default_used_when_var_missing() {
        temp_env::with_var_unset("TETHER_OPTIONAL", || {
            let result = expand_env("key = \"{{ env.TETHER_OPTIONAL | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "key = \"fallback\"");
        });
    }

    #[test]
    fn default_ignored_when_var_present() {
        temp_env::with_var("TETHER_OPTIONAL", Some("actual"), || {
            let result = expand_env("key = \"{{ env.TETHER_OPTIONAL | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "key = \"actual\"");
        });
    }
}
