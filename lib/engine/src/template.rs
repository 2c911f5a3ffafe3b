//! Variable substitution for message bodies and request templates.
//!
//! Templates use `{{path}}` placeholders resolved by dotted path against
//! a [`VariableMap`]. Missing variables render as the empty string so a
//! half-filled contact record never breaks a send.

use crate::context::VariableMap;
use serde_json::Value as JsonValue;

/// Renders a template against the variable map.
///
/// String values are substituted unquoted; other values use their JSON
/// text form. An unclosed `{{` is kept as literal text.
#[must_use]
pub fn render(template: &str, variables: &VariableMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let path = after_open[..close].trim();
                if let Some(value) = variables.get_path(path) {
                    out.push_str(&render_value(value));
                }
                rest = &after_open[close + 2..];
            }
            None => {
                // Unbalanced braces, keep the literal remainder.
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}

fn render_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: serde_json::Value) -> VariableMap {
        let mut map = VariableMap::new();
        map.merge(&value);
        map
    }

    #[test]
    fn substitutes_string_variables() {
        let vars = vars(json!({"name": "Ana"}));
        assert_eq!(render("Hi {{name}}!", &vars), "Hi Ana!");
    }

    #[test]
    fn substitutes_dotted_paths() {
        let vars = vars(json!({"contact": {"name": "Ana"}, "order": {"total": 42.5}}));
        assert_eq!(
            render("{{contact.name}}, your total is {{order.total}}", &vars),
            "Ana, your total is 42.5"
        );
    }

    #[test]
    fn missing_variable_renders_empty() {
        let vars = VariableMap::new();
        assert_eq!(render("Hi {{name}}!", &vars), "Hi !");
    }

    #[test]
    fn numbers_render_without_quotes() {
        let vars = vars(json!({"age": 20}));
        assert_eq!(render("age={{age}}", &vars), "age=20");
    }

    #[test]
    fn whitespace_inside_braces_is_tolerated() {
        let vars = vars(json!({"name": "Ana"}));
        assert_eq!(render("Hi {{ name }}!", &vars), "Hi Ana!");
    }

    #[test]
    fn unbalanced_braces_kept_literal() {
        let vars = vars(json!({"name": "Ana"}));
        assert_eq!(render("Hi {{name", &vars), "Hi {{name");
    }

    #[test]
    fn template_without_placeholders_passes_through() {
        let vars = VariableMap::new();
        assert_eq!(render("plain text", &vars), "plain text");
    }
}
