// ABOUTME: Minimal prompt templating: `{name}` placeholders and `{{`/`}}` brace escapes.
// ABOUTME: Argument values spliced into instructions are escaped so they render literally.

use serde_json::{Map, Value};

/// Escape literal braces so the text survives [`render_template`] unchanged.
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// Render a template. `{{` and `}}` produce literal braces; `{name}` is
/// replaced by the matching value (strings unquoted, anything else as JSON).
/// Unknown placeholders are left as written.
pub fn render_template(template: &str, vars: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let rest = &template[i + 1..];
                match rest.find('}') {
                    Some(end) if is_identifier(&rest[..end]) => {
                        let name = &rest[..end];
                        match vars.get(name) {
                            Some(Value::String(s)) => out.push_str(s),
                            Some(other) => out.push_str(&other.to_string()),
                            None => {
                                out.push('{');
                                out.push_str(name);
                                out.push('}');
                            }
                        }
                        // Skip the identifier and the closing brace.
                        for _ in 0..=rest[..end].chars().count() {
                            chars.next();
                        }
                    }
                    _ => out.push('{'),
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn placeholders_are_filled() {
        let out = render_template("Hello {who}, you are {age}.", &vars(json!({"who": "Ada", "age": 36})));
        assert_eq!(out, "Hello Ada, you are 36.");
    }

    #[test]
    fn unknown_placeholders_stay() {
        assert_eq!(render_template("{missing}", &Map::new()), "{missing}");
    }

    #[test]
    fn escaped_text_renders_literally() {
        let literal = "json like {\"a\": {b}}";
        let out = render_template(&escape_braces(literal), &vars(json!({"b": "X"})));
        assert_eq!(out, literal);
    }

    #[test]
    fn stray_braces_pass_through() {
        assert_eq!(render_template("a { b", &Map::new()), "a { b");
        assert_eq!(render_template("a } b", &Map::new()), "a } b");
    }
}
