//! `{{vars.x}}` / `{{input.x}}` template rendering (§4.3). Placeholders that
//! don't resolve pass through verbatim so a malformed template is visible in
//! the rendered output rather than silently dropped.

use serde_json::Value;

use crate::context::EvalContext;
use crate::expr::resolve_ci_path;

pub fn render_template(ctx: &EvalContext, template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let placeholder = after_open[..end].trim();
        match render_placeholder(ctx, placeholder) {
            Some(rendered) => out.push_str(&rendered),
            None => {
                out.push_str("{{");
                out.push_str(placeholder);
                out.push_str("}}");
            }
        }
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    out
}

fn render_placeholder(ctx: &EvalContext, placeholder: &str) -> Option<String> {
    let value = if let Some(path) = placeholder.strip_prefix("vars.") {
        resolve_ci_path(&ctx.vars, path)
    } else if let Some(path) = placeholder.strip_prefix("input.") {
        resolve_ci_path(&ctx.input, path)
    } else {
        return None;
    };
    Some(value_to_template_string(&value))
}

fn value_to_template_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harmony_core::CiMap;

    fn ctx() -> EvalContext {
        let mut vars: CiMap<Value> = CiMap::new();
        vars.insert("name", serde_json::json!("Ada"));
        vars.insert("count", serde_json::json!(3));
        let mut input: CiMap<Value> = CiMap::new();
        input.insert("topic", serde_json::json!("rust"));
        EvalContext::new(vars, input)
    }

    #[test]
    fn renders_known_placeholders() {
        let c = ctx();
        assert_eq!(
            render_template(&c, "hello {{vars.name}}, re: {{input.topic}}"),
            "hello Ada, re: rust"
        );
    }

    #[test]
    fn renders_numbers_and_null_as_text() {
        let c = ctx();
        assert_eq!(render_template(&c, "n={{vars.count}}"), "n=3");
        assert_eq!(render_template(&c, "x={{vars.missing}}"), "x=");
    }

    #[test]
    fn unmatched_placeholder_passes_through_verbatim() {
        let c = ctx();
        assert_eq!(render_template(&c, "{{bogus.thing}}"), "{{bogus.thing}}");
        assert_eq!(render_template(&c, "no braces here"), "no braces here");
    }

    #[test]
    fn unterminated_placeholder_passes_through_verbatim() {
        let c = ctx();
        assert_eq!(render_template(&c, "a {{vars.name"), "a {{vars.name");
    }
}
