//! Expression grammar (§4.3): `$vars.a.b`, `$input.x`, `$len(expr)`,
//! `$map(expr, 'prop')`, plus the boolean comparison evaluator.

use harmony_core::CiMap;
use serde_json::Value;

use crate::context::EvalContext;
use crate::error::EvalError;

/// Syntactic guard for `extract-input` expressions and `if.condition`:
/// must begin with `$vars.`, `$input.`, `$len(` or `$map(`.
pub fn validate_expression_syntax(expr: &str) -> Result<(), EvalError> {
    let e = expr.trim();
    if e.starts_with("$vars.") || e.starts_with("$input.") || e.starts_with("$len(") || e.starts_with("$map(") {
        Ok(())
    } else {
        Err(EvalError::InvalidSyntax)
    }
}

/// Evaluate a `$`-prefixed expression against the context. Returns
/// `Value::Null` for unresolved paths/unknown forms — callers that must
/// reject malformed syntax should call [`validate_expression_syntax`] first.
pub fn eval_expr(ctx: &EvalContext, expr: &str) -> Value {
    let e = expr.trim();

    if let Some(path) = e.strip_prefix("$vars.") {
        return resolve_ci_path(&ctx.vars, path);
    }
    if let Some(path) = e.strip_prefix("$input.") {
        return resolve_ci_path(&ctx.input, path);
    }
    if let Some(inner) = strip_call(e, "$len(") {
        let target = eval_token(ctx, inner);
        return Value::Number(len_of(&target).into());
    }
    if let Some(inner) = strip_call(e, "$map(") {
        let (arr_expr, prop_literal) = split_top_level_comma(inner);
        let prop = strip_quotes(&prop_literal);
        let arr_value = eval_token(ctx, &arr_expr);
        let mapped = match arr_value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| item.as_object().and_then(|o| o.get(&prop).cloned()).unwrap_or(Value::Null))
                .collect(),
            _ => Vec::new(),
        };
        return Value::Array(mapped);
    }

    Value::Null
}

/// Evaluate a single token that may be a `$`-expression or a literal
/// (quoted string, number, boolean, `null`, or bare identifier). Used for
/// both comparison operands and the inner arguments of `$len`/`$map`.
pub fn eval_token(ctx: &EvalContext, token: &str) -> Value {
    let t = token.trim();
    if t.starts_with('$') {
        return eval_expr(ctx, t);
    }
    if is_quoted(t) {
        return Value::String(strip_quotes(t));
    }
    match t {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Ok(n) = t.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return Value::Number(num);
        }
    }
    Value::String(t.to_string())
}

/// `LEFT OP RIGHT` with `OP ∈ {==, !=, <, <=, >, >=}`; falls back to
/// truthiness of a non-comparison expression.
pub fn eval_condition(ctx: &EvalContext, condition: &str) -> bool {
    let c = condition.trim();
    match find_operator(c) {
        Some((idx, op)) => {
            let left = eval_token(ctx, &c[..idx]);
            let right = eval_token(ctx, &c[idx + op.len()..]);
            compare(op, &left, &right)
        }
        None => truthy(&eval_token(ctx, c)),
    }
}

/// Truthiness rule (§4.3): non-null, non-empty string, non-false boolean,
/// non-null/undefined JSON.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(_) | Value::Array(_) | Value::Object(_) => true,
    }
}

fn compare(op: &str, left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_f64(left), as_f64(right)) {
        return match op {
            "==" => a == b,
            "!=" => a != b,
            "<" => a < b,
            "<=" => a <= b,
            ">" => a > b,
            ">=" => a >= b,
            _ => false,
        };
    }
    let a = ordinal_string(left);
    let b = ordinal_string(right);
    match op {
        "==" => a == b,
        "!=" => a != b,
        "<" => a < b,
        "<=" => a <= b,
        ">" => a > b,
        ">=" => a >= b,
        _ => false,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn ordinal_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn len_of(v: &Value) -> i64 {
    match v {
        Value::Array(a) => a.len() as i64,
        Value::String(s) => s.chars().count() as i64,
        Value::Object(o) => o.len() as i64,
        _ => 0,
    }
}

/// Resolve a dot-path against a case-insensitive top-level bag; nested
/// segments navigate plain JSON object/array indexing case-sensitively.
pub fn resolve_ci_path(map: &CiMap<Value>, path: &str) -> Value {
    let mut parts = path.split('.');
    let Some(first) = parts.next().filter(|p| !p.is_empty()) else {
        return Value::Null;
    };
    let Some(mut current) = map.get(first).cloned() else {
        return Value::Null;
    };
    for seg in parts {
        current = match &current {
            Value::Object(obj) => obj.get(seg).cloned().unwrap_or(Value::Null),
            Value::Array(arr) => seg
                .parse::<usize>()
                .ok()
                .and_then(|i| arr.get(i).cloned())
                .unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    current
}

fn strip_call<'a>(e: &'a str, prefix: &str) -> Option<&'a str> {
    if e.starts_with(prefix) && e.ends_with(')') {
        Some(&e[prefix.len()..e.len() - 1])
    } else {
        None
    }
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')))
}

fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if is_quoted(s) {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Split `$map`'s argument list on the first top-level comma (outside
/// quotes and nested parens), returning `(arr_expr, prop_literal)`.
fn split_top_level_comma(s: &str) -> (String, String) {
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (in_quote, c) {
            (None, '\'') | (None, '"') => in_quote = Some(c),
            (Some(q), c2) if c2 == q => in_quote = None,
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                return (s[..i].trim().to_string(), s[i + 1..].trim().to_string());
            }
            _ => {}
        }
    }
    (s.trim().to_string(), String::new())
}

/// Leftmost comparison operator, preferring two-character tokens.
fn find_operator(s: &str) -> Option<(usize, &'static str)> {
    for (i, _) in s.char_indices() {
        let rest = &s[i..];
        for op in ["==", "!=", "<=", ">="] {
            if rest.starts_with(op) {
                return Some((i, op));
            }
        }
        for op in ["<", ">"] {
            if rest.starts_with(op) {
                return Some((i, op));
            }
        }
    }
    None
}
