use flowcore::{is_truthy, lookup_path, Evaluator, Executor, NodeError};
use serde_json::Value;

/// Minimal expression evaluator used when the host supplies none.
///
/// Supports JSON literals, single-quoted strings, dotted paths rooted at
/// `context`, `results` or `node`, a leading `!` and one `==` / `!=`
/// comparison. Missing paths evaluate to `null`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathEvaluator;

impl Evaluator for PathEvaluator {
    fn evaluate(&self, expression: &str, context: &Value, executor: &Executor) -> Result<Value, NodeError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(NodeError::Expression("empty expression".to_string()));
        }

        if let Some((lhs, op, rhs)) = split_comparison(expression) {
            let lhs = self.evaluate(lhs, context, executor)?;
            let rhs = self.evaluate(rhs, context, executor)?;
            let equal = values_equal(&lhs, &rhs);
            return Ok(Value::Bool(if op == "==" { equal } else { !equal }));
        }

        if let Some(rest) = expression.strip_prefix('!') {
            let value = self.evaluate(rest, context, executor)?;
            return Ok(Value::Bool(!is_truthy(&value)));
        }

        if let Some(inner) = expression
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
        {
            return Ok(Value::String(inner.to_string()));
        }

        if let Ok(literal) = serde_json::from_str::<Value>(expression) {
            return Ok(literal);
        }

        resolve_identifier(expression, context, executor)
    }
}

fn resolve_identifier(expression: &str, context: &Value, executor: &Executor) -> Result<Value, NodeError> {
    let (root, rest) = match expression.split_once('.') {
        Some((root, rest)) => (root, Some(rest)),
        None => (expression, None),
    };

    match root {
        "context" => Ok(lookup_path(context, rest.unwrap_or("")).cloned().unwrap_or(Value::Null)),
        "node" => Ok(Value::String(executor.node_name().to_string())),
        "results" => {
            let Some(rest) = rest else {
                let all = executor
                    .results()
                    .iter()
                    .map(|(name, info)| (name.clone(), info.to_value()))
                    .collect();
                return Ok(Value::Object(all));
            };
            let (name, path) = rest.split_once('.').unwrap_or((rest, ""));
            Ok(executor
                .result(name)
                .and_then(|info| info.path(path).cloned())
                .unwrap_or(Value::Null))
        }
        other => Err(NodeError::Expression(format!("unknown identifier '{}'", other))),
    }
}

/// Split on the first `==` / `!=` outside quotes
fn split_comparison(expression: &str) -> Option<(&str, &'static str, &str)> {
    let bytes = expression.as_bytes();
    let mut quote: Option<u8> = None;
    let mut idx = 0;
    while idx + 1 < bytes.len() {
        let b = bytes[idx];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if bytes[idx + 1] == b'=' && (b == b'=' || b == b'!') => {
                let op = if b == b'=' { "==" } else { "!=" };
                return Some((&expression[..idx], op, &expression[idx + 2..]));
            }
            None => {}
        }
        idx += 1;
    }
    None
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcore::FlowInfo;
    use serde_json::json;
    use std::collections::HashMap;

    fn eval(expression: &str) -> Value {
        let mut results = HashMap::new();
        results.insert("fetch".to_string(), FlowInfo::new(json!({ "status": 200, "tags": ["a", "b"] })));
        let executor = Executor::detached("current").with_results(results);
        let context = json!({ "user": { "name": "ada", "admin": true } });
        PathEvaluator.evaluate(expression, &context, &executor).unwrap()
    }

    #[test]
    fn literals() {
        assert_eq!(eval("true"), json!(true));
        assert_eq!(eval("42"), json!(42));
        assert_eq!(eval("'hi'"), json!("hi"));
        assert_eq!(eval("\"hi\""), json!("hi"));
    }

    #[test]
    fn paths() {
        assert_eq!(eval("context.user.name"), json!("ada"));
        assert_eq!(eval("results.fetch.status"), json!(200));
        assert_eq!(eval("results.fetch.tags.1"), json!("b"));
        assert_eq!(eval("results.missing.status"), Value::Null);
        assert_eq!(eval("node"), json!("current"));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("results.fetch.status == 200"), json!(true));
        assert_eq!(eval("context.user.name != 'ada'"), json!(false));
        assert_eq!(eval("!context.user.admin"), json!(false));
        assert_eq!(eval("'a==b' == 'a==b'"), json!(true));
    }

    #[test]
    fn unknown_root_is_an_error() {
        let executor = Executor::detached("n");
        let err = PathEvaluator.evaluate("window.x", &json!({}), &executor).unwrap_err();
        assert!(matches!(err, NodeError::Expression(_)));
    }
}
