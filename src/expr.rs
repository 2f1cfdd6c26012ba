//! Expression evaluation — an external collaborator contract.
//!
//! The engine treats `key_expr`/`condition_expr`/`ttl_expr` as opaque
//! strings and delegates their evaluation to an injected `Evaluator`. This
//! module defines that trait plus `TemplateEvaluator`, a deliberately
//! minimal reference implementation (parameter substitution, string
//! concatenation, comparisons, and a ternary) sufficient to drive the
//! scenarios this crate tests against. Production embedders are expected to
//! supply a fuller expression dialect (e.g. SpEL-like or CEL-like) behind
//! the same trait.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Named call arguments exposed to expressions, keyed by parameter name.
#[derive(Debug, Clone, Default)]
pub struct CallArgs(HashMap<String, Value>);

impl CallArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a copy of this argument set with `name` rebound to `value`,
    /// used by the batch engine's per-element pivot rebinding (§4.7 step 2).
    #[must_use]
    pub fn with_rebound(&self, name: &str, value: Value) -> Self {
        let mut next = self.clone();
        next.0.insert(name.to_string(), value);
        next
    }
}

/// Injected expression evaluator. Opaque to the engine beyond these three
/// entry points, one per expression role.
pub trait Evaluator: Send + Sync {
    /// Evaluate a key or key-suffix expression to its string rendering.
    fn eval_string(&self, expr: &str, args: &CallArgs) -> Result<String>;
    /// Evaluate a boolean condition expression.
    fn eval_bool(&self, expr: &str, args: &CallArgs) -> Result<bool>;
    /// Evaluate a dynamic TTL expression to seconds; `None` means "not
    /// applicable, fall through to the next TTL resolver" (including the
    /// `≤ 0` boundary case).
    fn eval_ttl_seconds(&self, expr: &str, args: &CallArgs) -> Result<Option<i64>>;
}

/// Minimal reference `Evaluator`: `#name` parameter substitution, `+`
/// string concatenation, simple numeric/null comparisons, and a single
/// `cond ? a : b` ternary. Not a general expression language.
#[derive(Debug, Default, Clone)]
pub struct TemplateEvaluator;

impl TemplateEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn resolve_token(token: &str, args: &CallArgs) -> Result<Value> {
        let token = token.trim();
        if let Some(name) = token.strip_prefix('#') {
            args.get(name)
                .cloned()
                .with_context(|| format!("undefined parameter '#{name}'"))
        } else if let Some(lit) = token
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .or_else(|| token.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        {
            Ok(Value::String(lit.to_string()))
        } else if token == "null" {
            Ok(Value::Null)
        } else if let Ok(n) = token.parse::<i64>() {
            Ok(Value::from(n))
        } else {
            Err(anyhow!("cannot resolve token '{token}'"))
        }
    }

    fn value_to_key_fragment(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => "null".to_string(),
            other => other.to_string(),
        }
    }

    /// Splits on top-level `+` (string concatenation is the only binary
    /// operator this reference evaluator supports outside comparisons).
    fn split_concat(expr: &str) -> Vec<&str> {
        expr.split('+').map(str::trim).collect()
    }
}

impl Evaluator for TemplateEvaluator {
    fn eval_string(&self, expr: &str, args: &CallArgs) -> Result<String> {
        let mut rendered = String::new();
        for part in Self::split_concat(expr) {
            let value = Self::resolve_token(part, args)?;
            rendered.push_str(&Self::value_to_key_fragment(&value));
        }
        Ok(rendered)
    }

    fn eval_bool(&self, expr: &str, args: &CallArgs) -> Result<bool> {
        let expr = expr.trim();
        for op in ["!=", "==", ">=", "<=", ">", "<"] {
            if let Some((lhs, rhs)) = expr.split_once(op) {
                let lhs = Self::resolve_token(lhs, args)?;
                let rhs_trimmed = rhs.trim();
                if rhs_trimmed == "null" {
                    let is_null = lhs.is_null();
                    return Ok(if op == "!=" { !is_null } else { is_null });
                }
                let rhs = Self::resolve_token(rhs, args)?;
                return compare(&lhs, op, &rhs);
            }
        }
        // No operator: treat as a plain truthy parameter reference.
        let value = Self::resolve_token(expr, args)?;
        Ok(match value {
            Value::Bool(b) => b,
            Value::Null => false,
            _ => true,
        })
    }

    fn eval_ttl_seconds(&self, expr: &str, args: &CallArgs) -> Result<Option<i64>> {
        // Reference ternary support: "cond ? then : else".
        if let Some((cond, rest)) = expr.split_once('?') {
            let (then_branch, else_branch) = rest
                .split_once(':')
                .context("ternary TTL expression missing ':' branch")?;
            let branch = if self.eval_bool(cond, args)? {
                then_branch
            } else {
                else_branch
            };
            return self.eval_ttl_seconds(branch.trim(), args);
        }

        let value = Self::resolve_token(expr, args)?;
        let seconds = match value {
            Value::Null => return Ok(None),
            Value::Number(n) => n.as_i64().context("TTL expression did not yield an integer")?,
            other => return Err(anyhow!("TTL expression yielded non-numeric value {other}")),
        };
        Ok(if seconds > 0 { Some(seconds) } else { None })
    }
}

fn compare(lhs: &Value, op: &str, rhs: &Value) -> Result<bool> {
    let (l, r) = match (lhs.as_i64(), rhs.as_i64()) {
        (Some(l), Some(r)) => (l, r),
        _ => return Err(anyhow!("comparison requires two numeric operands")),
    };
    Ok(match op {
        "==" => l == r,
        "!=" => l != r,
        ">" => l > r,
        "<" => l < r,
        ">=" => l >= r,
        "<=" => l <= r,
        _ => unreachable!("operator set is exhaustively listed above"),
    })
}
