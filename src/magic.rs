//! The magic registry (spec §4.2): `(inputKind, functionName) -> spell`.
//!
//! Grounded on `examples/original_source/spells.go`. The teacher's Design
//! Notes (spec §9) call out that spells can be either closures capturing
//! the channel, or records dispatched by a central evaluator "where
//! capturing closures is awkward" — awkward is exactly Rust's situation
//! here (a closure over `&Channel` can't outlive the borrow), so `Spell`
//! is a plain record and `evaluate` is the central dispatcher, following
//! the pattern `graphix-stdlib::register` uses for its own builtin table
//! (a static map from `(name)` to behavior, built once at startup).

use std::sync::LazyLock;

use fxhash::FxHashMap;

use crate::error::HubError;
use crate::value::{Value, ValueKind};

/// A built-in derived-value function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spell {
    Sum,
    Min,
    Max,
    Avg,
    Same,
    All,
    Any,
    Count,
    Percent,
}

/// The optional `value` comparison parameter magic configs may supply
/// for `all`/`any`/`count` (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct SpellParams {
    pub value: Option<Value>,
}

struct Entry {
    spell: Spell,
    output: ValueKind,
}

type RegistryKey = (ValueKind, &'static str);

static REGISTRY: LazyLock<FxHashMap<RegistryKey, Entry>> = LazyLock::new(|| {
    let mut m = FxHashMap::default();
    m.insert((ValueKind::Int, "sum"), Entry { spell: Spell::Sum, output: ValueKind::Int });
    m.insert((ValueKind::Int, "max"), Entry { spell: Spell::Max, output: ValueKind::Int });
    m.insert((ValueKind::Int, "min"), Entry { spell: Spell::Min, output: ValueKind::Int });
    m.insert((ValueKind::Int, "avg"), Entry { spell: Spell::Avg, output: ValueKind::Int });
    m.insert((ValueKind::Any, "same"), Entry { spell: Spell::Same, output: ValueKind::Bool });
    m.insert((ValueKind::Any, "any"), Entry { spell: Spell::Any, output: ValueKind::Bool });
    m.insert((ValueKind::Any, "all"), Entry { spell: Spell::All, output: ValueKind::Bool });
    m.insert((ValueKind::Any, "count"), Entry { spell: Spell::Count, output: ValueKind::Int });
    m.insert((ValueKind::Any, "percent"), Entry { spell: Spell::Percent, output: ValueKind::Float });
    m
});

/// Two-step lookup: exact `(inputKind, func)`, then `(inputKind.any(), func)`
/// as a fallback so generic spells (registered on `Any`) match any source
/// kind. Returns the spell and its declared output kind.
pub fn resolve(input: ValueKind, func: &str) -> Option<(Spell, ValueKind)> {
    REGISTRY
        .get(&(input, func))
        .or_else(|| REGISTRY.get(&(input.any(), func)))
        .map(|e| (e.spell, e.output))
}

pub fn has_magic(input: ValueKind, func: &str) -> bool {
    resolve(input, func).is_some()
}

/// Evaluate a spell over the current per-client values of its source
/// variable. `listeners` is the channel's current listener count and
/// `source_zero` is `sourceKind.zero()`, both needed by spells that
/// compare against or divide by them.
pub fn evaluate(
    spell: Spell,
    values: &[Value],
    listeners: usize,
    source_zero: &Value,
    params: &SpellParams,
) -> Result<Value, HubError> {
    match spell {
        Spell::Sum => Ok(Value::from(sum_ints(values)?)),
        Spell::Max => extremum(values, |a, b| a > b).map(Value::from),
        Spell::Min => extremum(values, |a, b| a < b).map(Value::from),
        Spell::Avg => {
            if listeners == 0 {
                return Err(HubError::MagicEvaluation {
                    detail: "avg: no listeners".into(),
                });
            }
            Ok(Value::from(sum_ints(values)? / listeners as i64))
        }
        Spell::Same => Ok(Value::from(all_same(values))),
        Spell::All => Ok(Value::from(all_match(values, source_zero, params))),
        Spell::Any => Ok(Value::from(any_match(values, source_zero, params))),
        Spell::Count => Ok(Value::from(count_match(values, source_zero, params))),
        Spell::Percent => {
            if listeners == 0 {
                return Ok(Value::from(0.0));
            }
            let ct = count_match(values, source_zero, params);
            Ok(Value::from(ct as f64 / listeners as f64))
        }
    }
}

fn sum_ints(values: &[Value]) -> Result<i64, HubError> {
    values
        .iter()
        .map(|v| v.as_i64().ok_or_else(|| HubError::MagicEvaluation { detail: "expected int".into() }))
        .sum()
}

fn extremum(values: &[Value], keep_if: fn(i64, i64) -> bool) -> Result<i64, HubError> {
    let mut best: Option<i64> = None;
    for v in values {
        let n = v.as_i64().ok_or_else(|| HubError::MagicEvaluation { detail: "expected int".into() })?;
        best = Some(match best {
            None => n,
            Some(b) if keep_if(n, b) => n,
            Some(b) => b,
        });
    }
    best.ok_or_else(|| HubError::MagicEvaluation { detail: "no listeners".into() })
}

fn all_same(values: &[Value]) -> bool {
    match values.split_first() {
        None => true,
        Some((first, rest)) => rest.iter().all(|v| v == first),
    }
}

fn all_match(values: &[Value], zero: &Value, params: &SpellParams) -> bool {
    match &params.value {
        Some(cmp) => values.iter().all(|v| v == cmp),
        None => values.iter().all(|v| v != zero),
    }
}

fn any_match(values: &[Value], zero: &Value, params: &SpellParams) -> bool {
    match &params.value {
        Some(cmp) => values.iter().any(|v| v == cmp),
        None => values.iter().any(|v| v != zero),
    }
}

fn count_match(values: &[Value], zero: &Value, params: &SpellParams) -> usize {
    match &params.value {
        Some(cmp) => values.iter().filter(|v| *v == cmp).count(),
        None => values.iter().filter(|v| *v != zero).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_exact_then_any_fallback() {
        assert_eq!(resolve(ValueKind::Int, "sum"), Some((Spell::Sum, ValueKind::Int)));
        assert_eq!(resolve(ValueKind::Bool, "same"), Some((Spell::Same, ValueKind::Bool)));
        assert_eq!(resolve(ValueKind::String, "percent"), Some((Spell::Percent, ValueKind::Float)));
        assert_eq!(resolve(ValueKind::Object, "nonexistent"), None);
    }

    #[test]
    fn sum_of_empty_is_zero() {
        let params = SpellParams::default();
        let r = evaluate(Spell::Sum, &[], 0, &json!(0), &params).unwrap();
        assert_eq!(r, json!(0));
    }

    #[test]
    fn max_of_empty_fails() {
        let params = SpellParams::default();
        assert!(evaluate(Spell::Max, &[], 0, &json!(0), &params).is_err());
    }

    #[test]
    fn avg_of_empty_fails() {
        let params = SpellParams::default();
        assert!(evaluate(Spell::Avg, &[], 0, &json!(0), &params).is_err());
    }

    #[test]
    fn percent_of_empty_is_zero() {
        let params = SpellParams::default();
        let r = evaluate(Spell::Percent, &[], 0, &json!(false), &params).unwrap();
        assert_eq!(r, json!(0.0));
    }

    #[test]
    fn same_true_on_empty() {
        let params = SpellParams::default();
        let r = evaluate(Spell::Same, &[], 0, &json!(null), &params).unwrap();
        assert_eq!(r, json!(true));
    }

    #[test]
    fn all_without_value_checks_nonzero() {
        let params = SpellParams::default();
        let r = evaluate(Spell::All, &[json!(true), json!(true)], 2, &json!(false), &params).unwrap();
        assert_eq!(r, json!(true));
        let r = evaluate(Spell::All, &[json!(true), json!(false)], 2, &json!(false), &params).unwrap();
        assert_eq!(r, json!(false));
    }

    #[test]
    fn count_with_value_param() {
        let params = SpellParams { value: Some(json!(true)) };
        let r = evaluate(
            Spell::Count,
            &[json!(true), json!(false), json!(true)],
            3,
            &json!(false),
            &params,
        )
        .unwrap();
        assert_eq!(r, json!(2));
    }
}
