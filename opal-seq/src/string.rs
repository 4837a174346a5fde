//! Concat, append and folds over string values.
//!
//! Folds visit one `char` at a time, pairing each with the running
//! accumulator through the callable invocation contract.

use opal_core::error::{OpalError, Result};
use opal_core::eval::{CallableRef, Evaluator};
use opal_core::iter::{drive, Flow};
use opal_core::value::Value;

/// Concatenate `other` onto `s`, building a fresh string.
///
/// `Null` is accepted in place of `other` and treated as the empty string.
pub fn concat_str(s: &str, other: &Value) -> Result<String> {
    match other {
        Value::Str(tail) => Ok(format!("{s}{tail}")),
        Value::Null => Ok(s.to_string()),
        v => Err(OpalError::argument("concat", 1, "str", v.kind())),
    }
}

/// Append a single character, building a fresh string.
pub fn append_char(s: &str, other: &Value) -> Result<String> {
    match other {
        Value::Char(c) => {
            let mut out = String::with_capacity(s.len() + c.len_utf8());
            out.push_str(s);
            out.push(*c);
            Ok(out)
        }
        v => Err(OpalError::argument("append", 1, "char", v.kind())),
    }
}

/// Left fold: `fun(char, acc)` in character order.
pub fn foldl_str(
    ev: &mut dyn Evaluator,
    fun: &CallableRef,
    s: &str,
    acc: Value,
) -> Result<Value> {
    let chars: Vec<char> = s.chars().collect();
    drive(acc, |i, acc| {
        let Some(&c) = chars.get(i as usize) else {
            return Ok(Flow::Break);
        };
        let prev = std::mem::replace(acc, Value::Null);
        *acc = ev.apply(fun, &[Value::Char(c), prev])?;
        Ok(Flow::Continue)
    })
}

/// Right fold: `fun(char, acc)` from the last character back.
pub fn foldr_str(
    ev: &mut dyn Evaluator,
    fun: &CallableRef,
    s: &str,
    acc: Value,
) -> Result<Value> {
    let mut acc = acc;
    for c in s.chars().rev() {
        acc = ev.apply(fun, &[Value::Char(c), acc])?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_core::eval::DirectEvaluator;

    #[test]
    fn concat_joins_and_accepts_null() {
        assert_eq!(concat_str("ab", &Value::Str("cd".into())).unwrap(), "abcd");
        // Absence marker is the empty string, not an error.
        assert_eq!(concat_str("ab", &Value::Null).unwrap(), "ab");
        assert!(concat_str("ab", &Value::Int(1)).is_err());
    }

    #[test]
    fn append_requires_a_char() {
        assert_eq!(append_char("ab", &Value::Char('c')).unwrap(), "abc");
        assert!(append_char("ab", &Value::Str("c".into())).is_err());
    }

    #[test]
    fn folds_visit_chars_in_both_directions() {
        let push = CallableRef::native("push", |_, args| {
            let Value::Char(c) = args[0] else { unreachable!() };
            let mut s = args[1].as_str().unwrap_or("").to_string();
            s.push(c);
            Ok(Value::Str(s))
        });
        let mut ev = DirectEvaluator::new();

        let l = foldl_str(&mut ev, &push, "abc", Value::Str(String::new())).unwrap();
        assert_eq!(l, Value::Str("abc".into()));

        let r = foldr_str(&mut ev, &push, "abc", Value::Str(String::new())).unwrap();
        assert_eq!(r, Value::Str("cba".into()));
    }

    #[test]
    fn fold_errors_propagate() {
        let fail = CallableRef::native("fail", |_, _| Err(opal_core::OpalError::script("nope")));
        let mut ev = DirectEvaluator::new();
        assert!(foldl_str(&mut ev, &fail, "x", Value::Null).is_err());
    }
}
