//! Map, fold and concat over array values.

use opal_core::error::{OpalError, Result};
use opal_core::eval::{CallableRef, Evaluator};
use opal_core::iter::{drive, Flow};
use opal_core::value::Value;

/// Apply `fun` to each element, collecting the results.
pub fn map_array(ev: &mut dyn Evaluator, fun: &CallableRef, arr: &[Value]) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        out.push(ev.apply(fun, &[item.clone()])?);
    }
    Ok(out)
}

/// Left fold: `fun(element, acc)` in index order.
pub fn foldl_array(
    ev: &mut dyn Evaluator,
    fun: &CallableRef,
    arr: &[Value],
    acc: Value,
) -> Result<Value> {
    drive(acc, |i, acc| {
        let Some(item) = arr.get(i as usize) else {
            return Ok(Flow::Break);
        };
        let prev = std::mem::replace(acc, Value::Null);
        *acc = ev.apply(fun, &[item.clone(), prev])?;
        Ok(Flow::Continue)
    })
}

/// Right fold: `fun(element, acc)` from the last index down.
pub fn foldr_array(
    ev: &mut dyn Evaluator,
    fun: &CallableRef,
    arr: &[Value],
    acc: Value,
) -> Result<Value> {
    let mut acc = acc;
    for item in arr.iter().rev() {
        acc = ev.apply(fun, &[item.clone(), acc])?;
    }
    Ok(acc)
}

/// Concatenate `other` onto `arr`, building a fresh array.
///
/// `Null` is accepted in place of `other` and treated as the empty array.
pub fn concat_array(arr: &[Value], other: &Value) -> Result<Vec<Value>> {
    let mut out = arr.to_vec();
    match other {
        Value::Array(items) => out.extend_from_slice(items),
        Value::Null => {}
        v => return Err(OpalError::argument("concat", 1, "array", v.kind())),
    }
    Ok(out)
}

/// Lift a slice of strings into an array of string values.
pub fn strings_to_array<S: AsRef<str>>(items: &[S]) -> Vec<Value> {
    items
        .iter()
        .map(|s| Value::Str(s.as_ref().to_string()))
        .collect()
}
