//! Traversal and rebuilding of proper lists (pair-cell chains).
//!
//! List cells may be aliased by multiple script references, so nothing in
//! this module ever mutates an existing cell: append and concat materialize
//! the prefix and build fresh cells (an O(n) copy in exchange for
//! structural-sharing safety).

use opal_core::error::{OpalError, Result};
use opal_core::eval::{CallableRef, Evaluator};
use opal_core::value::Value;

fn not_a_list(op: &str, got: &Value) -> OpalError {
    OpalError::argument(op, 0, "list", got.kind())
}

/// Materialize a proper list into a vector of its elements.
pub fn list_to_vec(expr: &Value) -> Result<Vec<Value>> {
    if !expr.is_list() {
        return Err(not_a_list("list->array", expr));
    }

    let mut out = Vec::new();
    let mut cur = expr;
    while let Value::Pair(p) = cur {
        out.push(p.head.clone());
        cur = &p.tail;
    }
    Ok(out)
}

/// Build a proper list from a slice of elements.
pub fn vec_to_list(items: &[Value]) -> Value {
    let mut list = Value::Null;
    for item in items.iter().rev() {
        list = Value::cons(item.clone(), list);
    }
    list
}

/// Concatenate two lists into a fresh list.
///
/// `Null` is accepted in place of either argument and treated as the empty
/// list; this is the permissive identity behavior.
pub fn concat_list(a: &Value, b: &Value) -> Result<Value> {
    if !b.is_list() && !matches!(b, Value::Null) {
        return Err(OpalError::argument("concat", 1, "list", b.kind()));
    }

    let prefix = list_to_vec(a)?;
    let mut out = b.clone();
    for item in prefix.iter().rev() {
        out = Value::cons(item.clone(), out);
    }
    Ok(out)
}

/// Append elements to the end of a list, returning a fresh list.
///
/// The original cells are left untouched; callers holding a reference to
/// the input list never observe the new elements.
pub fn append_list(list: &Value, adds: &[Value]) -> Result<Value> {
    let mut items = list_to_vec(list)?;
    items.extend_from_slice(adds);
    Ok(vec_to_list(&items))
}

/// Apply `fun` to each element, building a fresh list of the results.
pub fn map_list(ev: &mut dyn Evaluator, fun: &CallableRef, expr: &Value) -> Result<Value> {
    if matches!(expr, Value::Null) {
        return Ok(Value::Null);
    }
    if !expr.is_list() {
        return Err(not_a_list("map", expr));
    }

    let mut mapped = Vec::new();
    let mut cur = expr;
    while let Value::Pair(p) = cur {
        mapped.push(ev.apply(fun, &[p.head.clone()])?);
        cur = &p.tail;
    }
    Ok(vec_to_list(&mapped))
}

/// Left fold: `fun(element, acc)` in list order.
///
/// An improper tail is folded as the final element rather than rejected.
pub fn foldl_list(
    ev: &mut dyn Evaluator,
    fun: &CallableRef,
    expr: &Value,
    acc: Value,
) -> Result<Value> {
    let mut acc = acc;
    let mut cur = expr.clone();
    loop {
        match cur {
            Value::Null => return Ok(acc),
            Value::Pair(p) => {
                acc = ev.apply(fun, &[p.head.clone(), acc])?;
                cur = p.tail.clone();
            }
            other => return ev.apply(fun, &[other, acc]),
        }
    }
}

/// Right fold: `fun(element, acc)` from the last element back to the first.
pub fn foldr_list(
    ev: &mut dyn Evaluator,
    fun: &CallableRef,
    expr: &Value,
    acc: Value,
) -> Result<Value> {
    let mut heads = Vec::new();
    let mut tail = None;
    let mut cur = expr.clone();
    loop {
        match cur {
            Value::Null => break,
            Value::Pair(p) => {
                heads.push(p.head.clone());
                cur = p.tail.clone();
            }
            other => {
                tail = Some(other);
                break;
            }
        }
    }

    let mut acc = acc;
    if let Some(t) = tail {
        acc = ev.apply(fun, &[t, acc])?;
    }
    for head in heads.into_iter().rev() {
        acc = ev.apply(fun, &[head, acc])?;
    }
    Ok(acc)
}

/// Visit each element of a list without invoking script code.
pub fn walk_list(expr: &Value, mut visit: impl FnMut(&Value)) {
    let mut cur = expr;
    while let Value::Pair(p) = cur {
        visit(&p.head);
        cur = &p.tail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_core::eval::DirectEvaluator;
    use std::sync::Arc;

    fn int_list(items: &[i64]) -> Value {
        vec_to_list(&items.iter().map(|&i| Value::Int(i)).collect::<Vec<_>>())
    }

    #[test]
    fn round_trips_between_list_and_vec() {
        let list = int_list(&[1, 2, 3]);
        let vec = list_to_vec(&list).unwrap();
        assert_eq!(vec, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(vec_to_list(&vec), list);
    }

    #[test]
    fn list_to_vec_rejects_dotted_chains() {
        let dotted = Value::cons(Value::Int(1), Value::Int(2));
        assert!(list_to_vec(&dotted).is_err());
    }

    #[test]
    fn append_rebuilds_instead_of_mutating_shared_cells() {
        let shared = int_list(&[2, 3]);
        let a = Value::cons(Value::Int(1), shared.clone());

        let appended = append_list(&a, &[Value::Int(4)]).unwrap();
        assert_eq!(
            list_to_vec(&appended).unwrap(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]
        );

        // The shared suffix is untouched: a second reference through it
        // still sees exactly two elements.
        assert_eq!(list_to_vec(&shared).unwrap().len(), 2);
        // And no cell of the original was rewritten in place.
        if let (Value::Pair(orig), Value::Pair(fresh)) = (&a, &appended) {
            assert!(!Arc::ptr_eq(orig, fresh));
        } else {
            panic!("expected pairs");
        }
    }

    #[test]
    fn concat_accepts_null_as_identity() {
        // Deliberate choice: the absence marker acts as the empty list
        // rather than being rejected.
        let a = int_list(&[1, 2]);
        let joined = concat_list(&a, &Value::Null).unwrap();
        assert_eq!(list_to_vec(&joined).unwrap().len(), 2);

        let joined = concat_list(&Value::Null, &a).unwrap();
        assert_eq!(list_to_vec(&joined).unwrap().len(), 2);
    }

    #[test]
    fn concat_shares_the_second_list() {
        let a = int_list(&[1]);
        let b = int_list(&[2, 3]);
        let joined = concat_list(&a, &b).unwrap();
        assert_eq!(
            list_to_vec(&joined).unwrap(),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn map_builds_a_fresh_list() {
        let double = CallableRef::native("double", |_, args| {
            Ok(Value::Int(args[0].as_int().unwrap() * 2))
        });
        let mut ev = DirectEvaluator::new();
        let out = map_list(&mut ev, &double, &int_list(&[1, 2, 3])).unwrap();
        assert_eq!(out, int_list(&[2, 4, 6]));

        assert_eq!(map_list(&mut ev, &double, &Value::Null).unwrap(), Value::Null);
        assert!(map_list(&mut ev, &double, &Value::Int(9)).is_err());
    }

    #[test]
    fn folds_run_in_the_documented_order() {
        // cons onto the accumulator; foldl reverses, foldr preserves.
        let cons = CallableRef::native("cons", |_, args| {
            Ok(Value::cons(args[0].clone(), args[1].clone()))
        });
        let mut ev = DirectEvaluator::new();
        let list = int_list(&[1, 2, 3]);

        let reversed = foldl_list(&mut ev, &cons, &list, Value::Null).unwrap();
        assert_eq!(reversed, int_list(&[3, 2, 1]));

        let same = foldr_list(&mut ev, &cons, &list, Value::Null).unwrap();
        assert_eq!(same, int_list(&[1, 2, 3]));
    }

    #[test]
    fn folds_apply_improper_tails_as_final_element() {
        let sum = CallableRef::native("sum", |_, args| {
            Ok(Value::Int(
                args[0].as_int().unwrap() + args[1].as_int().unwrap(),
            ))
        });
        let mut ev = DirectEvaluator::new();
        let dotted = Value::cons(Value::Int(1), Value::cons(Value::Int(2), Value::Int(3)));

        let l = foldl_list(&mut ev, &sum, &dotted, Value::Int(0)).unwrap();
        assert_eq!(l, Value::Int(6));
        let r = foldr_list(&mut ev, &sum, &dotted, Value::Int(0)).unwrap();
        assert_eq!(r, Value::Int(6));
    }

    #[test]
    fn walk_visits_every_element() {
        let mut seen = Vec::new();
        walk_list(&int_list(&[5, 6]), |v| seen.push(v.clone()));
        assert_eq!(seen, vec![Value::Int(5), Value::Int(6)]);
    }
}
