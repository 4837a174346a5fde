//! The callable invocation contract between the host bridge and the
//! evaluator.
//!
//! Every host-driven callback in the runtime support layer is expressed in
//! terms of one operation: `Apply(callable, args) -> Result<Value>`. The
//! evaluator invokes it synchronously on the calling task and never
//! re-enters it from two tasks at once; background tasks that need to reach
//! script code hand their work back to the evaluator's thread instead of
//! calling `apply` themselves.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::value::Value;

/// Host-side function signature backing a callable.
pub type NativeFn = dyn Fn(&mut dyn Evaluator, &[Value]) -> Result<Value> + Send + Sync;

/// Opaque, cloneable token identifying one script callable.
///
/// The evaluator decides what lives behind the token; embedders wrap their
/// compiled closures with [`CallableRef::native`]. Two refs compare equal
/// only when they share the same underlying function.
#[derive(Clone)]
pub struct CallableRef {
    name: Arc<str>,
    func: Arc<NativeFn>,
}

impl CallableRef {
    /// Wrap a host closure as a callable.
    pub fn native<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut dyn Evaluator, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the underlying function. Evaluator implementations call this
    /// from their `apply`; bridge code goes through [`Evaluator::apply`]
    /// instead so the evaluator keeps its own bookkeeping.
    pub fn invoke(&self, ev: &mut dyn Evaluator, args: &[Value]) -> Result<Value> {
        (self.func)(ev, args)
    }
}

impl fmt::Debug for CallableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableRef")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CallableRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

/// The single operation the runtime support layer consumes from the
/// evaluator.
pub trait Evaluator {
    /// Apply `callable` to `args`, returning the script-level result or the
    /// error it raised.
    fn apply(&mut self, callable: &CallableRef, args: &[Value]) -> Result<Value>;
}

/// Minimal evaluator that invokes the wrapped closure directly.
///
/// Useful for tests and for embedders whose callables are plain host
/// closures with no evaluator-side state.
#[derive(Debug, Default)]
pub struct DirectEvaluator;

impl DirectEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for DirectEvaluator {
    fn apply(&mut self, callable: &CallableRef, args: &[Value]) -> Result<Value> {
        callable.invoke(self, args)
    }
}
