//! Core types and contracts for the Opal runtime support layer.
//!
//! This crate provides the value model, the error taxonomy, the callable
//! invocation contract consumed from the evaluator, and the guarded
//! iteration helper shared by every host-to-script loop.

pub mod error;
pub mod eval;
pub mod iter;
pub mod value;

pub use error::{OpalError, Result};
pub use eval::{CallableRef, DirectEvaluator, Evaluator, NativeFn};
pub use iter::{drive, Flow};
pub use value::{Pair, Value};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{OpalError, Result};
    pub use crate::eval::{CallableRef, DirectEvaluator, Evaluator};
    pub use crate::iter::{drive, Flow};
    pub use crate::value::{Pair, Value};
}
