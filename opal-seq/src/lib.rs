//! Sequence-processing algebra for the Opal runtime.
//!
//! Map, fold and concat over the three native sequence representations —
//! proper lists, arrays, and strings — each invoking back into
//! user-supplied callables through the callable invocation contract.

pub mod array;
pub mod list;
pub mod string;

pub use array::{concat_array, foldl_array, foldr_array, map_array, strings_to_array};
pub use list::{
    append_list, concat_list, foldl_list, foldr_list, list_to_vec, map_list, vec_to_list,
    walk_list,
};
pub use string::{append_char, concat_str, foldl_str, foldr_str};
