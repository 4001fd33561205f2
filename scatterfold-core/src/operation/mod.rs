//! Remote operation traits.
//!
//! This module defines the traits that let users describe the logic a worker
//! runs over each chunk. Operations are plain serializable values, never
//! closures: a worker can only run operations that were compiled into it and
//! listed in its [`OpKind`] registry. Whatever state an operation needs travels
//! as its serialized fields.
//!
//! ## [`Operation`]
//! Element-wise transformation used by `map`. Receives each element together
//! with its index in the original input.
//!
//! ## [`Predicate`]
//! Element-wise test used by `filter`. Also receives the original index.
//!
//! ## [`Monoid`]
//! Associative binary combination used by `reduce`, with an identity element
//! that is returned for empty input.
//!
//! ## [`OpKind`]
//! The registry of every operation a worker can execute. Implemented with the
//! [derive macro](crate::opkind_derive::OpKind), where each variant declares
//! which job kinds it may run under.
//!
//! ## Example
//! ### Defining and registering operations:
//!
//! ```
//! use scatterfold::{
//!     operation::{Monoid, Operation, Predicate, Result},
//!     opkind_derive::OpKind,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, Clone, Copy)]
//! struct MultiplyBy(i32);
//!
//! impl Operation for MultiplyBy {
//!     type Input = i32;
//!     type Output = i32;
//!     type Kind = MyOps;
//!
//!     fn execute(&self, input: i32, _index: usize) -> Result<i32> {
//!         Ok(self.0 * input)
//!     }
//! }
//!
//! #[derive(Serialize, Deserialize, Debug, Clone, Copy)]
//! struct IsOdd;
//!
//! impl Predicate for IsOdd {
//!     type Elem = i32;
//!     type Kind = MyOps;
//!
//!     fn test(&self, elem: &i32, _index: usize) -> Result<bool> {
//!         Ok(elem % 2 != 0)
//!     }
//! }
//!
//! #[derive(Serialize, Deserialize, Debug, Clone, Copy)]
//! struct Sum;
//!
//! impl Monoid for Sum {
//!     type Elem = i32;
//!     type Kind = MyOps;
//!
//!     fn empty(&self) -> i32 {
//!         0
//!     }
//!
//!     fn combine(&self, a: i32, b: i32) -> Result<i32> {
//!         Ok(a + b)
//!     }
//! }
//!
//! #[derive(OpKind, Serialize, Deserialize, Debug, Clone)]
//! enum MyOps {
//!     #[op(map)]
//!     MultiplyBy(MultiplyBy),
//!     #[op(filter)]
//!     IsOdd(IsOdd),
//!     #[op(reduce)]
//!     Sum(Sum),
//! }
//! ```
use std::fmt::Debug;

use crate::{
    error::Result as CrateResult,
    job::JobKind,
    serializer::{Serializable, Serializer},
};

/// The registry of operations a worker can execute.
///
/// A job names its operation by serializing the registry variant that wraps
/// it. The worker deserializes the variant and hands the chunk to the
/// executor matching the job's [`JobKind`].
///
/// This trait will be automatically implemented by the
/// [derive macro](crate::opkind_derive::OpKind). It is highly recommended that
/// you use the derive macro rather than implementing this trait manually.
pub trait OpKind: Serializable + Clone + Debug {
    /// Variant name, used for logging and error messages.
    fn name(&self) -> &'static str;

    /// Run this operation over a serialized chunk and return the serialized
    /// output.
    ///
    /// `offset` is the position of the chunk's first element in the original
    /// input. Fails with
    /// [`Error::UnsupportedOperation`](crate::error::Error::UnsupportedOperation)
    /// if the variant does not declare `kind`.
    fn execute_chunk(
        self,
        kind: JobKind,
        serializer: Serializer,
        chunk: &[u8],
        offset: usize,
    ) -> CrateResult<Vec<u8>>;
}

/// An element-wise transformation, run by `map`.
///
/// Akin to a function `(element, index) -> output`, where `index` is the
/// element's position in the original, unpartitioned input.
pub trait Operation: Serializable + Clone + Debug {
    /// The input type of the operation.
    type Input: Serializable + Debug;
    /// The output type of the operation.
    type Output: Serializable + Debug;
    /// The registry this operation is listed in.
    type Kind: OpKind + From<Self>;

    /// Execute the operation on the given input.
    fn execute(&self, input: Self::Input, index: usize) -> Result<Self::Output>;
}

/// An element-wise test, run by `filter`.
///
/// Elements for which [`Predicate::test`] returns `true` are kept, in their
/// original relative order.
pub trait Predicate: Serializable + Clone + Debug {
    type Elem: Serializable + Debug;
    type Kind: OpKind + From<Self>;

    fn test(&self, elem: &Self::Elem, index: usize) -> Result<bool>;
}

/// An associative binary operation, run by `reduce`.
///
/// Workers fold each chunk into a partial, and the driver folds the partials
/// in chunk order. Associativity is what makes the two-level fold agree with
/// a sequential one; commutativity is not required.
///
/// # Example
///
/// A monoid that is generic over its element type:
///
/// ```
/// use std::{fmt::Debug, marker::PhantomData, ops::Mul};
///
/// use num_traits::One;
/// use scatterfold::{
///     operation::{fold_sequential, Monoid, Result},
///     opkind_derive::OpKind,
///     serializer::Serializable,
/// };
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, Debug, Clone, Copy, Default)]
/// struct Product<T>(PhantomData<T>);
///
/// impl<T: Mul<Output = T> + One + Serializable + Debug + Clone> Monoid for Product<T>
/// where
///     MyOps: From<Product<T>>,
/// {
///     type Elem = T;
///     type Kind = MyOps;
///
///     fn empty(&self) -> T {
///         T::one()
///     }
///
///     fn combine(&self, a: T, b: T) -> Result<T> {
///         Ok(a * b)
///     }
/// }
///
/// #[derive(OpKind, Serialize, Deserialize, Debug, Clone)]
/// enum MyOps {
///     #[op(reduce)]
///     ProductI32(Product<i32>),
///     #[op(reduce)]
///     ProductU64(Product<u64>),
/// }
///
/// let product = Product::<u64>::default();
/// assert_eq!(fold_sequential(&product, vec![1, 2, 3, 4]).unwrap(), 24);
/// assert_eq!(fold_sequential(&product, Vec::new()).unwrap(), 1);
/// ```
pub trait Monoid: Serializable + Clone + Debug {
    /// Both the element type and the type of every partial result.
    type Elem: Serializable + Debug;
    type Kind: OpKind + From<Self>;

    /// Identity of [`Monoid::combine`]. Returned when reducing an empty
    /// input or an empty chunk.
    fn empty(&self) -> Self::Elem;

    /// Combine an accumulator with the next element.
    fn combine(&self, a: Self::Elem, b: Self::Elem) -> Result<Self::Elem>;
}

/// Reduce `items` left to right with `m`.
///
/// The first element seeds the accumulator; an empty iterator yields
/// [`Monoid::empty`].
pub fn fold_sequential<M: Monoid>(
    m: &M,
    items: impl IntoIterator<Item = M::Elem>,
) -> Result<M::Elem> {
    let mut items = items.into_iter();
    match items.next() {
        None => Ok(m.empty()),
        Some(first) => items.try_fold(first, |acc, next| m.combine(acc, next)),
    }
}

mod error;
pub use error::*;
