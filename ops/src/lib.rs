//! Sample ops for demo and testing purposes.

use std::{fmt::Debug, marker::PhantomData, ops::Mul};

use num_traits::One;
use scatterfold::{
    operation::{Monoid, Operation, OperationError, Predicate, Result},
    opkind_derive::OpKind,
    serializer::Serializable,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct CharToString;

impl Operation for CharToString {
    type Input = char;
    type Output = String;
    type Kind = Ops;

    fn execute(&self, input: Self::Input, _index: usize) -> Result<Self::Output> {
        Ok(input.to_string())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct StringLength;

impl Operation for StringLength {
    type Input = String;
    type Output = usize;
    type Kind = Ops;

    fn execute(&self, input: Self::Input, _index: usize) -> Result<Self::Output> {
        Ok(input.len())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct StringConcat;

impl Monoid for StringConcat {
    type Elem = String;
    type Kind = Ops;

    fn empty(&self) -> Self::Elem {
        String::new()
    }

    fn combine(&self, a: Self::Elem, b: Self::Elem) -> Result<Self::Elem> {
        Ok(a + &b)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct AddOne;

impl Operation for AddOne {
    type Input = i64;
    type Output = i64;
    type Kind = Ops;

    fn execute(&self, input: Self::Input, _index: usize) -> Result<Self::Output> {
        input
            .checked_add(1)
            .ok_or_else(|| OperationError::from_str("overflow"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct MultiplyBy(pub i64);

impl Operation for MultiplyBy {
    type Input = i64;
    type Output = i64;
    type Kind = Ops;

    fn execute(&self, input: Self::Input, _index: usize) -> Result<Self::Output> {
        Ok(input * self.0)
    }
}

/// Scales every element by its position in the input.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct WeightByIndex;

impl Operation for WeightByIndex {
    type Input = i64;
    type Output = i64;
    type Kind = Ops;

    fn execute(&self, input: Self::Input, index: usize) -> Result<Self::Output> {
        let weight = i64::try_from(index)?;
        Ok(input * weight)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct IsEven;

impl Predicate for IsEven {
    type Elem = i64;
    type Kind = Ops;

    fn test(&self, elem: &Self::Elem, _index: usize) -> Result<bool> {
        Ok(elem % 2 == 0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct IsAlphabetic;

impl Predicate for IsAlphabetic {
    type Elem = char;
    type Kind = Ops;

    fn test(&self, elem: &Self::Elem, _index: usize) -> Result<bool> {
        Ok(elem.is_alphabetic())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Sum;

impl Monoid for Sum {
    type Elem = i64;
    type Kind = Ops;

    fn empty(&self) -> Self::Elem {
        0
    }

    fn combine(&self, a: Self::Elem, b: Self::Elem) -> Result<Self::Elem> {
        a.checked_add(b)
            .ok_or_else(|| OperationError::from_str("overflow"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Max;

impl Operation for Max {
    type Input = Vec<i64>;
    type Output = Option<i64>;
    type Kind = Ops;

    fn execute(&self, input: Self::Input, _index: usize) -> Result<Self::Output> {
        Ok(input.into_iter().max())
    }
}

impl Monoid for Max {
    type Elem = Option<i64>;
    type Kind = Ops;

    fn empty(&self) -> Self::Elem {
        None
    }

    fn combine(&self, a: Self::Elem, b: Self::Elem) -> Result<Self::Elem> {
        Ok(a.max(b))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default)]
pub struct GenericMultiplication<T>(PhantomData<T>);

impl<T: Mul<Output = T> + One + Serializable + Debug + Clone> Monoid for GenericMultiplication<T>
where
    Ops: std::convert::From<GenericMultiplication<T>>,
{
    type Elem = T;
    type Kind = Ops;

    fn empty(&self) -> Self::Elem {
        T::one()
    }

    fn combine(&self, a: Self::Elem, b: Self::Elem) -> Result<Self::Elem> {
        Ok(a * b)
    }
}

#[derive(OpKind, Debug, Serialize, Deserialize, Clone)]
pub enum Ops {
    #[op(map)]
    CharToString(CharToString),
    #[op(map)]
    StringLength(StringLength),
    #[op(reduce)]
    StringConcat(StringConcat),
    #[op(map)]
    AddOne(AddOne),
    #[op(map)]
    MultiplyBy(MultiplyBy),
    #[op(map)]
    WeightByIndex(WeightByIndex),
    #[op(filter)]
    IsEven(IsEven),
    #[op(filter)]
    IsAlphabetic(IsAlphabetic),
    #[op(reduce)]
    Sum(Sum),
    #[op(map, reduce)]
    Max(Max),
    #[op(reduce)]
    GenericMultiplicationI32(GenericMultiplication<i32>),
    #[op(reduce)]
    GenericMultiplicationI64(GenericMultiplication<i64>),
}

#[cfg(test)]
mod test {
    use scatterfold::operation::fold_sequential;

    use super::*;

    #[test]
    fn max_maps_and_reduces() {
        assert_eq!(Max.execute(vec![3, 9, 1], 0).unwrap(), Some(9));
        assert_eq!(Max.execute(vec![], 0).unwrap(), None);

        let partials = vec![Some(4), None, Some(11), Some(2)];
        assert_eq!(fold_sequential(&Max, partials).unwrap(), Some(11));
    }

    #[test]
    fn generic_multiplication_identity() {
        let m = GenericMultiplication::<i64>::default();
        assert_eq!(fold_sequential(&m, Vec::new()).unwrap(), 1);
        assert_eq!(fold_sequential(&m, vec![1, 2, 3, 4, 5, 6]).unwrap(), 720);
    }

    #[test]
    fn add_one_reports_overflow() {
        let err = AddOne.execute(i64::MAX, 0).unwrap_err();
        assert_eq!(err.to_string(), "operation failed: overflow");
    }
}
