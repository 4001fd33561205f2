//! Operations registered for the crate's own unit tests.
use std::net::{Ipv4Addr, TcpListener};

use serde::{Deserialize, Serialize};

use crate::{
    operation::{Monoid, Operation, OperationError, Predicate, Result},
    opkind_derive::OpKind,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct AddOne;

impl Operation for AddOne {
    type Input = i64;
    type Output = i64;
    type Kind = TestOps;

    fn execute(&self, input: i64, _index: usize) -> Result<i64> {
        Ok(input + 1)
    }
}

/// Adds the element's original index to it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct AddIndex;

impl Operation for AddIndex {
    type Input = i64;
    type Output = i64;
    type Kind = TestOps;

    fn execute(&self, input: i64, index: usize) -> Result<i64> {
        Ok(input + index as i64)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct IsEven;

impl Predicate for IsEven {
    type Elem = i64;
    type Kind = TestOps;

    fn test(&self, elem: &i64, _index: usize) -> Result<bool> {
        Ok(elem % 2 == 0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Sum;

impl Monoid for Sum {
    type Elem = i64;
    type Kind = TestOps;

    fn empty(&self) -> i64 {
        0
    }

    fn combine(&self, a: i64, b: i64) -> Result<i64> {
        Ok(a + b)
    }
}

/// Fails on the given element.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct FailOn(pub i64);

impl Operation for FailOn {
    type Input = i64;
    type Output = i64;
    type Kind = TestOps;

    fn execute(&self, input: i64, _index: usize) -> Result<i64> {
        if input == self.0 {
            return OperationError::from_str("refusing to process element").into();
        }
        Ok(input)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Explode;

impl Operation for Explode {
    type Input = i64;
    type Output = i64;
    type Kind = TestOps;

    fn execute(&self, _input: i64, _index: usize) -> Result<i64> {
        panic!("boom")
    }
}

/// Blocks for the given number of milliseconds, then passes the element on.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Sleep(pub u64);

impl Operation for Sleep {
    type Input = i64;
    type Output = i64;
    type Kind = TestOps;

    fn execute(&self, input: i64, _index: usize) -> Result<i64> {
        std::thread::sleep(std::time::Duration::from_millis(self.0));
        Ok(input)
    }
}

#[derive(OpKind, Serialize, Deserialize, Debug, Clone)]
#[scatterfold(internal)]
pub enum TestOps {
    #[op(map)]
    AddOne(AddOne),
    #[op(map)]
    AddIndex(AddIndex),
    #[op(filter)]
    IsEven(IsEven),
    #[op(reduce)]
    Sum(Sum),
    #[op(map)]
    FailOn(FailOn),
    #[op(map)]
    Explode(Explode),
    #[op(map)]
    Sleep(Sleep),
}

/// A loopback port `p` such that `p + 1` is free as well.
pub fn free_port_pair() -> u16 {
    loop {
        let first = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = first.local_addr().unwrap().port();
        if port < u16::MAX && TcpListener::bind((Ipv4Addr::LOCALHOST, port + 1)).is_ok() {
            return port;
        }
    }
}
