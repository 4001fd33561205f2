#![allow(dead_code)]

use std::net::{Ipv4Addr, TcpListener};

use scatterfold::{
    config::WorkerConfig,
    operation::{Monoid, Operation, OperationError, Predicate, Result},
    opkind_derive::OpKind,
    worker::{WorkerHandle, WorkerServer},
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct AddOne;

impl Operation for AddOne {
    type Input = i64;
    type Output = i64;
    type Kind = Ops;

    fn execute(&self, input: i64, _index: usize) -> Result<i64> {
        Ok(input + 1)
    }
}

/// Pairs every element with its original index.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Enumerate;

impl Operation for Enumerate {
    type Input = String;
    type Output = (usize, String);
    type Kind = Ops;

    fn execute(&self, input: String, index: usize) -> Result<(usize, String)> {
        Ok((index, input))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct IsEven;

impl Predicate for IsEven {
    type Elem = i64;
    type Kind = Ops;

    fn test(&self, elem: &i64, _index: usize) -> Result<bool> {
        Ok(elem % 2 == 0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Sum;

impl Monoid for Sum {
    type Elem = i64;
    type Kind = Ops;

    fn empty(&self) -> i64 {
        0
    }

    fn combine(&self, a: i64, b: i64) -> Result<i64> {
        Ok(a + b)
    }
}

/// Not commutative, so any reordering shows up in the output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct Concat;

impl Monoid for Concat {
    type Elem = String;
    type Kind = Ops;

    fn empty(&self) -> String {
        String::new()
    }

    fn combine(&self, a: String, b: String) -> Result<String> {
        Ok(a + &b)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct FailOn(pub i64);

impl Operation for FailOn {
    type Input = i64;
    type Output = i64;
    type Kind = Ops;

    fn execute(&self, input: i64, _index: usize) -> Result<i64> {
        if input == self.0 {
            return OperationError::from_str("refusing to process element").into();
        }
        Ok(input)
    }
}

#[derive(OpKind, Serialize, Deserialize, Debug, Clone)]
pub enum Ops {
    #[op(map)]
    AddOne(AddOne),
    #[op(map)]
    Enumerate(Enumerate),
    #[op(filter)]
    IsEven(IsEven),
    #[op(reduce)]
    Sum(Sum),
    #[op(reduce)]
    Concat(Concat),
    #[op(map)]
    FailOn(FailOn),
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

/// Route logs through the test harness. Set `RUST_LOG` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Start a worker on a fresh loopback port pair.
pub async fn start_worker() -> WorkerHandle {
    init_tracing();
    WorkerServer::<Ops>::new(WorkerConfig::local(free_port_pair()))
        .start()
        .await
        .unwrap()
}
