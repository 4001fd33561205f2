#![cfg_attr(docsrs, feature(doc_cfg))]

//! Distributed map, filter and reduce over TCP.
//!
//! Scatterfold splits a bulk element-wise computation across a pool of worker
//! processes and puts the results back together in their original order. A
//! driver partitions the input into indexed chunks and ships every chunk,
//! together with a serialized operation, to a worker. The worker runs the
//! operation and sends the processed chunk back. The driver slots each result
//! into place by its index, regardless of the order in which results arrive.
//!
//! # How to use Scatterfold
//!
//! You will interact with two sides of the system: operations, which describe
//! what happens to each element, and the [`Driver`](crate::driver::Driver),
//! which distributes them. Workers are generic servers that only need to know
//! the set of operations they may run.
//!
//! ## Defining Operations
//!
//! Operations are serializable values implementing one of three traits:
//! - [`Operation`](crate::operation::Operation) for `map`.
//! - [`Predicate`](crate::operation::Predicate) for `filter`.
//! - [`Monoid`](crate::operation::Monoid) for `reduce`.
//!
//! ```
//! use scatterfold::operation::{Operation, Result};
//! # use scatterfold::opkind_derive::OpKind;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, Clone, Copy)]
//! struct FibAt;
//!
//! impl Operation for FibAt {
//!     type Input = u64;
//!     type Output = u64;
//! #    type Kind = MyOps;
//!
//!     fn execute(&self, input: Self::Input, _index: usize) -> Result<Self::Output> {
//!         let (mut a, mut b) = (0, 1);
//!         for _ in 0..input {
//!             (a, b) = (b, a + b);
//!         }
//!         Ok(a)
//!     }
//! }
//! # #[derive(OpKind, Serialize, Deserialize, Debug, Clone)]
//! # enum MyOps {
//! #     #[op(map)]
//! #     FibAt(FibAt),
//! # }
//! ```
//!
//! ## Registering Operations
//!
//! A remote worker can only run operations it was compiled with. Every
//! operation is listed as a variant of a registry enum deriving
//! [`OpKind`](crate::opkind_derive::OpKind). Each variant declares the job
//! kinds it may run under.
//!
//! ```ignore
//! #[derive(OpKind, Serialize, Deserialize, Debug, Clone)]
//! enum MyOps {
//!     #[op(map)]
//!     FibAt(FibAt),
//!     #[op(filter)]
//!     IsPrime(IsPrime),
//!     #[op(reduce)]
//!     Sum(Sum),
//! }
//! ```
//!
//! ## Running a worker
//!
//! ```no_run
//! # use scatterfold::{operation::{Operation, Result}, opkind_derive::OpKind};
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Serialize, Deserialize, Debug, Clone, Copy)]
//! # struct FibAt;
//! # impl Operation for FibAt {
//! #     type Input = u64;
//! #     type Output = u64;
//! #     type Kind = MyOps;
//! #     fn execute(&self, input: u64, _index: usize) -> Result<u64> {
//! #         Ok(input)
//! #     }
//! # }
//! # #[derive(OpKind, Serialize, Deserialize, Debug, Clone)]
//! # enum MyOps {
//! #     #[op(map)]
//! #     FibAt(FibAt),
//! # }
//! use scatterfold::{config::WorkerConfig, worker::WorkerServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let worker = WorkerServer::<MyOps>::new(WorkerConfig::local(7070))
//!         .start()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     worker.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Dispatching work
//!
//! ```no_run
//! # use scatterfold::{operation::{Operation, Result}, opkind_derive::OpKind};
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Serialize, Deserialize, Debug, Clone, Copy)]
//! # struct FibAt;
//! # impl Operation for FibAt {
//! #     type Input = u64;
//! #     type Output = u64;
//! #     type Kind = MyOps;
//! #     fn execute(&self, input: u64, _index: usize) -> Result<u64> {
//! #         Ok(input)
//! #     }
//! # }
//! # #[derive(OpKind, Serialize, Deserialize, Debug, Clone)]
//! # enum MyOps {
//! #     #[op(map)]
//! #     FibAt(FibAt),
//! # }
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Four chunks, sent to the worker on 127.0.0.1:7070. Results come
//!     // back on port 7071.
//!     let fibs = scatterfold::p_map(FibAt, (0..20).collect(), 7070, 4).await?;
//!     assert_eq!(fibs.len(), 20);
//!     Ok(())
//! }
//! ```
//!
//! ## Port convention
//!
//! Jobs are received on a worker's control port and results are sent to the
//! control port plus one on the dispatching host. Each worker reserves two
//! consecutive ports, and a driver binds the response port of every worker it
//! talks to for the duration of a call.

pub mod common;
pub mod config;
pub mod driver;
pub mod error;
pub mod job;
pub mod operation;
pub mod partition;
pub mod serializer;
pub mod transport;
pub mod worker;
pub mod opkind_derive {
    pub use scatterfold_opkind_derive::*;
}
#[cfg(test)]
mod test_ops;

pub use driver::{p_filter, p_map, p_reduce};
pub use error::{Error, Result};
pub use futures;
pub use tracing;
