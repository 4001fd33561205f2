//! The dispatch driver.
//!
//! The driver splits an input into indexed chunks, ships every chunk to a
//! worker together with the serialized operation, and reassembles the
//! workers' results in index order.
//!
//! A call proceeds in four steps:
//! 1. [Partition](crate::partition::partition) the input. Empty input
//!    short-circuits without touching the network.
//! 2. Bind a [`ResponseListener`] on the response port of every worker in the
//!    pool, so no result can arrive before someone is listening for it.
//! 3. Send every job concurrently. Chunk `i` goes to worker `i mod n`.
//! 4. Deposit each result into a buffer slot by its carried index until every
//!    slot is filled, then flatten the buffer.
//!
//! Any failure along the way fails the whole call. Partial results are never
//! returned, and nothing is retried.
//!
//! # Example
//!
//! ```no_run
//! use scatterfold::{config::DriverConfig, driver::Driver};
//! # use scatterfold::{operation::{Operation, Result}, opkind_derive::OpKind};
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Serialize, Deserialize, Debug, Clone, Copy)]
//! # struct AddOne;
//! # impl Operation for AddOne {
//! #     type Input = i64;
//! #     type Output = i64;
//! #     type Kind = MyOps;
//! #     fn execute(&self, input: i64, _index: usize) -> Result<i64> {
//! #         Ok(input + 1)
//! #     }
//! # }
//! # #[derive(OpKind, Serialize, Deserialize, Debug, Clone)]
//! # enum MyOps {
//! #   #[op(map)]
//! #   AddOne(AddOne),
//! # }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let driver = Driver::new(DriverConfig::local(7070, 4))?;
//!     let output = driver.map(&AddOne, vec![1, 2, 3, 4, 5, 6]).await?;
//!     assert_eq!(output, vec![2, 3, 4, 5, 6, 7]);
//!
//!     Ok(())
//! }
//! ```
use std::{
    collections::BTreeSet,
    net::SocketAddr,
    time::{Duration, Instant},
};

use bytes::Bytes;
use futures::future::try_join_all;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    select,
    sync::mpsc,
    task::JoinSet,
    time::{self, timeout_at},
};
use tracing::{debug, info, instrument, warn, Span};

use crate::{
    common::get_random_routing_key,
    config::{self, DriverConfig},
    error::{Error, Result, TransportError},
    job::{AnyJob, AnyResult, JobKind},
    operation::{self, Monoid, OpKind, Operation, Predicate},
    partition::partition,
    serializer::Serializer,
    transport::{ResponseListener, Transport},
};

/// Pause after a failed `accept` on a response port, so a persistent error
/// such as running out of file descriptors does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Dispatches map, filter and reduce calls to a pool of workers.
#[derive(Debug, Clone)]
pub struct Driver {
    config: DriverConfig,
    serializer: Serializer,
    transport: Transport,
}

impl Driver {
    /// Validate `config` and build a driver from it.
    ///
    /// The worker pool must be non-empty, the chunk count positive, and every
    /// worker's control port must leave room for its response port.
    pub fn new(config: DriverConfig) -> Result<Self> {
        if config.workers.is_empty() {
            return Err(Error::InvalidConfig("no workers configured".to_string()));
        }
        if config.chunks == 0 {
            return Err(Error::InvalidConfig(
                "chunk count must be at least 1".to_string(),
            ));
        }
        for worker in &config.workers {
            config::response_port(worker.port())?;
        }

        Ok(Self {
            serializer: Serializer::from(&config.common),
            transport: Transport::from(&config.common),
            config,
        })
    }

    /// Apply `op` to every element of `input`.
    ///
    /// The output has the same length and order as the input.
    pub async fn map<Op: Operation>(
        &self,
        op: &Op,
        input: Vec<Op::Input>,
    ) -> Result<Vec<Op::Output>> {
        let chunks: Vec<Vec<Op::Output>> = self
            .scatter::<Op::Kind, _, _>(JobKind::Map, op.clone().into(), input)
            .await?;

        Ok(chunks.into_iter().flatten().collect())
    }

    /// Keep the elements of `input` that satisfy `predicate`, in their
    /// original relative order.
    pub async fn filter<P: Predicate>(
        &self,
        predicate: &P,
        input: Vec<P::Elem>,
    ) -> Result<Vec<P::Elem>> {
        let chunks: Vec<Vec<P::Elem>> = self
            .scatter::<P::Kind, _, _>(JobKind::Filter, predicate.clone().into(), input)
            .await?;

        Ok(chunks.into_iter().flatten().collect())
    }

    /// Combine every element of `input` into a single value.
    ///
    /// Workers reduce their chunks; the per-chunk partials are then combined
    /// here, in index order. An empty input yields [`Monoid::empty`].
    pub async fn reduce<M: Monoid>(&self, m: &M, input: Vec<M::Elem>) -> Result<M::Elem> {
        let partials: Vec<M::Elem> = self
            .scatter::<M::Kind, _, _>(JobKind::Reduce, m.clone().into(), input)
            .await?;

        Ok(operation::fold_sequential(m, partials)?)
    }

    /// Distribute `input` and collect one `R` per chunk, in chunk order.
    #[instrument(
        skip_all,
        fields(kind = %kind, op = op.name(), routing_key = tracing::field::Empty),
        level = "debug"
    )]
    async fn scatter<Kind, T, R>(&self, kind: JobKind, op: Kind, input: Vec<T>) -> Result<Vec<R>>
    where
        Kind: OpKind,
        T: Serialize,
        R: DeserializeOwned,
    {
        let started = Instant::now();
        let chunks = partition(input, self.config.chunks);
        if chunks.is_empty() {
            debug!("empty input, nothing to dispatch");
            return Ok(Vec::new());
        }

        let routing_key = get_random_routing_key();
        Span::current().record("routing_key", routing_key.as_str());

        let op: Bytes = self.serializer.to_bytes(&op)?.into();
        let workers = &self.config.workers;
        let jobs = chunks
            .iter()
            .map(|chunk| {
                let job = AnyJob::new(&routing_key, kind, op.clone(), chunk, self.serializer)?;
                let worker = workers[chunk.index % workers.len()];
                Ok((worker, Bytes::from(self.serializer.to_bytes(&job)?)))
            })
            .collect::<Result<Vec<_>>>()?;
        drop(chunks);

        let listeners = self.bind_listeners().await?;
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let mut forwarders = JoinSet::new();
        for listener in listeners {
            forwarders.spawn(forward_frames(listener, results_tx.clone()));
        }
        drop(results_tx);

        let outcome = self.gather(&routing_key, jobs, results_rx).await;
        // The response ports must be free again once the call returns.
        forwarders.shutdown().await;

        if outcome.is_ok() {
            info!(elapsed = ?started.elapsed(), "call complete");
        }
        outcome
    }

    /// Send every job, then collect one result per job.
    async fn gather<R: DeserializeOwned>(
        &self,
        routing_key: &str,
        jobs: Vec<(SocketAddr, Bytes)>,
        mut results: mpsc::UnboundedReceiver<Bytes>,
    ) -> Result<Vec<R>> {
        let count = jobs.len();
        try_join_all(
            jobs.into_iter()
                .map(|(worker, frame)| self.transport.send_frame(worker, frame)),
        )
        .await?;
        debug!(chunks = count, "jobs dispatched");

        let timeout = self.config.result_timeout();
        let deadline = time::Instant::now() + timeout;
        let mut buffer = ResultBuffer::new(count);

        while !buffer.is_complete() {
            let frame = match timeout_at(deadline, results.recv()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(TransportError::Closed { peer: None }.into()),
                Err(_) => {
                    return Err(Error::Timeout {
                        waited: timeout,
                        missing: buffer.missing(),
                    })
                }
            };

            let result: AnyResult = self.serializer.from_bytes(&frame)?;
            if result.routing_key != routing_key {
                warn!(
                    foreign = %result.routing_key,
                    index = result.index,
                    "ignoring result of another call"
                );
                continue;
            }
            let index = result.index;
            if !buffer.is_pending(index) {
                warn!(index, "ignoring duplicate or out of range result");
                continue;
            }

            buffer.fill(index, result.into_output(self.serializer)?);
            debug!(index, remaining = buffer.missing().len(), "result collected");
        }

        Ok(buffer.into_ordered())
    }

    /// Bind the response port of every worker in the pool.
    ///
    /// Workers sharing a port number share a listener.
    async fn bind_listeners(&self) -> Result<Vec<ResponseListener>> {
        let mut listeners = Vec::new();
        for port in self.response_ports()? {
            let addr = SocketAddr::new(self.config.reply_bind, port);
            listeners.push(ResponseListener::bind(addr, self.transport).await?);
        }
        Ok(listeners)
    }

    /// Distinct response ports of the worker pool.
    fn response_ports(&self) -> Result<BTreeSet<u16>> {
        self.config
            .workers
            .iter()
            .map(|worker| config::response_port(worker.port()))
            .collect()
    }
}

/// Forward every frame arriving on `listener` to the collecting task.
///
/// Each accepted connection is read on its own task, so a peer that connects
/// and never sends cannot hold up results behind it. Dropping the forwarder
/// aborts any reads still in flight.
async fn forward_frames(listener: ResponseListener, results: mpsc::UnboundedSender<Bytes>) {
    let transport = listener.transport();
    let mut reads = JoinSet::new();

    loop {
        let (stream, peer) = select! {
            _ = results.closed() => break,
            Some(_) = reads.join_next(), if !reads.is_empty() => continue,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("failed to accept result connection: {e}");
                    time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };

        let results = results.clone();
        reads.spawn(async move {
            match transport.recv_frame(stream).await {
                Ok(frame) => {
                    debug!(%peer, "result frame received");
                    let _ = results.send(frame);
                }
                Err(e) => warn!(%peer, "failed to read result: {e}"),
            }
        });
    }
}

/// Order-restoring collection of per-chunk results.
///
/// Holds one slot per chunk index and the set of indices still pending.
#[derive(Debug)]
struct ResultBuffer<R> {
    slots: Vec<Option<R>>,
    pending: BTreeSet<usize>,
}

impl<R> ResultBuffer<R> {
    fn new(len: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(len).collect(),
            pending: (0..len).collect(),
        }
    }

    fn is_pending(&self, index: usize) -> bool {
        self.pending.contains(&index)
    }

    /// Fill slot `index`. Returns `false` if the slot was not pending.
    fn fill(&mut self, index: usize, value: R) -> bool {
        if !self.pending.remove(&index) {
            return false;
        }
        self.slots[index] = Some(value);
        true
    }

    fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    fn missing(&self) -> Vec<usize> {
        self.pending.iter().copied().collect()
    }

    fn into_ordered(self) -> Vec<R> {
        self.slots.into_iter().flatten().collect()
    }
}

/// Map `op` over `input` using a single worker on `127.0.0.1:base_port`,
/// splitting the input into `worker_count` chunks.
pub async fn p_map<Op: Operation>(
    op: Op,
    input: Vec<Op::Input>,
    base_port: u16,
    worker_count: usize,
) -> Result<Vec<Op::Output>> {
    Driver::new(DriverConfig::local(base_port, worker_count))?
        .map(&op, input)
        .await
}

/// Filter `input` with `predicate` using a single worker on
/// `127.0.0.1:base_port`.
pub async fn p_filter<P: Predicate>(
    predicate: P,
    input: Vec<P::Elem>,
    base_port: u16,
    worker_count: usize,
) -> Result<Vec<P::Elem>> {
    Driver::new(DriverConfig::local(base_port, worker_count))?
        .filter(&predicate, input)
        .await
}

/// Reduce `input` with `m` using a single worker on `127.0.0.1:base_port`.
pub async fn p_reduce<M: Monoid>(
    m: M,
    input: Vec<M::Elem>,
    base_port: u16,
    worker_count: usize,
) -> Result<M::Elem> {
    Driver::new(DriverConfig::local(base_port, worker_count))?
        .reduce(&m, input)
        .await
}
