//! The worker server.
//!
//! A worker has three responsibilities:
//! 1. Listen for [`AnyJob`]s on its control port.
//! 2. Execute the operation each job names over the job's chunk.
//! 3. Send the [`AnyResult`] back to the dispatching host on the control port
//!    plus one.
//!
//! Internally the server is a small set of tasks. An accept loop reads one
//! frame per connection and pushes it onto a queue. A single processing loop
//! drains that queue, running operations on the blocking pool so a slow
//! operation never stalls socket handling. Every result is delivered by its
//! own short-lived task, so the processing loop returns to
//! [`WorkerState::Listening`] as soon as execution finishes.
//!
//! # Example
//!
//! ```no_run
//! use scatterfold::{config::WorkerConfig, worker::WorkerServer};
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
//!
//! #[derive(OpKind, Serialize, Deserialize, Debug, Clone)]
//! enum MyOps {
//!     // ... your operations
//! #   #[op(map)]
//! #   AddOne(AddOne),
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let handle = WorkerServer::<MyOps>::new(WorkerConfig::local(7070))
//!         .start()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop().await;
//!
//!     Ok(())
//! }
//! ```
use std::{
    any::Any,
    fmt,
    marker::PhantomData,
    net::SocketAddr,
    panic::{catch_unwind, AssertUnwindSafe},
};

use bytes::Bytes;
use tokio::{
    net::TcpListener,
    select,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, debug_span, error, info, instrument, warn, Instrument};

use crate::{
    config::{self, WorkerConfig},
    error::{Error, Result},
    job::{AnyJob, AnyResult},
    operation::OpKind,
    serializer::Serializer,
    transport::Transport,
};

/// Lifecycle of a worker server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    /// Waiting for jobs.
    Listening,
    /// Executing a job.
    Processing,
    /// No longer accepting connections, draining queued jobs.
    Stopping,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Listening => write!(f, "listening"),
            Self::Processing => write!(f, "processing"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// A worker server that executes operations from the `Kind` registry.
#[derive(Debug)]
pub struct WorkerServer<Kind: OpKind> {
    config: WorkerConfig,
    _kind: PhantomData<Kind>,
}

impl<Kind: OpKind> WorkerServer<Kind> {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            _kind: PhantomData,
        }
    }

    /// Bind the control port and start serving.
    ///
    /// Fails with a bind error, before any state transition, if the control
    /// port is unavailable.
    #[instrument(skip(self), fields(addr = %self.config.control_addr()), level = "debug")]
    pub async fn start(self) -> Result<WorkerHandle> {
        let transport = Transport::from(&self.config.common);
        let serializer = Serializer::from(&self.config.common);

        let listener = transport.bind(self.config.control_addr()).await?;
        let local_addr = listener.local_addr()?;
        let response_port = config::response_port(local_addr.port())?;

        let (state_tx, _) = watch::channel(WorkerState::Stopped);
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let (job_tx, job_rx) = mpsc::unbounded_channel();

        state_tx.send_replace(WorkerState::Listening);
        info!(%local_addr, response_port, %serializer, "worker listening");

        let accept = tokio::spawn(accept_loop(
            listener,
            transport,
            job_tx,
            cancel.clone(),
            tracker.clone(),
        ));

        let processor = Processor {
            serializer,
            transport,
            response_port,
            tracker: tracker.clone(),
            cancel: cancel.clone(),
            state: state_tx.clone(),
        };
        let process = tokio::spawn(processor.run::<Kind>(job_rx));

        Ok(WorkerHandle {
            local_addr,
            state: state_tx,
            cancel,
            tracker,
            accept,
            process,
        })
    }
}

/// Handle to a running [`WorkerServer`].
#[derive(Debug)]
pub struct WorkerHandle {
    local_addr: SocketAddr,
    state: watch::Sender<WorkerState>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    accept: JoinHandle<()>,
    process: JoinHandle<()>,
}

impl WorkerHandle {
    /// The bound control address. Useful when the server was started on
    /// port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Stop accepting connections, finish the jobs already queued and wait
    /// for their results to be delivered.
    ///
    /// A job being executed when this is called runs to completion.
    #[instrument(skip(self), fields(addr = %self.local_addr), level = "debug")]
    pub async fn stop(self) {
        self.cancel.cancel();
        self.state.send_if_modified(|state| {
            if *state == WorkerState::Listening {
                *state = WorkerState::Stopping;
                return true;
            }
            false
        });

        if let Err(e) = self.accept.await {
            error!("accept loop failed: {e}");
        }
        if let Err(e) = self.process.await {
            error!("processing loop failed: {e}");
        }

        self.tracker.close();
        self.tracker.wait().await;

        self.state.send_replace(WorkerState::Stopped);
        info!("worker stopped");
    }
}

/// Accept connections until cancelled, queueing one frame per connection.
async fn accept_loop(
    listener: TcpListener,
    transport: Transport,
    jobs: mpsc::UnboundedSender<(SocketAddr, Bytes)>,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        let (stream, peer) = select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("failed to accept connection: {e}");
                    continue;
                }
            },
        };

        let jobs = jobs.clone();
        let cancel = cancel.clone();
        tracker.spawn(async move {
            let frame = select! {
                _ = cancel.cancelled() => return,
                frame = transport.recv_frame(stream) => frame,
            };

            match frame {
                Ok(frame) => {
                    debug!(%peer, len = frame.len(), "job received");
                    // The receiver only goes away once every sender is gone.
                    let _ = jobs.send((peer, frame));
                }
                Err(e) => warn!(%peer, "failed to read job: {e}"),
            }
        });
    }

    debug!("accept loop stopped");
}

struct Processor {
    serializer: Serializer,
    transport: Transport,
    response_port: u16,
    tracker: TaskTracker,
    cancel: CancellationToken,
    state: watch::Sender<WorkerState>,
}

impl Processor {
    /// Process queued jobs one at a time until every producer is gone.
    async fn run<Kind: OpKind>(self, mut jobs: mpsc::UnboundedReceiver<(SocketAddr, Bytes)>) {
        while let Some((peer, frame)) = jobs.recv().await {
            self.state.send_replace(WorkerState::Processing);
            self.process::<Kind>(peer, frame).await;
            self.state.send_replace(if self.cancel.is_cancelled() {
                WorkerState::Stopping
            } else {
                WorkerState::Listening
            });
        }

        debug!("processing loop stopped");
    }

    async fn process<Kind: OpKind>(&self, peer: SocketAddr, frame: Bytes) {
        let job: AnyJob = match self.serializer.from_bytes(&frame) {
            Ok(job) => job,
            Err(e) => {
                error!(%peer, "dropping undecodable job: {e}");
                return;
            }
        };

        let span = debug_span!(
            "execute",
            routing_key = %job.routing_key,
            index = job.index,
            kind = job.kind
        );

        let result = execute::<Kind>(job).instrument(span.clone()).await;
        let payload = match self.serializer.to_bytes(&result) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                error!(parent: &span, "failed to serialize result: {e}");
                return;
            }
        };

        let reply_to = SocketAddr::new(peer.ip(), self.response_port);
        let transport = self.transport;
        self.tracker.spawn(
            async move {
                match transport.send_frame(reply_to, payload).await {
                    Ok(()) => debug!(%reply_to, "result sent"),
                    Err(e) => error!(%reply_to, "failed to send result: {e}"),
                }
            }
            .instrument(span),
        );
    }
}

/// Run the job on the blocking pool and wrap the outcome in a result message.
async fn execute<Kind: OpKind>(job: AnyJob) -> AnyResult {
    let task = job.clone();
    let output = tokio::task::spawn_blocking(move || {
        catch_unwind(AssertUnwindSafe(|| task.execute::<Kind>()))
            .unwrap_or_else(|panic| Err(Error::Panicked(panic_message(panic))))
    })
    .await
    // `catch_unwind` covers the closure, so this is cancellation only.
    .unwrap_or_else(|e| Err(Error::Panicked(e.to_string())));

    match output {
        Ok(output) => {
            debug!(len = output.len(), "job executed successfully");
            AnyResult::ok(&job, output)
        }
        Err(e) => {
            warn!("job failed: {e}");
            AnyResult::err(&job, &e)
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());

    format!("operation panicked: {detail}")
}

#[cfg(test)]
mod test {
    use std::{
        net::{IpAddr, Ipv4Addr},
        time::Duration,
    };

    use super::*;
    use crate::{
        error::{FailureReason, TransportError},
        job::{AnyChunkResult, JobKind},
        partition::Chunk,
        test_ops::{free_port_pair, AddOne, Explode, Sleep, TestOps},
        transport::ResponseListener,
    };

    const S: Serializer = Serializer::Postcard;

    struct Harness {
        handle: WorkerHandle,
        results: ResponseListener,
        transport: Transport,
    }

    impl Harness {
        async fn start() -> Self {
            let port = free_port_pair();
            let handle = WorkerServer::<TestOps>::new(WorkerConfig::local(port))
                .start()
                .await
                .unwrap();
            let reply_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port + 1);
            let results = ResponseListener::bind(reply_addr, Transport::default())
                .await
                .unwrap();

            Self {
                handle,
                results,
                transport: Transport::default(),
            }
        }

        async fn send(&self, index: usize, kind: u8, op: TestOps, items: Vec<i64>) {
            let chunk = Chunk {
                index,
                offset: 0,
                items,
            };
            let mut job = AnyJob::new(
                "worker-test",
                JobKind::Map,
                S.to_bytes(&op).unwrap().into(),
                &chunk,
                S,
            )
            .unwrap();
            job.kind = kind;

            let frame = Bytes::from(S.to_bytes(&job).unwrap());
            self.transport
                .send_frame(self.handle.local_addr(), frame)
                .await
                .unwrap();
        }

        async fn recv(&self) -> AnyResult {
            let (_, frame) = tokio::time::timeout(Duration::from_secs(10), self.results.accept_frame())
                .await
                .expect("no result within 10s")
                .unwrap();
            S.from_bytes(&frame).unwrap()
        }
    }

    fn failure_reason(result: &AnyResult) -> FailureReason {
        match &result.outcome {
            AnyChunkResult::Err(failure) => failure.reason,
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn answers_map_job() {
        let harness = Harness::start().await;
        assert_eq!(harness.handle.state(), WorkerState::Listening);

        harness.send(2, 0, AddOne.into(), vec![1, 2, 3]).await;
        let result = harness.recv().await;

        assert_eq!(result.routing_key, "worker-test");
        assert_eq!(result.index, 2);
        assert_eq!(result.into_output::<Vec<i64>>(S).unwrap(), vec![2, 3, 4]);
        harness.handle.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_kind_gets_error_reply_and_worker_keeps_serving() {
        let harness = Harness::start().await;

        harness.send(0, 200, AddOne.into(), vec![1]).await;
        let result = harness.recv().await;
        assert_eq!(result.index, 0);
        assert_eq!(failure_reason(&result), FailureReason::UnsupportedOperation);

        harness.send(1, 0, AddOne.into(), vec![41]).await;
        let result = harness.recv().await;
        assert_eq!(result.into_output::<Vec<i64>>(S).unwrap(), vec![42]);
        harness.handle.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_operation_becomes_error_reply() {
        let harness = Harness::start().await;

        harness.send(0, 0, Explode.into(), vec![1]).await;
        let result = harness.recv().await;
        assert_eq!(failure_reason(&result), FailureReason::Panic);

        harness.send(1, 0, AddOne.into(), vec![1]).await;
        assert!(matches!(harness.recv().await.outcome, AnyChunkResult::Ok(_)));
        harness.handle.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn undecodable_job_is_dropped() {
        let harness = Harness::start().await;

        harness
            .transport
            .send_frame(harness.handle.local_addr(), Bytes::from_static(&[0xff; 4]))
            .await
            .unwrap();
        harness.send(7, 0, AddOne.into(), vec![0]).await;

        // Only the well-formed job is answered.
        assert_eq!(harness.recv().await.index, 7);
        harness.handle.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_delivers_queued_results() {
        let harness = Harness::start().await;
        for index in 0..3 {
            harness.send(index, 0, AddOne.into(), vec![index as i64]).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let state = harness.handle.subscribe();
        harness.handle.stop().await;
        assert_eq!(*state.borrow(), WorkerState::Stopped);

        let mut indices = Vec::new();
        for _ in 0..3 {
            let (_, frame) = harness.results.accept_frame().await.unwrap();
            indices.push(S.from_bytes::<AnyResult>(&frame).unwrap().index);
        }
        indices.sort();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_during_job_moves_through_processing_to_stopped() {
        let harness = Harness::start().await;

        let mut state = harness.handle.subscribe();
        let recorder = tokio::spawn(async move {
            let mut seen = vec![*state.borrow_and_update()];
            while state.changed().await.is_ok() {
                let current = *state.borrow_and_update();
                seen.push(current);
                if current == WorkerState::Stopped {
                    break;
                }
            }
            seen
        });

        harness.send(4, 0, Sleep(300).into(), vec![9]).await;
        let mut processing = harness.handle.subscribe();
        tokio::time::timeout(
            Duration::from_secs(10),
            processing.wait_for(|state| *state == WorkerState::Processing),
        )
        .await
        .expect("worker never started processing")
        .unwrap();

        harness.handle.stop().await;
        let seen = recorder.await.unwrap();

        assert_eq!(seen.first(), Some(&WorkerState::Listening));
        assert!(seen.contains(&WorkerState::Processing));
        assert_eq!(seen.last(), Some(&WorkerState::Stopped));
        if let Some(stopping) = seen.iter().position(|s| *s == WorkerState::Stopping) {
            assert!(seen[stopping..]
                .iter()
                .all(|s| matches!(s, WorkerState::Stopping | WorkerState::Stopped)));
        }

        // The job in flight when stop was requested still ran to completion.
        let (_, frame) = harness.results.accept_frame().await.unwrap();
        let result: AnyResult = S.from_bytes(&frame).unwrap();
        assert_eq!(result.index, 4);
        assert_eq!(result.into_output::<Vec<i64>>(S).unwrap(), vec![9]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn busy_control_port_fails_to_start() {
        let harness = Harness::start().await;
        let port = harness.handle.local_addr().port();

        let err = WorkerServer::<TestOps>::new(WorkerConfig::local(port))
            .start()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Bind { .. })));
        harness.handle.stop().await;
    }
}
