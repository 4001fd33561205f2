//! Job and result envelopes, and the chunk executors that run on a worker.
//!
//! A job pairs one chunk of the input with a serialized operation and the
//! [`JobKind`] selecting how the operation is applied. It represents the
//! payload a driver sends to a worker's control port. The worker answers with
//! an [`AnyResult`] on the response port, echoing the chunk index so the
//! driver can slot it back into place regardless of arrival order.
//!
//! Both envelopes are opaque with respect to element and operation types:
//! operations, chunks and outputs travel as serialized bytes. This lets a
//! worker decode the envelope (and learn the chunk index) even when the
//! payload inside it turns out to be unusable, in which case it replies with
//! an error-tagged result rather than going silent.
use std::fmt;

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{ChunkFailure, Error, Result},
    operation::{self, Monoid, OpKind, Operation, Predicate},
    partition::Chunk,
    serializer::Serializer,
};

/// The operation category, selecting worker execution semantics.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum JobKind {
    Map = 0,
    Filter = 1,
    Reduce = 2,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map => write!(f, "map"),
            Self::Filter => write!(f, "filter"),
            Self::Reduce => write!(f, "reduce"),
        }
    }
}

impl From<JobKind> for u8 {
    fn from(kind: JobKind) -> Self {
        kind as u8
    }
}

/// Kinds travel as a raw tag so that a worker can answer a job carrying a
/// kind it doesn't know instead of failing to decode the envelope.
impl TryFrom<u8> for JobKind {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Map),
            1 => Ok(Self::Filter),
            2 => Ok(Self::Reduce),
            other => Err(Error::UnknownKind(other)),
        }
    }
}

/// A job message, as sent to a worker's control port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AnyJob {
    /// Identifies the dispatching call. Echoed back in the result.
    pub routing_key: String,
    /// Position of the chunk in the partition.
    pub index: usize,
    /// Position of the chunk's first element in the original input.
    pub offset: usize,
    /// Raw [`JobKind`] tag.
    pub kind: u8,
    /// The serialized [`OpKind`] registry variant to execute.
    pub op: Bytes,
    /// The serialized chunk elements.
    pub chunk: Bytes,
    /// The [`Serializer`] used for `op`, `chunk` and the result payload.
    pub serializer: Serializer,
}

impl AnyJob {
    /// Build the job for `chunk`, with `op` already serialized.
    pub fn new<T: Serialize>(
        routing_key: &str,
        kind: JobKind,
        op: Bytes,
        chunk: &Chunk<T>,
        serializer: Serializer,
    ) -> Result<Self> {
        Ok(Self {
            routing_key: routing_key.to_string(),
            index: chunk.index,
            offset: chunk.offset,
            kind: kind.into(),
            op,
            chunk: serializer.to_bytes(&chunk.items)?.into(),
            serializer,
        })
    }

    /// Decode the operation and run it over the chunk.
    ///
    /// This is the blocking half of job processing. The worker calls it off
    /// the async executor.
    pub fn execute<Kind: OpKind>(&self) -> Result<Vec<u8>> {
        let kind = JobKind::try_from(self.kind)?;
        let op: Kind = self.serializer.from_bytes(&self.op)?;
        op.execute_chunk(kind, self.serializer, &self.chunk, self.offset)
    }
}

/// Outcome of a job: the serialized output, or the reason it failed.
///
/// `Result` isn't serializable, so we need to wrap it in a type that is.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum AnyChunkResult {
    Ok(Bytes),
    Err(ChunkFailure),
}

/// A result message, as sent to the driver's response port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AnyResult {
    pub routing_key: String,
    pub index: usize,
    pub outcome: AnyChunkResult,
}

impl AnyResult {
    pub fn ok(job: &AnyJob, output: Vec<u8>) -> Self {
        Self {
            routing_key: job.routing_key.clone(),
            index: job.index,
            outcome: AnyChunkResult::Ok(output.into()),
        }
    }

    pub fn err(job: &AnyJob, err: &Error) -> Self {
        Self {
            routing_key: job.routing_key.clone(),
            index: job.index,
            outcome: AnyChunkResult::Err(err.into()),
        }
    }

    /// Convert the opaque outcome into the typed chunk output.
    ///
    /// An error-tagged result becomes [`Error::Remote`].
    pub fn into_output<R: DeserializeOwned>(self, serializer: Serializer) -> Result<R> {
        match self.outcome {
            AnyChunkResult::Ok(bytes) => serializer.from_bytes(&bytes),
            AnyChunkResult::Err(failure) => Err(Error::Remote {
                index: self.index,
                failure,
            }),
        }
    }
}

/// Apply `op` to every element of a serialized chunk.
///
/// The output has the same length as the input.
pub fn map_chunk<Op: Operation>(
    op: &Op,
    serializer: Serializer,
    chunk: &[u8],
    offset: usize,
) -> Result<Vec<u8>> {
    let input: Vec<Op::Input> = serializer.from_bytes(chunk)?;
    let output = input
        .into_iter()
        .enumerate()
        .map(|(i, elem)| op.execute(elem, offset + i))
        .collect::<operation::Result<Vec<_>>>()?;

    serializer.to_bytes(&output)
}

/// Keep the elements of a serialized chunk that satisfy `predicate`,
/// preserving their relative order.
pub fn filter_chunk<P: Predicate>(
    predicate: &P,
    serializer: Serializer,
    chunk: &[u8],
    offset: usize,
) -> Result<Vec<u8>> {
    let input: Vec<P::Elem> = serializer.from_bytes(chunk)?;
    let mut output = Vec::with_capacity(input.len());
    for (i, elem) in input.into_iter().enumerate() {
        if predicate.test(&elem, offset + i)? {
            output.push(elem);
        }
    }

    serializer.to_bytes(&output)
}

/// Fold a serialized chunk into a single value with `m`.
pub fn reduce_chunk<M: Monoid>(
    m: &M,
    serializer: Serializer,
    chunk: &[u8],
    _offset: usize,
) -> Result<Vec<u8>> {
    let input: Vec<M::Elem> = serializer.from_bytes(chunk)?;
    let output = operation::fold_sequential(m, input)?;

    serializer.to_bytes(&output)
}
