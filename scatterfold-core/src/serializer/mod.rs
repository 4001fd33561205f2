//! Byte encodings for operations, chunks and wire envelopes.
//!
//! Everything that crosses a socket passes through a [`Serializer`]: the
//! registry variant naming the operation, the chunk elements, the processed
//! output, and the [`AnyJob`](crate::job::AnyJob) and
//! [`AnyResult`](crate::job::AnyResult) envelopes around them. Two formats
//! are available. Postcard is compact and the default. CBOR is
//! self-describing, which helps when inspecting traffic.
//!
//! Encoding failures in either direction surface as
//! [`Error::Serialization`].
//!
//! ```rust
//! use scatterfold::serializer::Serializer;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Reading {
//!     sensor: String,
//!     value: f64,
//! }
//!
//! let reading = Reading { sensor: "north".to_string(), value: 0.5 };
//! for serializer in [Serializer::Postcard, Serializer::Cbor] {
//!     let bytes = serializer.to_bytes(&reading).unwrap();
//!     let decoded: Reading = serializer.from_bytes(&bytes).unwrap();
//!     assert_eq!(decoded, reading);
//! }
//! ```

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::instrument;

use crate::{
    config::{self, Config},
    error::{Error, Result},
};

/// Bound shared by operations and the elements they consume and produce.
///
/// Values are moved between async tasks and the blocking pool, so they must
/// be owned and thread-safe.
pub trait Serializable: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {}
impl<T> Serializable for T where T: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {}

/// A wire encoding.
///
/// Both ends of a connection must agree on the format used for the wire
/// envelopes. Payloads inside a job carry their own [`Serializer`] tag.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub enum Serializer {
    #[default]
    Postcard,
    Cbor,
}

impl std::fmt::Display for Serializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postcard => write!(f, "postcard"),
            Self::Cbor => write!(f, "cbor"),
        }
    }
}

impl Serializer {
    /// Encode `value` in this format.
    #[instrument(skip(value), level = "trace")]
    pub fn to_bytes<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Self::Postcard => {
                postcard::to_allocvec(value).map_err(|e| Error::Serialization(e.into()))
            }
            Self::Cbor => {
                let mut result = Vec::new();
                ciborium::into_writer(value, &mut result)
                    .map_err(|e| Error::Serialization(e.into()))?;
                Ok(result)
            }
        }
    }

    /// Decode a `T` from `bytes`. Trailing input is not an error for postcard.
    #[instrument(skip(bytes), level = "trace")]
    pub fn from_bytes<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Self::Postcard => postcard::from_bytes(bytes).map_err(|e| Error::Serialization(e.into())),
            Self::Cbor => ciborium::from_reader(bytes).map_err(|e| Error::Serialization(e.into())),
        }
    }
}

impl From<&Config> for Serializer {
    fn from(config: &Config) -> Self {
        match config.serializer {
            config::Serializer::Postcard => Self::Postcard,
            config::Serializer::Cbor => Self::Cbor,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Envelope {
        index: usize,
        chunk: Vec<i64>,
        label: String,
    }

    fn envelope() -> Envelope {
        Envelope {
            index: 3,
            chunk: vec![-1, 0, 1, i64::MAX],
            label: "chunk".to_string(),
        }
    }

    #[test]
    fn postcard_preserves_value() {
        let bytes = Serializer::Postcard.to_bytes(&envelope()).unwrap();
        let decoded: Envelope = Serializer::Postcard.from_bytes(&bytes).unwrap();
        assert_eq!(decoded, envelope());
    }

    #[test]
    fn cbor_preserves_value() {
        let bytes = Serializer::Cbor.to_bytes(&envelope()).unwrap();
        let decoded: Envelope = Serializer::Cbor.from_bytes(&bytes).unwrap();
        assert_eq!(decoded, envelope());
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        let result = Serializer::Postcard.from_bytes::<Envelope>(&[0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(Error::Serialization(_))));

        let result = Serializer::Cbor.from_bytes::<Envelope>(&[0xff]);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }
}
