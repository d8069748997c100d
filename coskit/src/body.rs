use bytes::Bytes;
use coskit_core::Result;
use std::fmt::{Debug, Formatter};
use tokio::io::{AsyncRead, AsyncReadExt};

/// The body of an outgoing request.
///
/// A `Bytes` body can be replayed across retry attempts. A `Reader` body is
/// single-use: the retry policy performs exactly one attempt for it, since
/// the source cannot be rewound.
pub enum Body {
    /// No body.
    Empty,
    /// A replayable in-memory body.
    Bytes(Bytes),
    /// A single-use streaming body.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl Body {
    /// Wrap a single-use reader.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    /// Materialize the payload, reporting whether it may be replayed.
    pub(crate) async fn into_payload(self) -> Result<(Bytes, bool)> {
        match self {
            Body::Empty => Ok((Bytes::new(), true)),
            Body::Bytes(bytes) => Ok((bytes, true)),
            Body::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok((Bytes::from(buf), false))
            }
        }
    }
}

impl Debug for Body {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Bytes(b) => write!(f, "Body::Bytes({} bytes)", b.len()),
            Body::Reader(_) => f.write_str("Body::Reader"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<&'static [u8]> for Body {
    fn from(value: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(value))
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}
