use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};

use crate::{Replicate, ReplicateError};

/// A response body that can only be read once.
///
/// The content is materialized up front as a list of [`Bytes`] chunks; reading a
/// [`Body`] (as a [`Stream`] or through [`Body::into_bytes`]) advances only its own
/// cursor. Use [`Body::replica`] to obtain another reader over the full content.
#[derive(Debug)]
pub struct Body {
    chunks: Arc<[Bytes]>,
    position: usize,
    replicas: Option<Arc<AtomicUsize>>,
}

impl Body {
    pub fn empty() -> Self {
        Self::from_chunks(Vec::new())
    }

    pub fn from_chunks<I: IntoIterator<Item = Bytes>>(chunks: I) -> Self {
        Self {
            chunks: chunks.into_iter().filter(|chunk| !chunk.is_empty()).collect(),
            position: 0,
            replicas: None,
        }
    }

    /// Drain a byte stream into memory, failing with the first stream error
    pub async fn from_stream<S, E>(stream: S) -> Result<Self, E>
    where
        S: Stream<Item = Result<Bytes, E>>,
    {
        let chunks: Vec<Bytes> = stream.try_collect().await?;
        Ok(Self::from_chunks(chunks))
    }

    /// Bound how many replicas may be taken from this body and its replicas combined
    pub fn with_replica_limit(mut self, limit: usize) -> Self {
        self.replicas = Some(Arc::new(AtomicUsize::new(limit)));
        self
    }

    /// Total length in bytes
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Bytes not yet read from this body
    pub fn remaining(&self) -> usize {
        self.chunks[self.position..].iter().map(Bytes::len).sum()
    }

    pub fn is_consumed(&self) -> bool {
        self.position >= self.chunks.len()
    }

    /// A fresh reader over the whole content, regardless of how far this one was read
    pub fn replica(&self) -> Result<Body, ReplicateError> {
        if let Some(budget) = &self.replicas {
            budget
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1))
                .map_err(|_| ReplicateError::new("body replica limit reached"))?;
        }

        Ok(Body {
            chunks: self.chunks.clone(),
            position: 0,
            replicas: self.replicas.clone(),
        })
    }

    /// Read everything that is left into one buffer
    pub fn into_bytes(self) -> Bytes {
        let rest = &self.chunks[self.position.min(self.chunks.len())..];

        match rest {
            [] => Bytes::new(),
            [single] => single.clone(),
            many => {
                let mut buffer = BytesMut::with_capacity(many.iter().map(Bytes::len).sum());
                for chunk in many {
                    buffer.extend_from_slice(chunk);
                }
                buffer.freeze()
            }
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::from_chunks([bytes])
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

impl Stream for Body {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let chunk = this.chunks.get(this.position).cloned();

        if chunk.is_some() {
            this.position += 1;
        }

        Poll::Ready(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.chunks.len().saturating_sub(self.position);
        (left, Some(left))
    }
}

/// Replicates [`Body`] values through [`Body::replica`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct BodyReplicator;

impl Replicate<Body> for BodyReplicator {
    fn replicate(&self, value: &Body) -> Result<Body, ReplicateError> {
        value.replica()
    }
}

#[cfg(test)]
mod tests {
    use futures::{stream, StreamExt};

    use super::*;

    fn chunked() -> Body {
        Body::from_chunks([
            Bytes::from_static(b"hello "),
            Bytes::new(),
            Bytes::from_static(b"wor"),
            Bytes::from_static(b"ld"),
        ])
    }

    #[tokio::test]
    async fn streams_chunks_once() {
        let mut body = chunked();
        assert_eq!(body.len(), 11);

        let mut read = Vec::new();
        while let Some(chunk) = body.next().await {
            read.extend_from_slice(&chunk);
        }

        assert_eq!(read, b"hello world");
        assert!(body.is_consumed());
        assert_eq!(body.remaining(), 0);
        assert_eq!(body.next().await, None);
    }

    #[tokio::test]
    async fn replica_is_unaffected_by_consumption() {
        let mut body = chunked();
        body.next().await;
        assert_eq!(body.remaining(), 5);

        let replica = body.replica().unwrap();
        assert_eq!(replica.remaining(), 11);
        assert_eq!(body.into_bytes(), Bytes::from_static(b"world"));
        assert_eq!(replica.into_bytes(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn replica_limit_is_shared() {
        let body = Body::from("payload").with_replica_limit(2);

        let first = body.replica().unwrap();
        let _second = first.replica().unwrap();
        let err = body.replica().unwrap_err();

        assert_eq!(err.reason(), "body replica limit reached");
        assert_eq!(first.into_bytes(), Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn from_stream_materializes() {
        let source = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"a")),
            Ok(Bytes::from_static(b"b")),
        ]);
        let body = Body::from_stream(source).await.unwrap();

        assert_eq!(body.into_bytes(), Bytes::from_static(b"ab"));
    }

    #[tokio::test]
    async fn from_stream_surfaces_errors() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"a")),
            Err(std::io::Error::other("connection reset")),
        ]);

        assert!(Body::from_stream(source).await.is_err());
    }

    #[test]
    fn empty_body() {
        let body = Body::default();

        assert!(body.is_empty());
        assert!(body.is_consumed());
        assert_eq!(body.into_bytes(), Bytes::new());
    }
}
