mod http;

pub use http::HttpTransport;

use async_trait::async_trait;

use crate::delivery::RequestHandle;
use crate::error::NotifyError;

/// Source of writable request bodies for webhook POSTs.
///
/// The delivery engine drives every request through the same two suspension
/// points: acquiring the body stream, then awaiting the response once the
/// body is written. Implementations must be `Send + Sync` since one transport
/// serves every in-flight request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open_stream(
        &self,
        request: &RequestHandle,
    ) -> Result<Box<dyn RequestStream>, NotifyError>;
}

/// An open request body.
///
/// Dropping the stream closes it. A stream dropped before
/// [`RequestStream::finish`] must not deliver a partial body.
#[async_trait]
pub trait RequestStream: Send {
    async fn write_all(&mut self, body: &[u8]) -> Result<(), NotifyError>;

    /// Close the body and wait for the response. The response is discarded;
    /// the status code is returned for diagnostics only. Called at most once.
    async fn finish(&mut self) -> Result<u16, NotifyError>;
}
