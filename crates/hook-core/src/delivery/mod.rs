//! Fire-and-forget webhook delivery.
//!
//! [`Notifier::post_message`] serializes the payload on the caller's thread,
//! registers a [`RequestHandle`] with the [`RequestTracker`] and returns. The
//! POST itself runs on the tokio runtime captured when the notifier was built:
//! open the body stream, write it, await the response. Whichever way that
//! ends, the handle takes exactly one terminal transition and leaves the
//! tracker. Failures are logged and passed to the optional failure hook; they
//! never reach the caller.

mod handle;
mod state;
mod tracker;

pub use handle::RequestHandle;
pub use state::RequestState;
pub use tracker::RequestTracker;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{parse_proxy, NotifierConfig};
use crate::error::{DeliveryFailure, FailureHook, NotifyError};
use crate::payload::{codec, Attachment, Payload};
use crate::transport::{HttpTransport, Transport};

/// Cheap to clone; clones share the transport, tracker and failure hook.
#[derive(Clone)]
pub struct Notifier {
    config: NotifierConfig,
    endpoint: Url,
    transport: Arc<dyn Transport>,
    tracker: RequestTracker,
    failure_hook: Option<FailureHook>,
    runtime: Handle,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("endpoint", &self.endpoint.as_str())
            .field("enabled", &self.config.enabled)
            .field("in_flight", &self.tracker.len())
            .field("failure_hook", &self.failure_hook.is_some())
            .finish()
    }
}

impl Notifier {
    /// Build a notifier posting over HTTP. Must be called inside a tokio
    /// runtime unless [`Notifier::with_transport_on`] is used instead.
    pub fn new(config: NotifierConfig) -> Result<Self, NotifyError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    pub fn with_transport(
        config: NotifierConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, NotifyError> {
        let runtime = Handle::try_current()
            .map_err(|e| NotifyError::config("runtime", "tokio::runtime::Handle", e))?;
        Self::with_transport_on(config, transport, runtime)
    }

    pub fn with_transport_on(
        config: NotifierConfig,
        transport: Arc<dyn Transport>,
        runtime: Handle,
    ) -> Result<Self, NotifyError> {
        let endpoint = config.endpoint_url()?;
        Ok(Self {
            config,
            endpoint,
            transport,
            tracker: RequestTracker::new(),
            failure_hook: None,
            runtime,
        })
    }

    pub fn with_failure_hook(
        mut self,
        hook: impl Fn(&DeliveryFailure) + Send + Sync + 'static,
    ) -> Self {
        self.failure_hook = Some(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every submitted request has settled, or `timeout` elapses.
    /// Returns true if the tracker drained.
    pub async fn flush(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.tracker.wait_idle())
            .await
            .is_ok()
    }

    /// Send `text` with `attachments` to the configured webhook.
    ///
    /// Returns as soon as the request is submitted. An empty `proxy_address`
    /// connects directly.
    pub fn post_message(
        &self,
        text: impl Into<String>,
        proxy_address: &str,
        attachments: Vec<Attachment>,
    ) {
        let payload = Payload::new(text).with_attachments(attachments);
        self.post_payload(&payload, proxy_address);
    }

    /// Like [`Notifier::post_message`] for an already assembled payload.
    pub fn post_payload(&self, payload: &Payload, proxy_address: &str) {
        if !self.config.enabled {
            debug!(endpoint = %self.endpoint, "Notifications disabled, dropping message");
            return;
        }

        let body = match codec::encode(payload) {
            Ok(body) => body,
            Err(e) => {
                self.report(None, RequestState::Created, e);
                return;
            }
        };

        let proxy = match parse_proxy(proxy_address) {
            Ok(proxy) => proxy,
            Err(e) => {
                self.report(None, RequestState::Created, e);
                return;
            }
        };

        let handle = Arc::new(RequestHandle::new(self.endpoint.clone(), proxy, body));
        if let Err(e) = self.tracker.register(Arc::clone(&handle)) {
            self.fail(&handle, e);
            return;
        }

        debug!(
            request_id = %handle.id(),
            endpoint = %self.endpoint,
            proxy = handle.proxy().map(Url::as_str),
            bytes = handle.body().len(),
            "Webhook request registered"
        );

        let task = DeliveryTask {
            notifier: self.clone(),
            handle,
            settled: false,
        };
        self.runtime.spawn(task.run());
    }

    async fn drive(&self, handle: &RequestHandle) {
        let outcome = AssertUnwindSafe(self.exchange(handle))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(status)) => self.complete(handle, status),
            Ok(Err(e)) => self.fail(handle, e),
            Err(_) => {
                let stage = handle.state();
                self.fail(handle, NotifyError::transport(stage, "delivery task panicked"));
            }
        }
    }

    async fn exchange(&self, handle: &RequestHandle) -> Result<u16, NotifyError> {
        let mut stream = self.transport.open_stream(handle).await?;
        handle.advance(RequestState::StreamOpen)?;

        stream.write_all(handle.body()).await?;
        handle.advance(RequestState::BodyWritten)?;

        handle.advance(RequestState::AwaitingResponse)?;
        stream.finish().await
    }

    fn complete(&self, handle: &RequestHandle, status: u16) {
        let completed = handle.complete();
        self.tracker.deregister(&handle.id());
        if completed {
            debug!(
                request_id = %handle.id(),
                status,
                elapsed_ms = handle.elapsed_ms(),
                "Webhook delivered"
            );
        } else {
            debug!(request_id = %handle.id(), state = %handle.state(), "Ignoring late completion");
        }
    }

    fn fail(&self, handle: &RequestHandle, error: NotifyError) {
        let failed_from = handle.fail();
        self.tracker.deregister(&handle.id());
        if let Some(stage) = failed_from {
            self.report(Some(handle.id()), stage, error);
        }
    }

    fn report(&self, request_id: Option<Uuid>, stage: RequestState, error: NotifyError) {
        warn!(
            request_id = ?request_id,
            endpoint = %self.endpoint,
            %stage,
            error = %error,
            "Webhook delivery failed"
        );
        if let Some(hook) = &self.failure_hook {
            hook(&DeliveryFailure {
                request_id,
                stage,
                error,
            });
        }
    }
}

/// One spawned delivery. If the runtime drops it before it settles (the
/// runtime was already shut down, or shut down mid-request) the handle is
/// failed on drop so it still leaves the tracker.
struct DeliveryTask {
    notifier: Notifier,
    handle: Arc<RequestHandle>,
    settled: bool,
}

impl DeliveryTask {
    async fn run(mut self) {
        self.notifier.drive(&self.handle).await;
        self.settled = true;
    }
}

impl Drop for DeliveryTask {
    fn drop(&mut self) {
        if !self.settled {
            let stage = self.handle.state();
            self.notifier.fail(
                &self.handle,
                NotifyError::transport(stage, "delivery task cancelled"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::payload::Color;
    use crate::transport::RequestStream;

    /// Records every body and answers with a fixed status.
    #[derive(Default)]
    struct MemoryTransport {
        bodies: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    struct MemoryStream {
        buf: Vec<u8>,
        bodies: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn open_stream(
            &self,
            _request: &RequestHandle,
        ) -> Result<Box<dyn RequestStream>, NotifyError> {
            Ok(Box::new(MemoryStream {
                buf: Vec::new(),
                bodies: Arc::clone(&self.bodies),
            }))
        }
    }

    #[async_trait]
    impl RequestStream for MemoryStream {
        async fn write_all(&mut self, body: &[u8]) -> Result<(), NotifyError> {
            self.buf.extend_from_slice(body);
            Ok(())
        }

        async fn finish(&mut self) -> Result<u16, NotifyError> {
            self.bodies.lock().unwrap().push(std::mem::take(&mut self.buf));
            Ok(500)
        }
    }

    fn notifier(transport: Arc<dyn Transport>) -> Notifier {
        Notifier::with_transport(NotifierConfig::new("http://hooks.test/services/x"), transport)
            .unwrap()
    }

    #[tokio::test]
    async fn any_response_counts_as_delivered() {
        let transport = Arc::new(MemoryTransport::default());
        let bodies = Arc::clone(&transport.bodies);
        let failures = Arc::new(AtomicUsize::new(0));
        let n = notifier(transport).with_failure_hook({
            let failures = Arc::clone(&failures);
            move |_| {
                failures.fetch_add(1, Ordering::SeqCst);
            }
        });

        n.post_message(
            "Build failed",
            "",
            vec![Attachment::new().with_title("Error").with_color(Color::Danger)],
        );
        assert!(n.flush(Duration::from_secs(1)).await);

        let bodies = bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(
            bodies[0],
            br#"{"text":"Build failed","attachments":[{"title":"Error","color":"danger"}]}"#
        );
        assert_eq!(failures.load(Ordering::SeqCst), 0);
        assert_eq!(n.in_flight(), 0);
    }

    #[tokio::test]
    async fn disabled_notifier_sends_nothing() {
        let transport = Arc::new(MemoryTransport::default());
        let bodies = Arc::clone(&transport.bodies);
        let n = Notifier::with_transport(
            NotifierConfig::new("http://hooks.test/x").with_enabled(false),
            transport,
        )
        .unwrap();

        n.post_message("quiet", "", vec![]);
        assert_eq!(n.in_flight(), 0);
        assert!(n.flush(Duration::from_millis(50)).await);
        assert!(bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_proxy_is_reported_without_registering() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let n = notifier(Arc::new(MemoryTransport::default())).with_failure_hook({
            let failures = Arc::clone(&failures);
            move |f: &DeliveryFailure| failures.lock().unwrap().push(f.clone())
        });

        n.post_message("hi", "http://", vec![]);
        assert_eq!(n.in_flight(), 0);

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].request_id, None);
        assert_eq!(failures[0].stage, RequestState::Created);
        assert!(matches!(
            failures[0].error,
            NotifyError::Config { field: "proxy address", .. }
        ));
    }

    #[tokio::test]
    async fn failure_then_late_completion_settles_once() {
        let reports = Arc::new(AtomicUsize::new(0));
        let n = notifier(Arc::new(MemoryTransport::default())).with_failure_hook({
            let reports = Arc::clone(&reports);
            move |_| {
                reports.fetch_add(1, Ordering::SeqCst);
            }
        });

        let handle = Arc::new(RequestHandle::new(n.endpoint().clone(), None, b"{}".to_vec()));
        n.tracker().register(Arc::clone(&handle)).unwrap();

        n.fail(&handle, NotifyError::transport(RequestState::Registered, "refused"));
        n.complete(&handle, 200);
        n.fail(&handle, NotifyError::transport(RequestState::Registered, "again"));

        assert_eq!(handle.state(), RequestState::Failed);
        assert_eq!(reports.load(Ordering::SeqCst), 1);
        assert!(n.tracker().is_empty());
    }

    #[test]
    fn construction_outside_runtime_is_config_error() {
        let err = notifier_result_outside_runtime().unwrap_err();
        assert!(matches!(err, NotifyError::Config { field: "runtime", .. }), "{err}");
    }

    fn notifier_result_outside_runtime() -> Result<Notifier, NotifyError> {
        Notifier::with_transport(
            NotifierConfig::new("http://hooks.test/x"),
            Arc::new(MemoryTransport::default()),
        )
    }

    #[tokio::test]
    async fn malformed_endpoint_is_rejected() {
        let err = Notifier::with_transport(
            NotifierConfig::new("hooks.test/no-scheme"),
            Arc::new(MemoryTransport::default()),
        )
        .unwrap_err();
        assert!(matches!(err, NotifyError::Config { field: "webhook URL", .. }));
    }
}
