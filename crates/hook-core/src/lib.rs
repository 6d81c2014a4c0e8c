#![forbid(unsafe_code)]

pub mod config;
pub mod delivery;
pub mod error;
pub mod layer;
pub mod payload;
pub mod transport;

pub use config::{parse_proxy, NotifierConfig};
pub use delivery::{Notifier, RequestHandle, RequestState, RequestTracker};
pub use error::{DeliveryFailure, FailureHook, NotifyError};
pub use layer::NotifyLayer;
pub use payload::codec::{decode, encode};
pub use payload::{Attachment, Color, Html, Payload, View};
pub use transport::{HttpTransport, RequestStream, Transport};
