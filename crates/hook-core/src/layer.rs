//! `tracing` integration: forward log events to the webhook.
//!
//! ```no_run
//! use hook_core::{NotifierConfig, Notifier, NotifyLayer};
//! use tracing_subscriber::prelude::*;
//!
//! # async fn run() -> Result<(), hook_core::NotifyError> {
//! let notifier = Notifier::new(NotifierConfig::new("https://hooks.example.com/services/T/B/x"))?;
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(NotifyLayer::new(notifier))
//!     .init();
//!
//! tracing::error!(job = "nightly-build", "Build failed");
//! # Ok(())
//! # }
//! ```

use std::fmt::{self, Write as _};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::delivery::Notifier;
use crate::payload::{Attachment, Color, View};

/// Events from these targets are never forwarded, so delivery diagnostics
/// and HTTP client logs cannot feed back into delivery.
const IGNORED_TARGETS: &[&str] = &["hook_core", "reqwest", "hyper", "hyper_util", "h2", "rustls"];

const VIEW_WIDTH: u32 = 600;
const VIEW_ROW_HEIGHT: u32 = 24;
const VIEW_PADDING: u32 = 16;

fn view_height(rows: usize) -> u32 {
    u32::try_from(rows)
        .unwrap_or(u32::MAX)
        .saturating_mul(VIEW_ROW_HEIGHT)
        .saturating_add(VIEW_PADDING)
}

/// A [`Layer`] that posts every event at or above `min_level` through a
/// [`Notifier`].
#[derive(Debug, Clone)]
pub struct NotifyLayer {
    notifier: Notifier,
    min_level: Level,
    proxy: String,
}

impl NotifyLayer {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            notifier,
            min_level: Level::ERROR,
            proxy: String::new(),
        }
    }

    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = proxy.into();
        self
    }

    fn accepts(&self, level: &Level, target: &str) -> bool {
        // More verbose levels compare greater.
        *level <= self.min_level && !is_ignored(target)
    }
}

impl<S: Subscriber> Layer<S> for NotifyLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if !self.accepts(meta.level(), meta.target()) {
            return;
        }

        let mut fields = EventFields::default();
        event.record(&mut fields);

        let (text, attachment) = fields.into_message(*meta.level(), meta.target());
        self.notifier.post_message(text, &self.proxy, vec![attachment]);
    }
}

fn is_ignored(target: &str) -> bool {
    IGNORED_TARGETS.iter().any(|ignored| {
        target == *ignored
            || target
                .strip_prefix(ignored)
                .is_some_and(|rest| rest.starts_with("::"))
    })
}

pub fn level_color(level: Level) -> Color {
    match level {
        Level::ERROR => Color::Danger,
        Level::WARN => Color::Warning,
        _ => Color::Good,
    }
}

#[derive(Debug, Default)]
struct EventFields {
    message: Option<String>,
    extra: Vec<(&'static str, String)>,
}

impl EventFields {
    fn into_message(self, level: Level, target: &str) -> (String, Attachment) {
        let text = match self.message {
            Some(message) if !message.is_empty() => message,
            _ => format!("{} event from {}", level, target),
        };

        let mut attachment = Attachment::new()
            .with_title(target)
            .with_color(level_color(level));

        if !self.extra.is_empty() {
            let mut html = String::from("<table>");
            for (name, value) in &self.extra {
                let _ = write!(
                    html,
                    "<tr><th>{}</th><td>{}</td></tr>",
                    escape_html(name),
                    escape_html(value)
                );
            }
            html.push_str("</table>");
            attachment =
                attachment.with_view(View::html(html, VIEW_WIDTH, view_height(self.extra.len())));
        }

        (text, attachment)
    }

    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.extra.push((field.name(), value));
        }
    }
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{:?}", value));
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
