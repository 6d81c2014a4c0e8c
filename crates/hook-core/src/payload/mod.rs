//! Wire model for incoming-webhook messages.
//!
//! Field names on the wire are fixed by the receiving webhook; the serde
//! attributes here are the single place that mapping lives. Optional fields
//! are omitted rather than sent as `null`.

pub mod codec;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub text: String,
    /// Omitted from the JSON body when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Payload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// A rich-content block rendered below the message text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(rename = "views", default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
}

impl Attachment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.color.is_none() && self.view.is_none()
    }
}

/// Attachment accent color: a semantic token or a `#rgb`/`#rrggbb` hex value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Color {
    Good,
    Warning,
    Danger,
    Hex(String),
}

impl Color {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Good => "good",
            Self::Warning => "warning",
            Self::Danger => "danger",
            Self::Hex(hex) => hex,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "good" => Ok(Self::Good),
            "warning" => Ok(Self::Warning),
            "danger" => Ok(Self::Danger),
            hex if is_hex_color(hex) => Ok(Self::Hex(hex.to_ascii_lowercase())),
            other => Err(NotifyError::config(
                "color",
                other,
                "expected good, warning, danger or a #rgb/#rrggbb hex color",
            )),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = NotifyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        match color {
            Color::Hex(hex) => hex,
            other => other.as_str().to_string(),
        }
    }
}

fn is_hex_color(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(digits) => {
            matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// Renderable content attached to a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub html: Html,
}

impl View {
    pub fn html(inline: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            html: Html {
                inline: inline.into(),
                width,
                height,
            },
        }
    }
}

/// Raw markup plus its display size in pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Html {
    pub inline: String,
    pub width: u32,
    pub height: u32,
}
