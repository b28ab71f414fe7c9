use serde::{Deserialize, Serialize};

/// Envelope exchanged over the viewer connection in both directions:
/// `{ "type": <eventType>, "data": <payload> }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    ViewerConnected(ViewerPresence),
    ViewerDisconnected(ViewerPresence),
    ContentChanged(ContentChange),
    Error(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ViewerPresence {
    pub name: String,
}

/// Line-level edit carried by a `CONTENT_CHANGED` event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentChange {
    #[serde(rename_all = "camelCase")]
    LineAdded {
        line_index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor_position: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    LineRemoved {
        line_index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor_position: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    LineChanged {
        line_index: usize,
        changed_content: String,
    },
    #[serde(rename_all = "camelCase")]
    TitleChanged { changed_content: String },
}

impl WsEvent {
    pub fn viewer_connected(name: &str) -> Self {
        WsEvent::ViewerConnected(ViewerPresence { name: name.to_string() })
    }

    pub fn viewer_disconnected(name: &str) -> Self {
        WsEvent::ViewerDisconnected(ViewerPresence { name: name.to_string() })
    }

    pub fn error(message: impl Into<String>) -> Self {
        WsEvent::Error(message.into())
    }

    pub fn to_text(&self) -> String {
        // Every variant is a plain string/struct payload, serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
