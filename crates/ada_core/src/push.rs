//! Inbound push payload routing.
//!
//! Server push payloads carry a `type` discriminator; each type maps to a
//! notification channel (or, for consciousness updates, to an app state
//! broadcast instead of a user-visible notification).

use async_trait::async_trait;
use serde::Deserialize;

/// Raw push payload as delivered by the server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub task_name: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub emotional_state: Option<String>,
}

/// Notification channel, by urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Main,
    Urgent,
    Voice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub channel: Channel,
}

/// Where routed notifications are presented. The CLI prints them; a
/// platform frontend would hand them to its notification service.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Outcome of routing one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedPush {
    Notify(Notification),
    Consciousness {
        state: String,
        emotional_state: String,
    },
}

impl PushPayload {
    fn text(&self) -> String {
        self.body
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_default()
    }

    fn channel_for_priority(&self) -> Channel {
        match self.priority.as_deref() {
            Some("high") | Some("urgent") => Channel::Urgent,
            Some("voice") => Channel::Voice,
            _ => Channel::Main,
        }
    }
}

/// Map a payload to its presentation.
pub fn route(payload: &PushPayload) -> RoutedPush {
    match payload.kind.as_str() {
        "voice_message" => RoutedPush::Notify(Notification {
            title: payload
                .title
                .clone()
                .unwrap_or_else(|| "Voice message from A.D.A.".to_string()),
            body: payload
                .message
                .clone()
                .unwrap_or_else(|| "A.D.A. has sent you a voice message".to_string()),
            channel: Channel::Voice,
        }),
        "consciousness_update" => RoutedPush::Consciousness {
            state: payload.state.clone().unwrap_or_else(|| "unknown".to_string()),
            emotional_state: payload.emotional_state.clone().unwrap_or_default(),
        },
        "task_complete" => {
            let task_name = payload
                .task_name
                .clone()
                .unwrap_or_else(|| "Task".to_string());
            let result = payload
                .result
                .clone()
                .unwrap_or_else(|| "completed".to_string());
            RoutedPush::Notify(Notification {
                title: format!("{task_name} complete"),
                body: format!("A.D.A. has completed: {result}"),
                channel: Channel::Main,
            })
        }
        "alert" => RoutedPush::Notify(Notification {
            title: payload.title.clone().unwrap_or_else(|| "A.D.A.".to_string()),
            body: payload.text(),
            channel: Channel::Urgent,
        }),
        _ => RoutedPush::Notify(Notification {
            title: payload.title.clone().unwrap_or_else(|| "A.D.A.".to_string()),
            body: payload.text(),
            channel: payload.channel_for_priority(),
        }),
    }
}

/// Route a payload and present it when it maps to a notification.
/// Returns the consciousness update, if the payload carried one, so the
/// caller can publish it to observers.
pub async fn deliver(
    payload: &PushPayload,
    sink: &dyn NotificationSink,
) -> anyhow::Result<Option<(String, String)>> {
    match route(payload) {
        RoutedPush::Notify(notification) => {
            log::debug!(
                "push: {} -> {:?} channel",
                payload.kind,
                notification.channel
            );
            sink.show(notification).await?;
            Ok(None)
        }
        RoutedPush::Consciousness {
            state,
            emotional_state,
        } => {
            log::debug!("push: consciousness update state={state}");
            Ok(Some((state, emotional_state)))
        }
    }
}
