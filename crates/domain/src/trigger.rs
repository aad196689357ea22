use courier_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Event type that caused a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookTriggerType {
    /// Bot lifecycle state changed.
    BotStateChange,
    /// New transcript content is available.
    TranscriptUpdate,
    /// New chat messages are available.
    ChatMessagesUpdate,
    /// A participant joined or left.
    ParticipantEventsJoinLeave,
    /// Calendar events were created, updated or removed.
    CalendarEventsUpdate,
    /// Calendar connection state changed.
    CalendarStateChange,
    /// Asynchronous transcription state changed.
    AsyncTranscriptionStateChange,
}

impl WebhookTriggerType {
    /// All trigger types in stable order.
    pub const ALL: [Self; 7] = [
        Self::BotStateChange,
        Self::TranscriptUpdate,
        Self::ChatMessagesUpdate,
        Self::ParticipantEventsJoinLeave,
        Self::CalendarEventsUpdate,
        Self::CalendarStateChange,
        Self::AsyncTranscriptionStateChange,
    ];

    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BotStateChange => "bot_state_change",
            Self::TranscriptUpdate => "transcript_update",
            Self::ChatMessagesUpdate => "chat_messages_update",
            Self::ParticipantEventsJoinLeave => "participant_events_join_leave",
            Self::CalendarEventsUpdate => "calendar_events_update",
            Self::CalendarStateChange => "calendar_state_change",
            Self::AsyncTranscriptionStateChange => "async_transcription_state_change",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        Self::ALL
            .into_iter()
            .find(|trigger| trigger.as_str() == value)
            .ok_or_else(|| {
                AppError::Validation(format!("unknown webhook trigger type '{value}'"))
            })
    }

    /// Returns the public code sent in the `trigger` field of the payload.
    #[must_use]
    pub fn api_code(&self) -> &'static str {
        match self {
            Self::BotStateChange => "bot.state_change",
            Self::TranscriptUpdate => "transcript.update",
            Self::ChatMessagesUpdate => "chat_messages.update",
            Self::ParticipantEventsJoinLeave => "participant_events.join_leave",
            Self::CalendarEventsUpdate => "calendar.events_update",
            Self::CalendarStateChange => "calendar.state_change",
            Self::AsyncTranscriptionStateChange => "async_transcription.state_change",
        }
    }
}
