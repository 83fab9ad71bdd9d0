use serde::Serialize;

/// Structured trace events emitted across all Hookline crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        user_id: String,
    },
    SessionTransition {
        user_id: String,
        generation: u64,
        from: String,
        to: String,
    },
    StoreReset {
        user_id: String,
        reason: String,
    },
    MessageIngested {
        user_id: String,
        message_id: String,
        direction: String,
        is_group: bool,
    },
    WebhookDelivered {
        user_id: String,
        webhook_id: String,
        status: u16,
        duration_ms: u64,
    },
    WebhookFailed {
        user_id: String,
        webhook_id: String,
        error: String,
    },
    GroupsRefreshed {
        user_id: String,
        count: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "hl_event");
    }
}
