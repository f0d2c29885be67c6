use parley_transport_traits::ConversationKey;

#[derive(Debug, Clone)]
pub enum AppAction {
    // Conversation lifecycle
    OpenConversation {
        key: ConversationKey,
    },
    CloseConversation,

    // Outgoing
    SendMessage {
        key: ConversationKey,
        message_id: String,
        content: String,
    },
    RetryMessage {
        key: ConversationKey,
        message_id: String,
    },
    CancelMessage {
        key: ConversationKey,
        message_id: String,
    },

    // History
    LoadOlderMessages {
        key: ConversationKey,
    },

    // Transport
    Reconnect,
    Logout,

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes message content).
    pub fn tag(&self) -> &'static str {
        match self {
            // Conversation lifecycle
            AppAction::OpenConversation { .. } => "OpenConversation",
            AppAction::CloseConversation => "CloseConversation",

            // Outgoing
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::CancelMessage { .. } => "CancelMessage",

            // History
            AppAction::LoadOlderMessages { .. } => "LoadOlderMessages",

            // Transport
            AppAction::Reconnect => "Reconnect",
            AppAction::Logout => "Logout",

            // UI
            AppAction::ClearToast => "ClearToast",
        }
    }
}
