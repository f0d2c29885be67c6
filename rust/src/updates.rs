use parley_transport_traits::{
    ConversationKey, HistoryPage, PageQuery, Profile, StreamEvent,
};

use crate::error::SyncError;
use crate::state::AppState;
use crate::AppAction;

#[derive(Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    MessageFailed {
        rev: u64,
        key: ConversationKey,
        message_id: String,
        reason: String,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::MessageFailed { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Async results
    PageFetched {
        key: ConversationKey,
        epoch: u64,
        query: PageQuery,
        result: Result<HistoryPage, SyncError>,
    },
    SendCompleted {
        key: ConversationKey,
        message_id: String,
        // Queue attempt the send was issued for; older attempts are stale.
        attempt: u32,
        result: Result<String, SyncError>,
    },
    ProfileResolved {
        key: ConversationKey,
        epoch: u64,
        profile: Option<Profile>,
    },

    // Live stream, tagged with the subscription token it was delivered on.
    StreamDelivered {
        key: ConversationKey,
        token: u64,
        event: StreamEvent,
    },

    // Timers
    PendingSweep,
}
