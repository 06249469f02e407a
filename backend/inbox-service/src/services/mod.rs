pub mod conversation_service;
pub mod message_service;
pub mod notifier;
pub mod read_state;
pub mod unread;

pub use conversation_service::ConversationService;
pub use message_service::MessageService;
pub use notifier::{MessageNotifier, TracingNotifier};
pub use read_state::{OpenedConversation, ReadStateEngine};
pub use unread::{
    ArchivedPolicy, ConversationUnread, ReconcileReport, UnreadAggregator, UnreadSource,
    UnreadTotal,
};
