pub mod conversation;
pub mod message;

pub use conversation::{normalize_participants, participant_key, Conversation, NewConversation};
pub use message::{Attachment, InsertOutcome, MarkReadOutcome, Message, NewMessage};
