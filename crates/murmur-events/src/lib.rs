//! Event catalogue for the murmur log.
//!
//! # What this crate is
//! The typed vocabulary of the system: every fact that can be appended to
//! the log, the stable wire name each fact is published under, and the rule
//! that derives a record's partition key. Producers (the command layer) and
//! consumers (the projection router) both depend on this crate so that the
//! wire contract lives in exactly one place.
//!
//! # Ordering contract
//! The partition key of every event is the decimal string form of its chat
//! id. Records with equal keys land on the same partition, so the log
//! preserves total order *per chat* across all event types. No cross-chat
//! ordering exists and nothing downstream may rely on one.
//!
//! # Wire shape
//! Record value is the event body as camelCase JSON; the event name and the
//! command-layer timestamp travel in record headers (see [`headers`]). The
//! export/import line format wrapping a raw record is in [`envelope`].

mod envelope;
mod event;

pub mod headers {
    //! Record header keys shared by publisher, router, and export/import.

    /// Event name header, e.g. `ChatCreated`.
    pub const NAME: &str = "name";
    /// RFC 3339 command-layer timestamp.
    pub const CREATED_AT: &str = "created_at";
}

pub use envelope::{ExportedRecord, RecordMetadata};
pub use event::{
    AdditionalData, ChatCommonAction, ChatCreated, ChatDeleted, ChatEdited, ChatPinned,
    ChatViewRefreshed, Event, EventDecodeError, LastMessageAction, MessageBlogPostMade,
    MessageCreated, MessageDeleted, MessageEdited, MessageReaded, ParticipantDeleted,
    ParticipantsAction, ParticipantsAdded, UnreadMessagesAction,
};
