//! Actors driving the two phases of an attachment job

mod file_set;
mod ordered_members;

pub use file_set::FileSetActor;
pub use ordered_members::{ActivityStreamCallback, AttachmentCallback, OrderedMembersActor};
