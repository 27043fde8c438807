//! Mailbox command protocol
//!
//! Command construction and submission, plus chunked label storage
//! transfers built on top of it.

mod command;
mod label;

pub use command::{Command, CommandState, QueryStatus};
pub use label::{LabelChunk, LabelChunks};
