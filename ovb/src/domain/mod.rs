//! Core domain types shared by the pipeline stages.

pub mod input;
pub mod job;
pub mod operation;

pub use input::{Attachment, ChatMessage, InputRef, InputSource, ResolvedInput};
pub use job::{Job, JobId, JobRequest, JobState, Requester};
pub use operation::Operation;
