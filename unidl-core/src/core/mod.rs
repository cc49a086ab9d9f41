pub mod events;
pub mod format;
pub mod queue;
pub mod timecode;
