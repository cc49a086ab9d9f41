pub mod history;
pub mod job;
pub mod media;
pub mod message;
pub mod settings;
