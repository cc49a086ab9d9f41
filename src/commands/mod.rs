pub mod downloads;
pub mod history;
pub mod library;
pub mod media;
pub mod settings;
