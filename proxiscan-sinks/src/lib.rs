pub mod notify;
pub mod settings;
