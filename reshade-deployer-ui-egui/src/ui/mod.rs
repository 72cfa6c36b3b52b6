pub mod about;
pub mod deploy;
pub mod logs;
pub mod settings;
