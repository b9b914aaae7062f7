pub mod category;
pub mod config;
pub mod disposition;
pub mod event;
pub mod folder;
pub mod hold;
pub mod init;
pub mod node;
pub mod prop;
pub mod record;
pub mod schedule;
pub mod security;
pub mod vital;
