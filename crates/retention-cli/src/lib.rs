pub mod cmd;
pub mod output;
pub mod root;
pub mod session;
