pub mod add;
pub mod auth_cmd;
pub mod common;
pub mod config;
pub mod delete;
pub mod done;
pub mod due;
pub mod edit;
pub mod list;
pub mod remind;
pub mod status;
pub mod sync;
pub mod watch;
