pub mod cache;
pub mod dispatch;
pub mod install;
pub mod list;
pub mod profile;
pub mod remove;
pub mod status;
pub mod use_version;
