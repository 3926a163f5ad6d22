//! Data models for the attachment pipeline
//!
//! Each sub-module covers one record type; everything is re-exported here for
//! convenient imports.

mod activity;
mod file_set;
mod permission;
mod task;
mod uploaded_file;
mod user;
mod visibility;
mod work;

pub use activity::*;
pub use file_set::*;
pub use permission::*;
pub use task::*;
pub use uploaded_file::*;
pub use user::*;
pub use visibility::*;
pub use work::*;
