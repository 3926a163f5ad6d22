//! Repositories for the records the attachment pipeline reads and writes

pub mod activity;
pub mod file_set;
pub mod uploaded_file;
pub mod user;
pub mod work;

pub use activity::ActivityRepository;
pub use file_set::FileSetRepository;
pub use uploaded_file::UploadedFileRepository;
pub use user::UserRepository;
pub use work::{merge_ordered_members, WorkRepository};
