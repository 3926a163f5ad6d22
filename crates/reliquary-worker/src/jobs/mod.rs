pub mod attach_files;

pub use attach_files::{enqueue_attach_files, AttachFilesToWork, AttachOutcome, AttachServices};
