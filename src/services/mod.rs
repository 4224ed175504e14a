pub mod activity;
pub mod file;
pub mod folder;
pub mod sharing;

pub use activity::ActivityService;
pub use file::FileService;
pub use folder::{FolderLocks, FolderService};
pub use sharing::SharingService;
