pub mod paths;
pub mod repo;

pub use paths::{display_relpath, expand_tilde, normalize_relpath};
pub use repo::{FsRepoAccess, RepoAccess};
