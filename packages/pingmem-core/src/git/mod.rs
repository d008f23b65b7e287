pub mod history;
pub mod safe_git;

pub use history::GitHistoryReader;
pub use safe_git::{validate_commit_hash, SafeGit, SafeGitConfig};
