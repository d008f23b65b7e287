//! SafeGit: all git invocations go through here.
//!
//! Uses an `execFile`-style API (`std::process::Command` with an argument
//! vector, never a shell string) and validates every commit-hash argument
//! before spawning a process.

use crate::error::{CoreError, Result};
use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

fn commit_hash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-f0-9]{7,40}$").unwrap())
}

/// Validate a commit-hash-shaped argument against `^[a-f0-9]{7,40}$`
/// before it is ever allowed to reach a subprocess.
pub fn validate_commit_hash(hash: &str) -> Result<()> {
    if commit_hash_re().is_match(hash) {
        Ok(())
    } else {
        Err(CoreError::invalid_argument(format!(
            "commit hash does not match ^[a-f0-9]{{7,40}}$: {hash}"
        )))
    }
}

#[derive(Debug, Clone)]
pub struct SafeGitConfig {
    /// Cap on bytes read from a single subprocess's stdout, for `git show
    /// --unified` diffs.
    pub max_buffer_diff: usize,
    /// Cap on bytes read from a single subprocess's stdout, for `git log`.
    pub max_buffer_log: usize,
}

impl Default for SafeGitConfig {
    fn default() -> Self {
        Self {
            max_buffer_diff: 50 * 1024 * 1024,
            max_buffer_log: 100 * 1024 * 1024,
        }
    }
}

/// Thin, validated wrapper over the `git` CLI. Never builds a shell
/// string; arguments are always passed as a vector.
pub struct SafeGit {
    repo_path: PathBuf,
    config: SafeGitConfig,
}

impl SafeGit {
    pub fn new(repo_path: impl AsRef<Path>, config: SafeGitConfig) -> Self {
        Self {
            repo_path: repo_path.as_ref().to_path_buf(),
            config,
        }
    }

    /// Returns the repo's top-level directory, or `None` if `repo_path`
    /// is not inside a git work tree.
    pub fn get_git_root(&self) -> Option<PathBuf> {
        let out = self.run(&["rev-parse", "--show-toplevel"], self.config.max_buffer_log).ok()?;
        let trimmed = out.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }

    /// Returns `remote.origin.url` if configured.
    pub fn get_remote_origin_url(&self) -> Option<String> {
        let out = self
            .run(&["config", "--get", "remote.origin.url"], self.config.max_buffer_log)
            .ok()?;
        let trimmed = out.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// `git log --all --topo-order --format=...`, capped at
    /// `max_buffer_log` bytes.
    pub fn log_all(&self, format: &str) -> Result<String> {
        self.run(
            &["log", "--all", "--topo-order", &format!("--format={format}")],
            self.config.max_buffer_log,
        )
    }

    /// `git show --name-status --format= <hash>`, validating `hash` first.
    pub fn show_name_status(&self, hash: &str) -> Result<String> {
        validate_commit_hash(hash)?;
        self.run(
            &["show", "--name-status", "--format=", hash],
            self.config.max_buffer_log,
        )
    }

    /// `git show --unified=3 <hash>`, validating `hash` first, capped at
    /// `max_buffer_diff` bytes.
    pub fn show_unified_diff(&self, hash: &str) -> Result<String> {
        validate_commit_hash(hash)?;
        self.run(
            &["show", "--unified=3", "--format=", hash],
            self.config.max_buffer_diff,
        )
    }

    fn run(&self, args: &[&str], max_buffer: usize) -> Result<String> {
        let mut child = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CoreError::GitCommandFailed(format!("spawn failed: {e}")))?;

        let mut stdout = child.stdout.take().expect("stdout piped");
        let mut buf = Vec::new();
        let mut limited = (&mut stdout).take(max_buffer as u64 + 1);
        limited
            .read_to_end(&mut buf)
            .map_err(|e| CoreError::GitCommandFailed(format!("read failed: {e}")))?;

        if buf.len() > max_buffer {
            // Drain and kill to avoid a blocked child on a full pipe.
            let _ = child.kill();
            let _ = child.wait();
            return Err(CoreError::LimitExceeded(format!(
                "git output exceeded max buffer of {max_buffer} bytes"
            )));
        }

        let status = child
            .wait()
            .map_err(|e| CoreError::GitCommandFailed(format!("wait failed: {e}")))?;

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut se) = child.stderr.take() {
                let _ = se.read_to_string(&mut stderr);
            }
            return Err(CoreError::GitCommandFailed(stderr));
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_hashes() {
        assert!(validate_commit_hash("abc1234").is_ok());
        assert!(validate_commit_hash(&"a".repeat(40)).is_ok());
    }

    #[test]
    fn rejects_short_hash() {
        assert!(validate_commit_hash("abc12").is_err());
    }

    #[test]
    fn rejects_too_long_hash() {
        assert!(validate_commit_hash(&"a".repeat(41)).is_err());
    }

    #[test]
    fn rejects_uppercase() {
        assert!(validate_commit_hash("ABC1234").is_err());
    }

    #[test]
    fn rejects_shell_metacharacters() {
        assert!(validate_commit_hash("abc1234; rm -rf /").is_err());
        assert!(validate_commit_hash("$(whoami)").is_err());
        assert!(validate_commit_hash("abc1234 && echo hi").is_err());
    }

    #[test]
    fn get_git_root_none_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let git = SafeGit::new(dir.path(), SafeGitConfig::default());
        assert!(git.get_git_root().is_none());
    }
}
