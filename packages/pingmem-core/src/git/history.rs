//! GitHistoryReader: commit DAG, per-commit file changes, unified
//! diff hunks, all read via `SafeGit`.

use super::safe_git::SafeGit;
use crate::error::{CoreError, Result};
use crate::model::{ChangeType, Commit, DiffHunk, FileChange, GitHistory};
use chrono::{DateTime, Utc};
use std::sync::OnceLock;

const FIELD_SEP: char = '\u{0001}';
const RECORD_SEP: char = '\u{001e}';

fn log_format() -> String {
    format!(
        "%H{FIELD_SEP}%h{FIELD_SEP}%an{FIELD_SEP}%ae{FIELD_SEP}%aI{FIELD_SEP}%cn{FIELD_SEP}%ce{FIELD_SEP}%cI{FIELD_SEP}%P{FIELD_SEP}%B{RECORD_SEP}"
    )
}

pub struct GitHistoryReader<'a> {
    git: &'a SafeGit,
}

impl<'a> GitHistoryReader<'a> {
    pub fn new(git: &'a SafeGit) -> Self {
        Self { git }
    }

    /// Reads the full commit DAG, file changes and diff hunks for the
    /// repository. Returns an empty history if there is no git root.
    pub fn read_history(&self) -> Result<GitHistory> {
        if self.git.get_git_root().is_none() {
            return Ok(GitHistory::default());
        }

        let commits = self.read_commits()?;
        let mut file_changes = Vec::new();
        let mut diff_hunks = Vec::new();

        for commit in &commits {
            file_changes.extend(self.read_file_changes(&commit.hash)?);
            diff_hunks.extend(self.read_diff_hunks(&commit.hash)?);
        }

        Ok(GitHistory {
            commits,
            file_changes,
            diff_hunks,
        })
    }

    fn read_commits(&self) -> Result<Vec<Commit>> {
        let raw = self.git.log_all(&log_format())?;
        let mut commits = Vec::new();

        for record in raw.split(RECORD_SEP) {
            let record = record.trim_start_matches('\n');
            if record.is_empty() {
                continue;
            }
            let fields: Vec<&str> = record.splitn(9, FIELD_SEP).collect();
            if fields.len() < 9 {
                continue;
            }

            let hash = fields[0].to_string();
            let short_hash = fields[1].to_string();
            let author_name = fields[2].to_string();
            let author_email = fields[3].to_string();
            let author_date = parse_iso(fields[4])?;
            let committer_name = fields[5].to_string();
            let committer_email = fields[6].to_string();
            let committer_date = parse_iso(fields[7])?;
            let rest = fields[8];

            // rest = "<parents>\n<message...>"
            let (parents_str, message) = match rest.split_once('\n') {
                Some((p, m)) => (p, m.trim_end_matches('\n')),
                None => (rest, ""),
            };
            let parent_hashes: Vec<String> = parents_str
                .split_whitespace()
                .map(|s| s.to_string())
                .collect();

            commits.push(Commit {
                hash,
                short_hash,
                author_name,
                author_email,
                author_date,
                committer_name,
                committer_email,
                committer_date,
                message: message.to_string(),
                parent_hashes,
            });
        }

        Ok(commits)
    }

    fn read_file_changes(&self, commit_hash: &str) -> Result<Vec<FileChange>> {
        let raw = self.git.show_name_status(commit_hash)?;
        let mut changes = Vec::new();

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split('\t');
            let status = match parts.next() {
                Some(s) => s,
                None => continue,
            };
            let status_char = status.chars().next().unwrap_or('M');
            let change_type = match ChangeType::from_git_status_char(status_char) {
                Some(c) => c,
                None => continue,
            };

            match change_type {
                ChangeType::R | ChangeType::C => {
                    let old_path = parts.next().map(posix_path);
                    let new_path = parts.next().map(posix_path);
                    if let Some(new_path) = new_path {
                        changes.push(FileChange {
                            commit_hash: commit_hash.to_string(),
                            file_path: new_path,
                            change_type,
                            old_path,
                        });
                    }
                }
                _ => {
                    if let Some(path) = parts.next() {
                        changes.push(FileChange {
                            commit_hash: commit_hash.to_string(),
                            file_path: posix_path(path),
                            change_type,
                            old_path: None,
                        });
                    }
                }
            }
        }

        Ok(changes)
    }

    fn read_diff_hunks(&self, commit_hash: &str) -> Result<Vec<DiffHunk>> {
        let raw = self.git.show_unified_diff(commit_hash)?;
        parse_unified_diff(commit_hash, &raw)
    }
}

fn posix_path(p: &str) -> String {
    p.replace('\\', "/")
}

fn parse_iso(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::parse(format!("invalid commit date '{s}': {e}")))
}

fn hunk_header_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap()
    })
}

/// Parses `git show --unified=3` output into per-file hunks. Detects the
/// current file via `+++ b/<path>` headers and hunk boundaries via
/// `@@ -a,b +c,d @@`; the hunk body is every subsequent line until the
/// next `@@` or `diff --git`.
fn parse_unified_diff(commit_hash: &str, raw: &str) -> Result<Vec<DiffHunk>> {
    let mut hunks = Vec::new();
    let mut current_file: Option<String> = None;
    let mut current_header: Option<(u32, u32, u32, u32)> = None;
    let mut current_body = String::new();

    let flush = |hunks: &mut Vec<DiffHunk>,
                 file: &Option<String>,
                 header: &Option<(u32, u32, u32, u32)>,
                 body: &str| {
        if let (Some(file), Some((old_start, old_lines, new_start, new_lines))) = (file, header) {
            let content = body.trim_end_matches('\n').to_string();
            let hunk_id = DiffHunk::compute_id(commit_hash, file, *new_start, *new_lines);
            hunks.push(DiffHunk {
                hunk_id,
                commit_hash: commit_hash.to_string(),
                file_path: file.clone(),
                old_start: *old_start,
                old_lines: *old_lines,
                new_start: *new_start,
                new_lines: *new_lines,
                content,
            });
        }
    };

    for line in raw.lines() {
        if line.starts_with("diff --git") {
            flush(&mut hunks, &current_file, &current_header, &current_body);
            current_header = None;
            current_body.clear();
            current_file = None;
            continue;
        }
        if let Some(path) = line.strip_prefix("+++ b/") {
            current_file = Some(posix_path(path));
            continue;
        }
        if let Some(caps) = hunk_header_re().captures(line) {
            flush(&mut hunks, &current_file, &current_header, &current_body);
            current_body.clear();

            let old_start: u32 = caps.get(1).unwrap().as_str().parse().unwrap_or(0);
            let old_lines: u32 = caps
                .get(2)
                .map(|m| m.as_str().parse().unwrap_or(1))
                .unwrap_or(1);
            let new_start: u32 = caps.get(3).unwrap().as_str().parse().unwrap_or(0);
            let new_lines: u32 = caps
                .get(4)
                .map(|m| m.as_str().parse().unwrap_or(1))
                .unwrap_or(1);

            current_header = Some((old_start, old_lines, new_start, new_lines));
            continue;
        }
        if current_header.is_some() {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    flush(&mut hunks, &current_file, &current_header, &current_body);

    Ok(hunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_hunk() {
        let diff = "diff --git a/foo.rs b/foo.rs\n\
index 1111111..2222222 100644\n\
--- a/foo.rs\n\
+++ b/foo.rs\n\
@@ -1,3 +1,4 @@\n\
 fn main() {\n\
+    println!(\"hi\");\n\
 }\n\
 \n";
        let hunks = parse_unified_diff("abc1234", diff).unwrap();
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].file_path, "foo.rs");
        assert_eq!(hunks[0].old_start, 1);
        assert_eq!(hunks[0].old_lines, 3);
        assert_eq!(hunks[0].new_start, 1);
        assert_eq!(hunks[0].new_lines, 4);
        assert!(hunks[0].content.contains("println"));
    }

    #[test]
    fn parses_multiple_files_and_hunks() {
        let diff = "diff --git a/a.rs b/a.rs\n\
+++ b/a.rs\n\
@@ -1,1 +1,2 @@\n\
 x\n\
+y\n\
diff --git a/b.rs b/b.rs\n\
+++ b/b.rs\n\
@@ -5,2 +5,1 @@\n\
-z\n\
 w\n";
        let hunks = parse_unified_diff("deadbeef", diff).unwrap();
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].file_path, "a.rs");
        assert_eq!(hunks[1].file_path, "b.rs");
        assert_eq!(hunks[1].old_start, 5);
        assert_eq!(hunks[1].new_lines, 1);
    }

    #[test]
    fn hunk_id_is_deterministic() {
        let id1 = DiffHunk::compute_id("abc", "foo.rs", 1, 4);
        let id2 = DiffHunk::compute_id("abc", "foo.rs", 1, 4);
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 64);
    }
}
