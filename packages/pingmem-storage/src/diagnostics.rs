//! DiagnosticsStore: normalize findings (direct or parsed SARIF)
//! into a content-addressed `analysisId`, persist runs/findings, and
//! diff two analyses.

use crate::error::{Result, StorageError};
use chrono::{DateTime, Utc};
use pingmem_core::hashing::sha256_joined;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Note,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Note => "note",
        }
    }

    /// SARIF `level` normalization: `error/warning/note` pass through,
    /// everything else (including absent) becomes `info`.
    fn from_sarif_level(level: Option<&str>) -> Self {
        match level {
            Some("error") => Severity::Error,
            Some("warning") => Severity::Warning,
            Some("note") => Severity::Note,
            _ => Severity::Info,
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            "note" => Severity::Note,
            _ => Severity::Info,
        }
    }
}

/// A finding before an `analysisId` exists — the shape callers supply
/// directly, or that SARIF parsing produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingInput {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub file_path: String,
    pub start_line: Option<u32>,
    pub start_column: Option<u32>,
    pub end_line: Option<u32>,
    pub end_column: Option<u32>,
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// A finding's `findingId` depends on the final `analysisId` of the run it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedFinding {
    pub finding_id: String,
    pub analysis_id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub file_path: String,
    pub start_line: Option<u32>,
    pub start_column: Option<u32>,
    pub end_line: Option<u32>,
    pub end_column: Option<u32>,
    pub fingerprint: Option<String>,
    pub properties: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRun {
    pub analysis_id: String,
    pub project_id: String,
    pub tree_hash: String,
    pub tool_name: Option<String>,
    pub tool_version: Option<String>,
    pub config_hash: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct GetLatestRunOptions {
    pub project_id: String,
    pub tool_name: Option<String>,
    pub tool_version: Option<String>,
    pub tree_hash: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisDiff {
    pub introduced: Vec<String>,
    pub resolved: Vec<String>,
    pub unchanged: Vec<String>,
}

fn normalize(mut f: FindingInput) -> FindingInput {
    let trimmed = f.rule_id.trim();
    f.rule_id = if trimmed.is_empty() { "unknown".to_string() } else { trimmed.to_string() };
    f.file_path = f.file_path.replace('\\', "/");
    f.message = f.message.split_whitespace().collect::<Vec<_>>().join(" ");
    f
}

/// `(filePath, startLine, startColumn, endLine, endColumn, ruleId,
/// severity, message, fingerprint)`.
fn sort_key_parts(f: &FindingInput) -> Vec<String> {
    vec![
        f.file_path.clone(),
        f.start_line.map(|n| n.to_string()).unwrap_or_default(),
        f.start_column.map(|n| n.to_string()).unwrap_or_default(),
        f.end_line.map(|n| n.to_string()).unwrap_or_default(),
        f.end_column.map(|n| n.to_string()).unwrap_or_default(),
        f.rule_id.clone(),
        f.severity.as_str().to_string(),
        f.message.clone(),
        f.fingerprint.clone().unwrap_or_default(),
    ]
}

fn sort_key_tuple(f: &FindingInput) -> (String, Option<u32>, Option<u32>, Option<u32>, Option<u32>, String, &'static str, String, Option<String>) {
    (
        f.file_path.clone(),
        f.start_line,
        f.start_column,
        f.end_line,
        f.end_column,
        f.rule_id.clone(),
        f.severity.as_str(),
        f.message.clone(),
        f.fingerprint.clone(),
    )
}

/// `findingsDigest = SHA256(sortedKeys)`, `analysisId = SHA256(projectId
/// ‖ treeHash ‖ toolName ‖ toolVersion ‖ configHash ‖ findingsDigest)`.
pub fn compute_analysis_id(
    project_id: &str,
    tree_hash: &str,
    tool_name: Option<&str>,
    tool_version: Option<&str>,
    config_hash: &str,
    findings: &[FindingInput],
) -> (String, String) {
    let mut sorted: Vec<&FindingInput> = findings.iter().collect();
    sorted.sort_by(|a, b| sort_key_tuple(a).cmp(&sort_key_tuple(b)));

    let mut parts: Vec<String> = Vec::with_capacity(sorted.len() * 9);
    for f in &sorted {
        parts.extend(sort_key_parts(f));
    }
    let findings_digest = sha256_joined(parts.iter().map(|s| s.as_str()));

    let analysis_id = sha256_joined([
        project_id,
        tree_hash,
        tool_name.unwrap_or(""),
        tool_version.unwrap_or(""),
        config_hash,
        findings_digest.as_str(),
    ]);

    (analysis_id, findings_digest)
}

/// Normalizes raw inputs, computes `analysisId`, then stamps each
/// finding's `findingId` from that final `analysisId`.
pub fn normalize_findings(
    project_id: &str,
    tree_hash: &str,
    tool_name: Option<&str>,
    tool_version: Option<&str>,
    config_hash: &str,
    raw: Vec<FindingInput>,
) -> (String, Vec<NormalizedFinding>) {
    let normalized: Vec<FindingInput> = raw.into_iter().map(normalize).collect();
    let (analysis_id, _digest) = compute_analysis_id(project_id, tree_hash, tool_name, tool_version, config_hash, &normalized);

    let findings = normalized
        .into_iter()
        .map(|f| {
            let sort_key = sort_key_parts(&f).join("\u{0001}");
            let finding_id = sha256_joined([analysis_id.as_str(), sort_key.as_str()]);
            NormalizedFinding {
                finding_id,
                analysis_id: analysis_id.clone(),
                rule_id: f.rule_id,
                severity: f.severity,
                message: f.message,
                file_path: f.file_path,
                start_line: f.start_line,
                start_column: f.start_column,
                end_line: f.end_line,
                end_column: f.end_column,
                fingerprint: f.fingerprint,
                properties: f.properties,
            }
        })
        .collect();

    (analysis_id, findings)
}

#[derive(Debug, Deserialize)]
struct SarifDocument {
    #[serde(default)]
    runs: Vec<SarifRun>,
}

#[derive(Debug, Deserialize)]
struct SarifRun {
    tool: SarifTool,
    #[serde(default)]
    results: Vec<SarifResult>,
}

#[derive(Debug, Deserialize)]
struct SarifTool {
    driver: SarifDriver,
}

#[derive(Debug, Deserialize)]
struct SarifDriver {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SarifResult {
    #[serde(default)]
    #[serde(rename = "ruleId")]
    rule_id: Option<String>,
    #[serde(default)]
    level: Option<String>,
    message: SarifMessage,
    #[serde(default)]
    locations: Vec<SarifLocation>,
    #[serde(default)]
    fingerprints: Option<serde_json::Value>,
    #[serde(default, rename = "partialFingerprints")]
    partial_fingerprints: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SarifMessage {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct SarifLocation {
    #[serde(rename = "physicalLocation")]
    physical_location: SarifPhysicalLocation,
}

#[derive(Debug, Deserialize)]
struct SarifPhysicalLocation {
    #[serde(rename = "artifactLocation")]
    artifact_location: SarifArtifactLocation,
    #[serde(default)]
    region: Option<SarifRegion>,
}

#[derive(Debug, Deserialize)]
struct SarifArtifactLocation {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct SarifRegion {
    #[serde(default, rename = "startLine")]
    start_line: Option<u32>,
    #[serde(default, rename = "startColumn")]
    start_column: Option<u32>,
    #[serde(default, rename = "endLine")]
    end_line: Option<u32>,
    #[serde(default, rename = "endColumn")]
    end_column: Option<u32>,
}

/// Parses a SARIF 2.1.0 document. Malformed input is recoverable:
/// returns an empty finding list with no tool identity, never an
/// error.
pub fn parse_sarif(raw: &str) -> (Option<String>, Option<String>, Vec<FindingInput>) {
    let doc: SarifDocument = match serde_json::from_str(raw) {
        Ok(d) => d,
        Err(_) => return (None, None, Vec::new()),
    };

    let Some(run) = doc.runs.into_iter().next() else {
        return (None, None, Vec::new());
    };

    let tool_name = Some(run.tool.driver.name.clone());
    let tool_version = run.tool.driver.version.clone();

    let findings = run
        .results
        .into_iter()
        .map(|r| {
            let location = r.locations.into_iter().next();
            let (file_path, region) = match location {
                Some(loc) => (
                    loc.physical_location.artifact_location.uri.trim_start_matches("file://").to_string(),
                    loc.physical_location.region,
                ),
                None => (String::new(), None),
            };

            let line_hash = |v: &serde_json::Value| {
                v.get("primaryLocationLineHash").and_then(|s| s.as_str()).map(|s| s.to_string())
            };
            let fingerprint = r
                .fingerprints
                .as_ref()
                .and_then(line_hash)
                .or_else(|| r.partial_fingerprints.as_ref().and_then(line_hash));

            FindingInput {
                rule_id: r.rule_id.unwrap_or_default(),
                severity: Severity::from_sarif_level(r.level.as_deref()),
                message: r.message.text,
                file_path,
                start_line: region.as_ref().and_then(|r| r.start_line),
                start_column: region.as_ref().and_then(|r| r.start_column),
                end_line: region.as_ref().and_then(|r| r.end_line),
                end_column: region.as_ref().and_then(|r| r.end_column),
                fingerprint,
                properties: serde_json::Value::Null,
            }
        })
        .collect();

    (tool_name, tool_version, findings)
}

#[derive(Debug, Clone)]
pub struct DiagnosticsStoreConfig {
    pub db_path: PathBuf,
}

impl Default for DiagnosticsStoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("ping-mem-diagnostics.sqlite3"),
        }
    }
}

pub struct DiagnosticsStore {
    conn: Mutex<Connection>,
}

impl DiagnosticsStore {
    pub fn open(config: &DiagnosticsStoreConfig) -> Result<Self> {
        let conn = Connection::open(&config.db_path)?;
        Self::migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS diagnostic_runs (
                analysis_id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                tree_hash TEXT NOT NULL,
                tool_name TEXT,
                tool_version TEXT,
                config_hash TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_runs_project_tree ON diagnostic_runs(project_id, tree_hash);
            CREATE INDEX IF NOT EXISTS idx_runs_tool ON diagnostic_runs(tool_name, tool_version);

            CREATE TABLE IF NOT EXISTS diagnostic_findings (
                finding_id TEXT NOT NULL,
                analysis_id TEXT NOT NULL REFERENCES diagnostic_runs(analysis_id),
                rule_id TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                file_path TEXT NOT NULL,
                start_line INTEGER,
                start_column INTEGER,
                end_line INTEGER,
                end_column INTEGER,
                fingerprint TEXT,
                properties TEXT NOT NULL,
                PRIMARY KEY (analysis_id, finding_id)
            );
            CREATE INDEX IF NOT EXISTS idx_findings_analysis ON diagnostic_findings(analysis_id);
            CREATE INDEX IF NOT EXISTS idx_findings_file ON diagnostic_findings(file_path);
            CREATE INDEX IF NOT EXISTS idx_findings_rule ON diagnostic_findings(rule_id);
            ",
        )?;
        Ok(())
    }

    /// Persists a run and its findings. Calling twice with the same
    /// findings inserts a second run row and a second set of finding
    /// rows and yields the same `analysisId` both times — runs are not
    /// deduplicated, only the ID computation is.
    pub fn save_run(
        &self,
        project_id: &str,
        tree_hash: &str,
        config_hash: &str,
        tool_name: Option<&str>,
        tool_version: Option<&str>,
        findings: Vec<FindingInput>,
    ) -> Result<DiagnosticRun> {
        let (analysis_id, normalized) =
            normalize_findings(project_id, tree_hash, tool_name, tool_version, config_hash, findings);
        let created_at = Utc::now();
        let status = if normalized.is_empty() && tool_name.is_none() { "passed" } else { "completed" };

        let conn = self.conn.lock().expect("diagnostics connection poisoned");
        conn.execute(
            "INSERT INTO diagnostic_runs (analysis_id, project_id, tree_hash, tool_name, tool_version, config_hash, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![analysis_id, project_id, tree_hash, tool_name, tool_version, config_hash, status, created_at.to_rfc3339()],
        )?;

        for f in &normalized {
            conn.execute(
                "INSERT INTO diagnostic_findings
                    (finding_id, analysis_id, rule_id, severity, message, file_path, start_line, start_column, end_line, end_column, fingerprint, properties)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    f.finding_id,
                    f.analysis_id,
                    f.rule_id,
                    f.severity.as_str(),
                    f.message,
                    f.file_path,
                    f.start_line,
                    f.start_column,
                    f.end_line,
                    f.end_column,
                    f.fingerprint,
                    f.properties.to_string(),
                ],
            )?;
        }

        Ok(DiagnosticRun {
            analysis_id,
            project_id: project_id.to_string(),
            tree_hash: tree_hash.to_string(),
            tool_name: tool_name.map(String::from),
            tool_version: tool_version.map(String::from),
            config_hash: config_hash.to_string(),
            status: status.to_string(),
            created_at,
        })
    }

    pub fn get_latest_run(&self, opts: &GetLatestRunOptions) -> Result<Option<DiagnosticRun>> {
        let conn = self.conn.lock().expect("diagnostics connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT analysis_id, project_id, tree_hash, tool_name, tool_version, config_hash, status, created_at
             FROM diagnostic_runs
             WHERE project_id = ?1
               AND (?2 IS NULL OR tool_name = ?2)
               AND (?3 IS NULL OR tool_version = ?3)
               AND (?4 IS NULL OR tree_hash = ?4)
             ORDER BY created_at DESC
             LIMIT 1",
        )?;
        let mut rows = stmt.query(params![opts.project_id, opts.tool_name, opts.tool_version, opts.tree_hash])?;
        let Some(row) = rows.next()? else { return Ok(None) };

        Ok(Some(DiagnosticRun {
            analysis_id: row.get(0)?,
            project_id: row.get(1)?,
            tree_hash: row.get(2)?,
            tool_name: row.get(3)?,
            tool_version: row.get(4)?,
            config_hash: row.get(5)?,
            status: row.get(6)?,
            created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }))
    }

    fn finding_ids(&self, analysis_id: &str) -> Result<std::collections::BTreeSet<String>> {
        let conn = self.conn.lock().expect("diagnostics connection poisoned");
        let mut stmt = conn.prepare("SELECT finding_id FROM diagnostic_findings WHERE analysis_id = ?1")?;
        let rows = stmt.query_map(params![analysis_id], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<_, _>>().map_err(StorageError::from)
    }

    /// `introduced = B \ A`, `resolved = A \ B`, `unchanged = A ∩ B`,
    /// each lexicographically sorted.
    pub fn diff_analyses(&self, analysis_a: &str, analysis_b: &str) -> Result<AnalysisDiff> {
        let a = self.finding_ids(analysis_a)?;
        let b = self.finding_ids(analysis_b)?;

        let introduced: Vec<String> = b.difference(&a).cloned().collect();
        let resolved: Vec<String> = a.difference(&b).cloned().collect();
        let unchanged: Vec<String> = a.intersection(&b).cloned().collect();

        Ok(AnalysisDiff { introduced, resolved, unchanged })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(rule: &str, line: u32, msg: &str) -> FindingInput {
        FindingInput {
            rule_id: rule.to_string(),
            severity: Severity::Error,
            message: msg.to_string(),
            file_path: "a.ts".to_string(),
            start_line: Some(line),
            start_column: None,
            end_line: None,
            end_column: None,
            fingerprint: None,
            properties: serde_json::Value::Null,
        }
    }

    #[test]
    fn permuted_findings_yield_same_analysis_id() {
        let f1 = finding("no-unused", 1, "unused var");
        let f2 = finding("no-any", 2, "avoid any");
        let f3 = finding("no-console", 3, "no console");

        let (id_a, _) = compute_analysis_id("proj", "tree", Some("eslint"), Some("8.0"), "cfg", &[f1.clone(), f2.clone(), f3.clone()]);
        let (id_b, _) = compute_analysis_id("proj", "tree", Some("eslint"), Some("8.0"), "cfg", &[f3, f1, f2]);

        assert_eq!(id_a, id_b);
    }

    #[test]
    fn same_findings_twice_yields_one_analysis_and_two_runs() {
        let store = DiagnosticsStore::open_in_memory().unwrap();
        let findings = vec![finding("r1", 1, "a"), finding("r2", 2, "b"), finding("r3", 3, "c")];

        let run1 = store.save_run("proj", "tree", "cfg", Some("tool"), Some("1.0"), findings.clone()).unwrap();
        let run2 = store.save_run("proj", "tree", "cfg", Some("tool"), Some("1.0"), findings).unwrap();

        assert_eq!(run1.analysis_id, run2.analysis_id);

        let conn = store.conn.lock().unwrap();
        let run_count: i64 = conn.query_row("SELECT COUNT(*) FROM diagnostic_runs", [], |r| r.get(0)).unwrap();
        let finding_count: i64 = conn.query_row("SELECT COUNT(*) FROM diagnostic_findings", [], |r| r.get(0)).unwrap();
        assert_eq!(run_count, 2);
        assert_eq!(finding_count, 6);
    }

    #[test]
    fn diff_algebra_holds() {
        let store = DiagnosticsStore::open_in_memory().unwrap();
        let a_findings = vec![finding("r1", 1, "a"), finding("r2", 2, "b")];
        let b_findings = vec![finding("r2", 2, "b"), finding("r3", 3, "c")];

        let run_a = store.save_run("proj", "treeA", "cfg", Some("tool"), Some("1.0"), a_findings).unwrap();
        let run_b = store.save_run("proj", "treeB", "cfg", Some("tool"), Some("1.0"), b_findings).unwrap();

        let diff = store.diff_analyses(&run_a.analysis_id, &run_b.analysis_id).unwrap();

        let introduced: std::collections::HashSet<_> = diff.introduced.iter().collect();
        let resolved: std::collections::HashSet<_> = diff.resolved.iter().collect();
        assert!(introduced.is_disjoint(&resolved));
        assert_eq!(diff.unchanged.len(), 1);
        assert_eq!(diff.introduced.len(), 1);
        assert_eq!(diff.resolved.len(), 1);
    }

    #[test]
    fn malformed_sarif_yields_empty_findings_not_error() {
        let (tool, version, findings) = parse_sarif("not json");
        assert!(tool.is_none());
        assert!(version.is_none());
        assert!(findings.is_empty());
    }

    #[test]
    fn parses_sarif_result_into_finding() {
        let sarif = r#"{
            "runs": [{
                "tool": {"driver": {"name": "eslint", "version": "8.0.0"}},
                "results": [{
                    "ruleId": "no-unused-vars",
                    "level": "warning",
                    "message": {"text": "  'x' is  unused  "},
                    "locations": [{"physicalLocation": {
                        "artifactLocation": {"uri": "file:///src/a.ts"},
                        "region": {"startLine": 3, "startColumn": 5}
                    }}]
                }]
            }]
        }"#;
        let (tool, version, findings) = parse_sarif(sarif);
        assert_eq!(tool.as_deref(), Some("eslint"));
        assert_eq!(version.as_deref(), Some("8.0.0"));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].file_path, "/src/a.ts");
        assert_eq!(findings[0].start_line, Some(3));

        let normalized = normalize(findings[0].clone());
        assert_eq!(normalized.message, "'x' is unused");
    }

    #[test]
    fn falls_back_to_partial_fingerprints_when_fingerprints_absent() {
        let sarif = r#"{
            "runs": [{
                "tool": {"driver": {"name": "codeql", "version": "2.15.0"}},
                "results": [{
                    "ruleId": "js/unused-local-variable",
                    "level": "warning",
                    "message": {"text": "unused variable"},
                    "partialFingerprints": {"primaryLocationLineHash": "abc123"},
                    "locations": [{"physicalLocation": {
                        "artifactLocation": {"uri": "file:///src/a.ts"},
                        "region": {"startLine": 3, "startColumn": 5}
                    }}]
                }]
            }]
        }"#;
        let (_, _, findings) = parse_sarif(sarif);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].fingerprint.as_deref(), Some("abc123"));
    }

    #[test]
    fn empty_rule_id_normalizes_to_unknown() {
        let f = normalize(finding("   ", 1, "msg"));
        assert_eq!(f.rule_id, "unknown");
    }

    #[test]
    fn severity_from_str_roundtrips() {
        assert_eq!(Severity::from_str("warning").as_str(), "warning");
        assert_eq!(Severity::from_str("bogus").as_str(), "info");
    }
}
