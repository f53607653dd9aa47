// Target scope file: `ip,value` lines imported into TargetsInScope.

use std::net::Ipv4Addr;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::db::Database;

#[derive(Debug, Error)]
pub enum ScopeFileError {
    #[error("failed to read scope file: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: expected `ip,value`, got {content:?}")]
    Malformed { line: usize, content: String },
    #[error("line {line}: {address:?} is not an IPv4 address")]
    BadAddress { line: usize, address: String },
    #[error("line {line}: value {value:?} must be a positive integer")]
    BadValue { line: usize, value: String },
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

/// One parsed scope line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeEntry {
    pub address: Ipv4Addr,
    pub value: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub added: usize,
    /// Addresses already in scope (or repeated within the file).
    pub skipped: usize,
    /// Targets in scope after the import.
    pub total: i64,
}

/// Parse scope file contents. Blank lines and `#` comments are skipped;
/// the first malformed line fails the whole parse.
pub fn parse_scope(contents: &str) -> Result<Vec<ScopeEntry>, ScopeFileError> {
    let mut entries = Vec::new();

    for (idx, raw) in contents.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (address, value) =
            trimmed
                .split_once(',')
                .ok_or_else(|| ScopeFileError::Malformed {
                    line,
                    content: trimmed.to_string(),
                })?;
        let (address, value) = (address.trim(), value.trim());

        let address: Ipv4Addr = address.parse().map_err(|_| ScopeFileError::BadAddress {
            line,
            address: address.to_string(),
        })?;
        let value = value
            .parse::<i64>()
            .ok()
            .filter(|v| *v >= 1)
            .ok_or_else(|| ScopeFileError::BadValue {
                line,
                value: value.to_string(),
            })?;

        entries.push(ScopeEntry { address, value });
    }

    Ok(entries)
}

/// Insert parsed entries; addresses already in scope are left untouched.
pub async fn import_entries(
    db: &Database,
    entries: &[ScopeEntry],
) -> Result<ImportSummary, ScopeFileError> {
    let mut summary = ImportSummary::default();

    for entry in entries {
        if db.add_target(entry.address, entry.value).await? {
            summary.added += 1;
        } else {
            tracing::warn!(address = %entry.address, "Target already in scope, skipping");
            summary.skipped += 1;
        }
    }

    summary.total = db.count_targets().await?;
    Ok(summary)
}

/// Read, parse and import a scope file. Nothing is written if any line is malformed.
pub async fn import_scope_file(
    db: &Database,
    path: &Path,
) -> Result<ImportSummary, ScopeFileError> {
    let contents = tokio::fs::read_to_string(path).await?;
    let entries = parse_scope(&contents)?;
    let summary = import_entries(db, &entries).await?;

    tracing::info!(
        path = %path.display(),
        added = summary.added,
        skipped = summary.skipped,
        total = summary.total,
        "Imported target scope"
    );
    Ok(summary)
}
