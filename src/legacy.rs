//! One-shot import of rows exported from the legacy hosted table.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::MAX_LEGACY_ROWS;
use crate::model::*;
use crate::password;

/// One exported row. The id is whatever the old table used (integer or
/// string).
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyRow {
    pub id: serde_json::Value,
    pub name: String,
    pub email: String,
    pub date: String,
    pub range_type: String,
    pub time_slot: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub salt: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub enum ImportError {
    Io(std::io::Error),
    Json(serde_json::Error),
    TooManyRows(usize),
    Engine(EngineError),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Io(e) => write!(f, "reading legacy export: {e}"),
            ImportError::Json(e) => write!(f, "parsing legacy export: {e}"),
            ImportError::TooManyRows(n) => {
                write!(f, "legacy export has {n} rows (max {MAX_LEGACY_ROWS})")
            }
            ImportError::Engine(e) => write!(f, "storing legacy rows: {e}"),
        }
    }
}

impl std::error::Error for ImportError {}

/// Stable ULID for a legacy id: ids that already are ULIDs are kept, anything
/// else is derived from the row's creation time and a checksum of the id, so
/// importing the same export twice yields the same ids.
pub fn legacy_ulid(id: &serde_json::Value, created_at: DateTime<Utc>) -> Ulid {
    let raw = match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if let Ok(ulid) = Ulid::from_string(&raw) {
        return ulid;
    }
    let hi = crc32fast::hash(raw.as_bytes()) as u128;
    let lo = crc32fast::hash(format!("rangebook-legacy:{raw}").as_bytes()) as u128;
    let ts = created_at.timestamp_millis().max(0) as u64;
    Ulid::from_parts(ts, (hi << 32) | lo)
}

fn row_to_booking(row: &LegacyRow) -> Result<Booking, ParseError> {
    Ok(Booking {
        id: legacy_ulid(&row.id, row.created_at),
        name: row.name.trim().to_string(),
        email: normalize_email(&row.email),
        date: parse_date(row.date.trim())?,
        range_type: row.range_type.trim().parse()?,
        time_slot: row.time_slot.trim().parse()?,
        created_at: row.created_at,
    })
}

pub async fn import_file(engine: &Engine, path: &Path) -> Result<ImportReport, ImportError> {
    let raw = tokio::fs::read(path).await.map_err(ImportError::Io)?;
    let values: Vec<serde_json::Value> = serde_json::from_slice(&raw).map_err(ImportError::Json)?;
    if values.len() > MAX_LEGACY_ROWS {
        return Err(ImportError::TooManyRows(values.len()));
    }

    let mut rows = Vec::with_capacity(values.len());
    let mut malformed = 0;
    for value in values {
        match serde_json::from_value::<LegacyRow>(value) {
            Ok(row) => rows.push(row),
            Err(e) => {
                debug!("skipping malformed legacy row: {e}");
                malformed += 1;
            }
        }
    }

    let mut report = import_rows(engine, rows).await?;
    report.skipped += malformed;
    info!(
        "legacy import from {}: {} imported, {} skipped",
        path.display(),
        report.imported,
        report.skipped
    );
    Ok(report)
}

/// Insert rows oldest first. Rows bypass password checks but not capacity.
/// Each email's credential comes from its newest row and is only stored if
/// the email has none yet. Emails imported without any credential cannot be
/// claimed later: the engine refuses a first credential for an email that
/// already holds bookings.
pub async fn import_rows(engine: &Engine, mut rows: Vec<LegacyRow>) -> Result<ImportReport, ImportError> {
    rows.sort_by_key(|r| r.created_at);
    let mut report = ImportReport::default();
    let mut newest_credential: HashMap<String, Credential> = HashMap::new();

    for row in &rows {
        let booking = match row_to_booking(row) {
            Ok(b) => b,
            Err(e) => {
                debug!("skipping legacy row {}: {e}", row.id);
                report.skipped += 1;
                continue;
            }
        };

        if let Some(hash) = row.password_hash.as_deref().filter(|h| !h.is_empty()) {
            let credential = password::credential_from_legacy(hash, row.salt.as_deref());
            if matches!(credential, Credential::Foreign { .. }) {
                warn!(
                    "legacy row {} for {} has a foreign hash; the email stays locked",
                    row.id, booking.email
                );
            }
            newest_credential.insert(booking.email.clone(), credential);
        }

        match engine.create_booking(booking).await {
            Ok(_) => report.imported += 1,
            Err(e @ EngineError::WalError(_)) => return Err(ImportError::Engine(e)),
            Err(EngineError::AlreadyExists(_)) => report.skipped += 1,
            Err(e) => {
                warn!("skipping legacy row {}: {e}", row.id);
                report.skipped += 1;
            }
        }
    }

    for (email, credential) in newest_credential {
        match engine.register_credential(&email, credential).await {
            Ok(()) | Err(EngineError::AlreadyExists(_)) => {}
            Err(e) => return Err(ImportError::Engine(e)),
        }
    }
    Ok(report)
}
