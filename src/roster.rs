// src/roster.rs  -  In-memory student roster for badge lookup
use anyhow::{Context, Result};
use std::path::Path;

use crate::model::StudentLookupRecord;

/// Already-fetched student list.  Read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    students: Vec<StudentLookupRecord>,
}

impl Roster {
    pub fn from_records(students: Vec<StudentLookupRecord>) -> Self {
        Self { students }
    }

    /// Load a JSON array of student records.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Reading roster {:?}", path))?;
        let students: Vec<StudentLookupRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("Parsing roster {:?}", path))?;
        log::info!("[roster] {} students loaded from {}", students.len(), path.display());
        Ok(Self { students })
    }

    /// Exact match on barcodeId first, then on id.
    pub fn find_by_code(&self, code: &str) -> Option<&StudentLookupRecord> {
        self.students.iter()
            .find(|s| !s.barcode_id.is_empty() && s.barcode_id == code)
            .or_else(|| self.students.iter().find(|s| s.id == code))
    }

    pub fn len(&self) -> usize { self.students.len() }

    pub fn is_empty(&self) -> bool { self.students.is_empty() }
}
