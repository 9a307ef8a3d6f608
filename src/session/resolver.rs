// src/session/resolver.rs  -  Scanned code → student (+ optional mark intent)
use crate::model::StudentLookupRecord;
use crate::roster::Roster;

use super::selector::ClassSelector;

/// What the gateway needs to mark one student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkIntent {
    pub student_id:        String,
    pub class_instance_id: String,
    pub status:            Option<String>,
    pub notes:             Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found {
        student: StudentLookupRecord,
        /// `None` in casual mode or with no class selected
        mark:    Option<MarkIntent>,
    },
    /// Benign: the code belongs to nobody on the roster
    NotFound { code: String },
}

#[derive(Debug, Default)]
pub struct ScanResolver {
    fetching_student_info: bool,
    student_info:          Option<StudentLookupRecord>,
}

impl ScanResolver {
    pub fn new() -> Self { Self::default() }

    /// A scan opened the result modal.
    pub fn begin(&mut self) {
        self.fetching_student_info = true;
        self.student_info = None;
    }

    /// Display record of the last resolution; `None` after a miss.
    pub fn student_info(&self) -> Option<&StudentLookupRecord> { self.student_info.as_ref() }

    /// Look the code up and decide whether to mark.  Does nothing unless a
    /// scan is pending; always leaves the pending flag cleared.
    pub fn resolve(&mut self, code: &str, roster: &Roster, selector: &ClassSelector) -> Option<Resolution> {
        if !self.fetching_student_info {
            log::debug!("[resolver] '{code}' ignored: no scan pending");
            return None;
        }
        let resolution = Self::lookup(code, roster, selector);
        self.student_info = match &resolution {
            Resolution::Found { student, .. } => Some(student.clone()),
            Resolution::NotFound { .. }       => None,
        };
        self.fetching_student_info = false;
        Some(resolution)
    }

    fn lookup(code: &str, roster: &Roster, selector: &ClassSelector) -> Resolution {
        let Some(student) = roster.find_by_code(code) else {
            log::info!("[resolver] '{code}' not on roster");
            return Resolution::NotFound { code: code.to_string() };
        };

        let mark = match selector.selected_class() {
            Some(class) if !selector.is_casual() => Some(MarkIntent {
                student_id:        student.id.clone(),
                class_instance_id: class.id.clone(),
                status:            None,
                notes:             None,
            }),
            _ => None,
        };
        log::info!(
            "[resolver] '{code}' → {} ({}){}",
            student.name, student.id,
            if mark.is_some() { "" } else { "  [identify only]" }
        );
        Resolution::Found { student: student.clone(), mark }
    }
}
