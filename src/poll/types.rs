//! Poll domain types.

use crate::PollId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Where a teammate reports being for the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceOption {
    Remote,
    InOffice,
    SickLeave,
    Vacation,
    VacationAbroad,
    ExcusedAbsence,
    /// Storage default for users who never answered; not on the ballot.
    #[default]
    Unknown,
}

impl AttendanceOption {
    /// Options offered on the weekly ballot, in display order.
    pub const BALLOT: [AttendanceOption; 6] = [
        AttendanceOption::Remote,
        AttendanceOption::InOffice,
        AttendanceOption::SickLeave,
        AttendanceOption::Vacation,
        AttendanceOption::VacationAbroad,
        AttendanceOption::ExcusedAbsence,
    ];

    /// Display label shown in the chat.
    pub fn label(&self) -> &'static str {
        match self {
            AttendanceOption::Remote => "Working remotely",
            AttendanceOption::InOffice => "In the office",
            AttendanceOption::SickLeave => "On sick leave",
            AttendanceOption::Vacation => "On vacation (domestic)",
            AttendanceOption::VacationAbroad => "On vacation (abroad)",
            AttendanceOption::ExcusedAbsence => "Absent with valid reason",
            AttendanceOption::Unknown => "Unknown",
        }
    }
}

/// Persisted poll status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    NotStarted,
    Started,
    Completed,
}

/// Lifecycle phase of the poll currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    NotStarted,
    Started,
    StartedAndPinned,
    Completed,
}

/// Row persisted when a poll is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRecord {
    pub id: PollId,
    pub question: String,
    pub date: NaiveDate,
    pub status: PollStatus,
}

/// Standard question text for the weekly attendance poll.
pub fn attendance_question(date: NaiveDate) -> String {
    format!("Where are you working on {}?", date.format("%d.%m.%Y"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ballot_excludes_unknown() {
        assert!(!AttendanceOption::BALLOT.contains(&AttendanceOption::Unknown));
        assert_eq!(AttendanceOption::BALLOT.len(), 6);
    }

    #[test]
    fn test_question_formats_date() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        assert_eq!(
            attendance_question(date),
            "Where are you working on 03.08.2026?"
        );
    }

    #[test]
    fn test_option_serializes_snake_case() {
        let json = serde_json::to_string(&AttendanceOption::SickLeave).unwrap();
        assert_eq!(json, "\"sick_leave\"");
    }
}
