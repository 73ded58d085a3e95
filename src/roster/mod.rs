//! # Roster Model
//!
//! Records extracted from an uploaded roster and the teams they are dealt into.
//! A [`Record`] is immutable once extracted; partitioning consumes it and yields
//! a [`TeamMember`] that carries the team fields alongside the original values.
use std::fmt::Display;

pub mod extract;
pub mod partition;
pub mod shuffle;

/// Column appended to every partitioned record holding the 1-based team index
pub const TEAM_INDEX_COLUMN: &str = "TeamIndex";
/// Column appended to every partitioned record holding the team name
pub const TEAM_NAME_COLUMN: &str = "TeamName";

/// Value of a single roster field.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    /// Missing cell, rendered as an empty string
    #[default]
    Empty,
    Text(String),
    Number(f64),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.is_empty(),
            CellValue::Number(_) => false,
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(text) => write!(f, "{}", text),
            CellValue::Number(number) => write!(f, "{}", number),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// One roster entry: an ordered mapping from column name to value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, CellValue)>,
}

impl Record {
    pub fn new(fields: Vec<(String, CellValue)>) -> Self {
        Record { fields }
    }

    /// Value of `column`, `None` when the record has no such column
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn fields(&self) -> &[(String, CellValue)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A record assigned to a team.
#[derive(Clone, Debug, PartialEq)]
pub struct TeamMember {
    /// The record as extracted
    pub record: Record,
    /// 1-based team index
    pub team_index: usize,
    pub team_name: String,
}

impl TeamMember {
    /// Value of `column` in the augmented record.
    ///
    /// `TeamIndex` and `TeamName` always resolve to the team fields, even when the
    /// source roster had columns of the same name.
    pub fn get(&self, column: &str) -> Option<CellValue> {
        match column {
            TEAM_INDEX_COLUMN => Some(CellValue::Number(self.team_index as f64)),
            TEAM_NAME_COLUMN => Some(CellValue::Text(self.team_name.clone())),
            _ => self.record.get(column).cloned(),
        }
    }

    /// Original fields followed by the team fields.
    /// Source columns named like a team field are overwritten in place instead of repeated.
    pub fn augmented_fields(&self) -> Vec<(String, CellValue)> {
        let mut fields: Vec<(String, CellValue)> = self.record
            .fields()
            .iter()
            .map(|(name, value)| (name.to_owned(), self.get(name).unwrap_or_else(|| value.clone())))
            .collect();
        for column in [TEAM_INDEX_COLUMN, TEAM_NAME_COLUMN] {
            if self.record.get(column).is_none() {
                fields.push((column.to_owned(), self.get(column).unwrap_or_default()));
            }
        }
        fields
    }
}

/// A partition group of records sharing a team identity.
#[derive(Clone, Debug, PartialEq)]
pub struct Team {
    /// 0-based position of the team
    pub index: usize,
    pub name: String,
    pub members: Vec<TeamMember>,
}

impl Team {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Column layout of this team's sheet: source columns in first-seen order,
    /// then `TeamIndex` and `TeamName` unless the source already had them.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for member in &self.members {
            for column in member.record.columns() {
                if !columns.iter().any(|seen| seen == column) {
                    columns.push(column.to_owned());
                }
            }
        }
        for column in [TEAM_INDEX_COLUMN, TEAM_NAME_COLUMN] {
            if !columns.iter().any(|seen| seen == column) {
                columns.push(column.to_owned());
            }
        }
        columns
    }
}
