//! Versioned column schema shared by both directions of the sheet mapping.
//!
//! The header row of every worksheet must equal the schema's headers exactly.
//! A form edit that shifts a column would silently corrupt every derived field,
//! so any difference fails the whole operation.

use std::ops::Range;

use thiserror::Error;

use crate::{FieldValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnGroup {
    Raw,
    Separator,
    Derived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Visibility {
    Public,
    Member,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub header: &'static str,
    pub key: &'static str,
    pub group: ColumnGroup,
    pub visibility: Visibility,
}

const fn col(
    header: &'static str,
    key: &'static str,
    group: ColumnGroup,
    visibility: Visibility,
) -> Column {
    Column {
        header,
        key,
        group,
        visibility,
    }
}

use ColumnGroup::{Derived, Raw, Separator};
use Visibility::{Admin, Member, Public};

const V3_COLUMNS: &[Column] = &[
    col("Timestamp", "timestamp", Raw, Admin),
    col("Email Address", "rawEmail", Raw, Admin),
    col("Your name", "rawName", Raw, Admin),
    col("Your major", "rawMajor", Raw, Admin),
    col("What are you doing after graduation?", "rawPath", Raw, Admin),
    col("At what company, school, or organization?", "rawOrg", Raw, Admin),
    col("In what city and state?", "rawCityState", Raw, Admin),
    col("What are you doing this summer?", "rawSummerPlans", Raw, Admin),
    col(
        "Where are you spending the summer (company, school, or organization)?",
        "rawSummerOrg",
        Raw,
        Admin,
    ),
    col(
        "In what city and state are you spending the summer?",
        "rawSummerCityState",
        Raw,
        Admin,
    ),
    col("Phone number (optional)", "rawPhoneNumber", Raw, Admin),
    col(
        "Post-graduation email address (optional)",
        "rawPostGradEmail",
        Raw,
        Admin,
    ),
    col("Anything else to say?", "rawComments", Raw, Admin),
    col("", "blank", Separator, Admin),
    col("Processed", "processed", Derived, Admin),
    col("Email", "email", Derived, Member),
    col("Name", "name", Derived, Public),
    col("Major", "major", Derived, Public),
    col("Path", "path", Derived, Public),
    col("Organization", "org", Derived, Public),
    col("Organization link", "orgLink", Derived, Public),
    col("Organization latitude", "orgLat", Derived, Public),
    col("Organization longitude", "orgLong", Derived, Public),
    col("City", "city", Derived, Public),
    col("State", "state", Derived, Public),
    col("Country", "country", Derived, Public),
    col("City latitude", "cityLat", Derived, Public),
    col("City longitude", "cityLong", Derived, Public),
    col("Summer plans", "summerPlans", Derived, Public),
    col("Summer organization", "summerOrg", Derived, Public),
    col("Summer organization link", "summerOrgLink", Derived, Public),
    col("Summer organization latitude", "summerOrgLat", Derived, Public),
    col("Summer organization longitude", "summerOrgLong", Derived, Public),
    col("Summer city", "summerCity", Derived, Public),
    col("Summer state", "summerState", Derived, Public),
    col("Summer country", "summerCountry", Derived, Public),
    col("Summer city latitude", "summerCityLat", Derived, Public),
    col("Summer city longitude", "summerCityLong", Derived, Public),
    col("Phone number", "phoneNumber", Derived, Member),
    col("Post-graduation email", "postGradEmail", Derived, Member),
    col("Facebook profile", "facebookProfile", Derived, Member),
    col("Comments", "comments", Derived, Public),
];

pub const SCHEMA_V3: ColumnSchema = ColumnSchema {
    version: 3,
    columns: V3_COLUMNS,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error(
        "worksheet {worksheet:?} header differs from schema v{version} at column {index}: expected {expected:?}, found {observed:?}"
    )]
    HeaderMismatch {
        worksheet: String,
        version: u32,
        index: usize,
        expected: Option<String>,
        observed: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSchema {
    pub version: u32,
    pub columns: &'static [Column],
}

impl ColumnSchema {
    pub fn headers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.header)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.key)
    }

    /// Zero-based range of columns the reverse projection writes: everything
    /// after the separator.
    pub fn writable_columns(&self) -> Range<usize> {
        let start = self
            .columns
            .iter()
            .rposition(|c| c.group == ColumnGroup::Separator)
            .map(|idx| idx + 1)
            .unwrap_or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.group == ColumnGroup::Derived)
                    .unwrap_or(self.columns.len())
            });
        start..self.columns.len()
    }

    /// Keys a viewer at `visibility` may see (visibility levels are cumulative).
    pub fn keys_visible_to(&self, visibility: Visibility) -> impl Iterator<Item = &'static str> + '_ {
        self.columns
            .iter()
            .filter(move |c| c.visibility <= visibility && c.group != ColumnGroup::Separator)
            .map(|c| c.key)
    }

    pub fn validate_header(&self, worksheet: &str, observed: &[String]) -> Result<(), SchemaError> {
        let len = self.columns.len().max(observed.len());
        for index in 0..len {
            let expected = self.columns.get(index).map(|c| c.header);
            let seen = observed.get(index).map(String::as_str);
            if expected != seen {
                return Err(SchemaError::HeaderMismatch {
                    worksheet: worksheet.to_string(),
                    version: self.version,
                    index,
                    expected: expected.map(str::to_string),
                    observed: seen.map(str::to_string),
                });
            }
        }
        Ok(())
    }

    pub fn map_rows(&self, worksheet: &str, rows: &[Vec<String>]) -> Result<Vec<Record>, SchemaError> {
        let Some((header, body)) = rows.split_first() else {
            return self.validate_header(worksheet, &[]).map(|()| Vec::new());
        };
        self.validate_header(worksheet, header)?;
        Ok(body.iter().map(|row| self.map_row(row)).collect())
    }

    pub fn map_row(&self, row: &[String]) -> Record {
        Record::from_pairs(self.columns.iter().enumerate().map(|(idx, column)| {
            (
                column.key,
                FieldValue::Text(row.get(idx).cloned().unwrap_or_default()),
            )
        }))
    }

    pub fn writable_rows(&self, records: &[Record]) -> Vec<Vec<String>> {
        let writable = &self.columns[self.writable_columns()];
        records
            .iter()
            .map(|record| writable.iter().map(|c| record.cell(c.key)).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<String> {
        SCHEMA_V3.headers().map(str::to_string).collect()
    }

    fn full_row(seed: &str) -> Vec<String> {
        SCHEMA_V3
            .keys()
            .map(|k| if k == "blank" { String::new() } else { format!("{seed}-{k}") })
            .collect()
    }

    #[test]
    fn writable_range_starts_after_separator() {
        let range = SCHEMA_V3.writable_columns();
        assert_eq!(SCHEMA_V3.columns[range.start].key, "processed");
        assert_eq!(range.end, SCHEMA_V3.columns.len());
        assert!(SCHEMA_V3.columns[range]
            .iter()
            .all(|c| c.group == ColumnGroup::Derived));
    }

    #[test]
    fn header_mismatch_reports_first_differing_column() {
        let mut observed = header();
        observed.remove(4);
        let err = SCHEMA_V3.validate_header("2020", &observed).unwrap_err();
        assert_eq!(
            err,
            SchemaError::HeaderMismatch {
                worksheet: "2020".into(),
                version: 3,
                index: 4,
                expected: Some("What are you doing after graduation?".into()),
                observed: Some("At what company, school, or organization?".into()),
            }
        );
    }

    #[test]
    fn header_with_extra_column_is_rejected() {
        let mut observed = header();
        observed.push("Surprise".into());
        let err = SCHEMA_V3.validate_header("2020", &observed).unwrap_err();
        let SchemaError::HeaderMismatch {
            index,
            expected,
            observed,
            ..
        } = err;
        assert_eq!(index, SCHEMA_V3.columns.len());
        assert_eq!(expected, None);
        assert_eq!(observed.as_deref(), Some("Surprise"));
    }

    #[test]
    fn empty_grid_is_a_mismatch() {
        assert!(SCHEMA_V3.map_rows("2020", &[]).is_err());
    }

    #[test]
    fn short_rows_pad_with_empty_strings() {
        let rows = vec![header(), vec!["5/1/2020 10:00:00".into(), "a@g.hmc.edu".into()]];
        let records = SCHEMA_V3.map_rows("2020", &rows).expect("map");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text("rawEmail"), "a@g.hmc.edu");
        assert_eq!(records[0].text("comments"), "");
        assert_eq!(records[0].fields().len(), SCHEMA_V3.columns.len());
        assert!(!records[0].is_processed());
    }

    #[test]
    fn writable_projection_round_trips() {
        let mut short = full_row("c");
        short.truncate(SCHEMA_V3.columns.len() - 3);
        let rows = vec![header(), full_row("a"), full_row("b"), short.clone()];
        let records = SCHEMA_V3.map_rows("2020", &rows).expect("map");

        let projected = SCHEMA_V3.writable_rows(&records);
        let range = SCHEMA_V3.writable_columns();
        assert_eq!(projected.len(), 3);
        for (row, out) in rows[1..].iter().zip(&projected) {
            let expected: Vec<String> = range
                .clone()
                .map(|idx| row.get(idx).cloned().unwrap_or_default())
                .collect();
            assert_eq!(out, &expected);
        }
        assert!(projected
            .iter()
            .all(|row| !row.iter().any(|cell| cell.contains("-raw"))));
    }

    #[test]
    fn visibility_is_cumulative() {
        let public: Vec<_> = SCHEMA_V3.keys_visible_to(Visibility::Public).collect();
        let member: Vec<_> = SCHEMA_V3.keys_visible_to(Visibility::Member).collect();
        assert!(public.contains(&"name"));
        assert!(!public.contains(&"email"));
        assert!(member.contains(&"email"));
        assert!(!member.contains(&"rawEmail"));
        assert!(!member.contains(&"blank"));
    }
}
