//! Core record model and versioned column schema for the roster.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod prefill;
mod schema;

pub use schema::{Column, ColumnGroup, ColumnSchema, SchemaError, Visibility, SCHEMA_V3};

pub const CRATE_NAME: &str = "roster-core";

pub const TIMESTAMP: &str = "timestamp";
pub const PROCESSED: &str = "processed";
pub const DISPLAY_NAME: &str = "rawName";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    pub fn to_cell(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLong {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place {
    Org,
    City,
    SummerOrg,
    SummerCity,
}

impl Place {
    pub const ALL: [Place; 4] = [Place::Org, Place::City, Place::SummerOrg, Place::SummerCity];

    pub fn lat_key(self) -> &'static str {
        match self {
            Self::Org => "orgLat",
            Self::City => "cityLat",
            Self::SummerOrg => "summerOrgLat",
            Self::SummerCity => "summerCityLat",
        }
    }

    pub fn long_key(self) -> &'static str {
        match self {
            Self::Org => "orgLong",
            Self::City => "cityLong",
            Self::SummerOrg => "summerOrgLong",
            Self::SummerCity => "summerCityLong",
        }
    }
}

pub const SUMMER_KEYS: [&str; 10] = [
    "summerPlans",
    "summerOrg",
    "summerOrgLink",
    "summerOrgLat",
    "summerOrgLong",
    "summerCity",
    "summerState",
    "summerCountry",
    "summerCityLat",
    "summerCityLong",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SummerPlans {
    pub plans: String,
    pub org: String,
    pub org_link: String,
    pub org_location: Option<LatLong>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub city_location: Option<LatLong>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn text(&self, key: &str) -> &str {
        self.fields
            .get(key)
            .and_then(FieldValue::as_text)
            .unwrap_or_default()
    }

    pub fn cell(&self, key: &str) -> String {
        self.fields.get(key).map(FieldValue::to_cell).unwrap_or_default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    pub fn timestamp(&self) -> String {
        self.cell(TIMESTAMP)
    }

    /// Finalized records have `processed == timestamp`; anything else is pending.
    pub fn is_processed(&self) -> bool {
        self.cell(PROCESSED) == self.cell(TIMESTAMP)
    }

    pub fn display_name(&self) -> String {
        self.cell(DISPLAY_NAME)
    }

    pub fn location(&self, place: Place) -> Option<LatLong> {
        let lat = self.fields.get(place.lat_key())?.as_f64()?;
        let lng = self.fields.get(place.long_key())?.as_f64()?;
        Some(LatLong { lat, lng })
    }

    pub fn summer_plans(&self) -> Option<SummerPlans> {
        let plans = self.cell("summerPlans");
        let org = self.cell("summerOrg");
        if plans.trim().is_empty() && org.trim().is_empty() {
            return None;
        }
        Some(SummerPlans {
            plans,
            org,
            org_link: self.cell("summerOrgLink"),
            org_location: self.location(Place::SummerOrg),
            city: self.cell("summerCity"),
            state: self.cell("summerState"),
            country: self.cell("summerCountry"),
            city_location: self.location(Place::SummerCity),
        })
    }

    pub fn project<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Record {
        let mut out = Record::new();
        for key in keys {
            if let Some(value) = self.fields.get(key) {
                out.fields.insert(key.to_string(), value.clone());
            }
        }
        out
    }

    pub fn with_numeric_coordinates(mut self) -> Self {
        for place in Place::ALL {
            if let Some(loc) = self.location(place) {
                self.set(place.lat_key(), loc.lat);
                self.set(place.long_key(), loc.lng);
            }
        }
        self
    }

    pub fn without_empty_summer(mut self) -> Self {
        if self.summer_plans().is_none() {
            for key in SUMMER_KEYS {
                self.fields.remove(key);
            }
        }
        self
    }

    /// Queue a pending record for annotation: clear `processed` and seed empty
    /// derived fields from the raw answers. Finalized records are untouched.
    pub fn prefill_pending(&mut self) {
        prefill::prefill_pending(self);
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordCollection {
    partitions: BTreeMap<String, Vec<Record>>,
}

impl RecordCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_partition(&mut self, key: impl Into<String>, records: Vec<Record>) {
        self.partitions.insert(key.into(), records);
    }

    pub fn partition(&self, key: &str) -> Option<&[Record]> {
        self.partitions.get(key).map(Vec::as_slice)
    }

    pub fn partitions(&self) -> impl Iterator<Item = (&str, &[Record])> {
        self.partitions
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.partitions.values().flatten()
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn record_count(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    pub fn pending_count(&self) -> usize {
        self.records().filter(|r| !r.is_processed()).count()
    }

    pub fn filter_map_records(&self, mut f: impl FnMut(&Record) -> Option<Record>) -> Self {
        Self {
            partitions: self
                .partitions
                .iter()
                .map(|(k, records)| (k.clone(), records.iter().filter_map(&mut f).collect()))
                .collect(),
        }
    }

    pub fn finalized(&self) -> Self {
        self.filter_map_records(|r| r.is_processed().then(|| r.clone()))
    }
}
