// 🏗️ Normalizer - Form export CSV → typed, time-ordered Requests
//
// The sheet has localized headers, so columns are read by position:
//   ts, email, surname, street, home_number, apt_number,
//   is_registered, action,
//   car_id_to_be_replaced, car_id_to_replace, car_id_to_remove,
//   name, id, car_id, another_car, name_2, id_2, car_id_2

use crate::config::{AppConfig, SurveyVocabulary};
use crate::request::{HouseholdKey, PlateId, Request, RequestKind, VehicleClaim};
use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// COLUMN LAYOUT
// ============================================================================

pub const COLUMNS: [&str; 18] = [
    "ts",
    "email",
    "surname",
    "street",
    "home_number",
    "apt_number",
    "is_registered",
    "action",
    "car_id_to_be_replaced",
    "car_id_to_replace",
    "car_id_to_remove",
    "name",
    "id",
    "car_id",
    "another_car",
    "name_2",
    "id_2",
    "car_id_2",
];

const TS: usize = 0;
const EMAIL: usize = 1;
const SURNAME: usize = 2;
const STREET: usize = 3;
const HOME_NUMBER: usize = 4;
const APT_NUMBER: usize = 5;
const IS_REGISTERED: usize = 6;
const ACTION: usize = 7;
const CAR_TO_BE_REPLACED: usize = 8;
const CAR_TO_REPLACE: usize = 9;
const CAR_TO_REMOVE: usize = 10;
const NAME: usize = 11;
const ID: usize = 12;
const CAR_ID: usize = 13;
const ANOTHER_CAR: usize = 14;
const NAME_2: usize = 15;
const ID_2: usize = 16;
const CAR_ID_2: usize = 17;

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Map the two survey answers onto a request kind
pub fn classify(vocabulary: &SurveyVocabulary, is_registered: &str, action: &str) -> RequestKind {
    let is_registered = is_registered.trim();
    let action = action.trim();

    if is_registered == vocabulary.not_registered {
        return RequestKind::RegisterNew;
    }

    if is_registered == vocabulary.yes {
        if action == vocabulary.action_replace {
            return RequestKind::ReplaceExisting;
        }
        if action == vocabulary.action_add_second {
            return RequestKind::AddSecondCar;
        }
        if action == vocabulary.action_remove {
            return RequestKind::RemoveExisting;
        }
    }

    RequestKind::Unhandled {
        is_registered: is_registered.to_string(),
        action: action.to_string(),
    }
}

// ============================================================================
// FIELD PARSING
// ============================================================================

fn field<'r>(record: &'r StringRecord, index: usize) -> &'r str {
    record.get(index).unwrap_or("").trim()
}

fn optional_text(record: &StringRecord, index: usize) -> Option<String> {
    let value = field(record, index);
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Spreadsheet exports sometimes render integers as floats ("1234.0")
fn strip_float_suffix(value: &str) -> &str {
    value.strip_suffix(".0").unwrap_or(value)
}

fn parse_int(record: &StringRecord, index: usize, line: usize) -> Result<Option<i64>> {
    let value = strip_float_suffix(field(record, index));
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<i64>()
        .map(Some)
        .with_context(|| format!("line {}: invalid {} '{}'", line, COLUMNS[index], value))
}

/// Plates are often typed as "12-345-67" or "12 345 67"; separators are dropped
fn parse_plate(record: &StringRecord, index: usize, line: usize) -> Result<Option<PlateId>> {
    let raw = field(record, index);
    // A leading dash is a sign, not a separator
    if raw.starts_with('-') {
        bail!("line {}: invalid {} '{}'", line, COLUMNS[index], raw);
    }
    let cleaned: String = strip_float_suffix(raw)
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Ok(None);
    }
    cleaned
        .parse::<u64>()
        .map(|n| Some(PlateId(n)))
        .with_context(|| format!("line {}: invalid {} '{}'", line, COLUMNS[index], raw))
}

// ============================================================================
// NORMALIZER
// ============================================================================

pub struct Normalizer {
    vocabulary: SurveyVocabulary,
    timestamp_format: String,
}

impl Normalizer {
    pub fn new(vocabulary: SurveyVocabulary, timestamp_format: &str) -> Self {
        Normalizer {
            vocabulary,
            timestamp_format: timestamp_format.to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Normalizer::new(config.survey.clone(), &config.source.timestamp_format)
    }

    /// Read a form export from disk
    pub fn normalize_path(&self, path: &Path) -> Result<Vec<Request>> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        self.normalize_reader(file)
            .with_context(|| format!("Failed to normalize {}", path.display()))
    }

    /// Parse, drop blank rows, classify, then stable-sort by timestamp
    pub fn normalize_reader<R: Read>(&self, reader: R) -> Result<Vec<Request>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut requests = Vec::new();
        let mut skipped = 0;

        for (row, result) in reader.records().enumerate() {
            // +2 because: 1-indexed + header row
            let fallback_line = row + 2;
            let record = result.with_context(|| format!("Failed to parse CSV line {}", fallback_line))?;
            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(fallback_line);

            if record.iter().all(|value| value.trim().is_empty()) {
                skipped += 1;
                continue;
            }

            requests.push(self.normalize_record(&record, line)?);
        }

        requests.sort_by_key(|r| r.timestamp);
        info!(requests = requests.len(), blank_rows = skipped, "normalized form export");
        Ok(requests)
    }

    /// One CSV row → one Request
    pub fn normalize_record(&self, record: &StringRecord, line: usize) -> Result<Request> {
        let raw_ts = field(record, TS);
        let timestamp = NaiveDateTime::parse_from_str(raw_ts, &self.timestamp_format)
            .map_err(|e| anyhow!("line {}: invalid timestamp '{}': {}", line, raw_ts, e))?;

        let household_key = HouseholdKey {
            surname: record.get(SURNAME).unwrap_or("").to_string(),
            street: field(record, STREET).to_string(),
            house_number: field(record, HOME_NUMBER).to_string(),
        };

        let kind = classify(
            &self.vocabulary,
            field(record, IS_REGISTERED),
            field(record, ACTION),
        );

        let primary = VehicleClaim::new(
            record.get(NAME).unwrap_or(""),
            parse_int(record, ID, line)?,
            parse_plate(record, CAR_ID, line)?,
        );
        let second = VehicleClaim::new(
            record.get(NAME_2).unwrap_or(""),
            parse_int(record, ID_2, line)?,
            parse_plate(record, CAR_ID_2, line)?,
        );
        let wants_second = field(record, ANOTHER_CAR) == self.vocabulary.yes;

        let (primary, secondary) = match kind {
            RequestKind::RegisterNew => (primary, wants_second.then_some(second)),
            RequestKind::ReplaceExisting => (
                primary
                    .with_target(parse_plate(record, CAR_TO_BE_REPLACED, line)?)
                    .with_replacement(parse_plate(record, CAR_TO_REPLACE, line)?),
                None,
            ),
            RequestKind::AddSecondCar => (primary, Some(second)),
            RequestKind::RemoveExisting => (
                primary.with_target(parse_plate(record, CAR_TO_REMOVE, line)?),
                None,
            ),
            RequestKind::Unhandled { .. } => (primary, None),
        };

        let apartment = parse_int(record, APT_NUMBER, line)?
            .map(u32::try_from)
            .transpose()
            .with_context(|| format!("line {}: apartment number out of range", line))?;

        debug!(line, kind = kind.name(), "normalized row");

        Ok(Request {
            timestamp,
            household_key,
            kind,
            primary: Some(primary),
            secondary,
            email: optional_text(record, EMAIL),
            apartment,
            source_line: Some(line),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
