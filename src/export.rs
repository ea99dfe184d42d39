// 📤 CSV Export - Allow-list, review reports, anomaly log
// Each writer has a path variant and a generic io::Write variant (used by tests).

use crate::anomaly::Anomaly;
use crate::registry::RegistryEntry;
use crate::report::{lpr_rows, NewHousehold};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// ROW SHAPES
// ============================================================================

/// Full registry row, same column names as the cars database
#[derive(Debug, Serialize)]
struct CarRow<'a> {
    ts: String,
    email: Option<&'a str>,
    surname: &'a str,
    street: &'a str,
    home_number: &'a str,
    apt_number: Option<u32>,
    name: &'a str,
    id: Option<i64>,
    car_id: u64,
}

impl<'a> From<&'a RegistryEntry> for CarRow<'a> {
    fn from(e: &'a RegistryEntry) -> Self {
        CarRow {
            ts: format_ts(e.timestamp),
            email: e.email.as_deref(),
            surname: &e.household_key.surname,
            street: &e.household_key.street,
            home_number: &e.household_key.house_number,
            apt_number: e.apartment,
            name: &e.owner_name,
            id: e.owner_id,
            car_id: e.plate_id.0,
        }
    }
}

#[derive(Debug, Serialize)]
struct NewHouseholdRow<'a> {
    surname: &'a str,
    street: &'a str,
    home_number: &'a str,
    first_seen: String,
}

#[derive(Debug, Serialize)]
struct AnomalyRow<'a> {
    sequence: usize,
    submitted_at: String,
    source_line: Option<usize>,
    household: &'a str,
    kind: &'static str,
    detail: &'a str,
}

fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

// ============================================================================
// WRITERS
// ============================================================================

fn write_rows<W: Write, S: Serialize>(writer: W, rows: impl IntoIterator<Item = S>) -> Result<usize> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    let mut count = 0;
    for row in rows {
        csv_writer.serialize(row).context("Failed to write CSV row")?;
        count += 1;
    }
    csv_writer.flush().context("Failed to flush CSV output")?;
    Ok(count)
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("Failed to create file: {}", path.display()))
}

/// car_id,name,surname,full_name sorted by surname
pub fn write_lpr<W: Write>(writer: W, entries: &[RegistryEntry]) -> Result<usize> {
    write_rows(writer, lpr_rows(entries))
}

pub fn write_cars<W: Write>(writer: W, entries: &[&RegistryEntry]) -> Result<usize> {
    write_rows(writer, entries.iter().map(|e| CarRow::from(*e)))
}

pub fn write_new_households<W: Write>(writer: W, households: &[NewHousehold]) -> Result<usize> {
    write_rows(
        writer,
        households.iter().map(|h| NewHouseholdRow {
            surname: &h.household.surname,
            street: &h.household.street,
            home_number: &h.household.house_number,
            first_seen: format_ts(h.first_seen),
        }),
    )
}

pub fn write_anomalies<W: Write>(writer: W, anomalies: &[Anomaly]) -> Result<usize> {
    write_rows(
        writer,
        anomalies.iter().map(|a| AnomalyRow {
            sequence: a.request.sequence,
            submitted_at: format_ts(a.request.submitted_at),
            source_line: a.request.source_line,
            household: &a.request.household,
            kind: a.kind.as_str(),
            detail: &a.detail,
        }),
    )
}

pub fn export_lpr(path: &Path, entries: &[RegistryEntry]) -> Result<usize> {
    let count = write_lpr(create(path)?, entries)?;
    info!(path = %path.display(), rows = count, "wrote LPR allow-list");
    Ok(count)
}

pub fn export_cars(path: &Path, entries: &[&RegistryEntry]) -> Result<usize> {
    let count = write_cars(create(path)?, entries)?;
    info!(path = %path.display(), rows = count, "wrote cars report");
    Ok(count)
}

pub fn export_new_households(path: &Path, households: &[NewHousehold]) -> Result<usize> {
    let count = write_new_households(create(path)?, households)?;
    info!(path = %path.display(), rows = count, "wrote new households report");
    Ok(count)
}

pub fn export_anomalies(path: &Path, anomalies: &[Anomaly]) -> Result<usize> {
    let count = write_anomalies(create(path)?, anomalies)?;
    info!(path = %path.display(), rows = count, "wrote anomaly log");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyKind;
    use crate::request::{HouseholdKey, PlateId, RequestRef};
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 6, 2)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap()
    }

    fn entry() -> RegistryEntry {
        RegistryEntry {
            timestamp: ts(),
            household_key: HouseholdKey::new("Doe", "Oak", "4"),
            owner_name: "Jane".to_string(),
            owner_id: Some(123),
            plate_id: PlateId(1234567),
            email: None,
            apartment: Some(7),
        }
    }

    fn render<F: FnOnce(&mut Vec<u8>) -> Result<usize>>(f: F) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_lpr_format() {
        let out = render(|buf| write_lpr(buf, &[entry()]));
        assert_eq!(out, "car_id,name,surname,full_name\n1234567,Jane,Doe,Jane Doe\n");
    }

    #[test]
    fn test_cars_format() {
        let e = entry();
        let out = render(|buf| write_cars(buf, &[&e]));
        assert_eq!(
            out,
            "ts,email,surname,street,home_number,apt_number,name,id,car_id\n\
             2022-06-02 14:05:00,,Doe,Oak,4,7,Jane,123,1234567\n"
        );
    }

    #[test]
    fn test_new_households_format() {
        let households = vec![NewHousehold {
            household: HouseholdKey::new("Doe", "Oak", "4"),
            first_seen: ts(),
        }];
        let out = render(|buf| write_new_households(buf, &households));
        assert_eq!(
            out,
            "surname,street,home_number,first_seen\nDoe,Oak,4,2022-06-02 14:05:00\n"
        );
    }

    #[test]
    fn test_anomalies_format() {
        let anomaly = Anomaly::new(
            RequestRef {
                sequence: 3,
                submitted_at: ts(),
                source_line: Some(5),
                household: "Doe, Oak 4".to_string(),
            },
            AnomalyKind::TargetNotFound,
            "plate 9 not found",
        );
        let out = render(|buf| write_anomalies(buf, &[anomaly]));
        assert_eq!(
            out,
            "sequence,submitted_at,source_line,household,kind,detail\n\
             3,2022-06-02 14:05:00,5,\"Doe, Oak 4\",target_not_found,plate 9 not found\n"
        );
    }
}
