//! Contact file parsing: CSV, XLSX, JSON → raw records.
//!
//! Parsing stops at `RawContact` — classification is the pipeline's job.
//! Column headers are matched loosely (case-insensitive, a handful of
//! synonyms per role) so real-world exports map without configuration.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use calamine::{open_workbook, Reader, Xlsx};

use blastclaw_core::error::{BlastClawError, Result};
use blastclaw_core::types::RawContact;

/// Which contact field a column feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnRole {
    Phone,
    Name,
    Surname,
    Email,
    Birthday,
    Notes,
}

/// Map a header cell to a field role.
fn column_role(header: &str) -> Option<ColumnRole> {
    let h = header.trim().to_lowercase();
    if h.contains("phone") || h.contains("telefon") || h.contains("mobile") || h == "number" {
        Some(ColumnRole::Phone)
    } else if h.contains("surname") || h.contains("last") || h.contains("nachname") {
        Some(ColumnRole::Surname)
    } else if h.contains("name") || h.contains("first") {
        Some(ColumnRole::Name)
    } else if h.contains("mail") {
        Some(ColumnRole::Email)
    } else if h.contains("birth") || h.contains("geburtstag") {
        Some(ColumnRole::Birthday)
    } else if h.contains("note") || h.contains("comment") {
        Some(ColumnRole::Notes)
    } else {
        None
    }
}

/// First header wins per role.
fn map_headers(headers: &[String]) -> Vec<(usize, ColumnRole)> {
    let mut mapped = Vec::new();
    let mut taken = Vec::new();
    for (i, header) in headers.iter().enumerate() {
        if let Some(role) = column_role(header) {
            if !taken.contains(&role) {
                taken.push(role);
                mapped.push((i, role));
            }
        }
    }
    mapped
}

fn build_record(cells: &[String], columns: &[(usize, ColumnRole)]) -> RawContact {
    let mut record = RawContact::default();
    for (index, role) in columns {
        let Some(value) = cells.get(*index) else { continue };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match role {
            ColumnRole::Phone => record.phone_number = value.to_string(),
            ColumnRole::Name => record.name = value.to_string(),
            ColumnRole::Surname => record.surname = value.to_string(),
            ColumnRole::Email => record.email = Some(value.to_string()),
            ColumnRole::Birthday => record.birthday = Some(value.to_string()),
            ColumnRole::Notes => record.notes = Some(value.to_string()),
        }
    }
    record
}

/// Parse a contact file by extension (`csv`, `xlsx`, `json`).
pub fn parse_contacts_file(path: &Path, ext: &str) -> Result<Vec<RawContact>> {
    let records = match ext.trim_start_matches('.').to_lowercase().as_str() {
        "csv" | "txt" => parse_csv(path)?,
        "xlsx" | "xls" => parse_xlsx(path)?,
        "json" => parse_json(path)?,
        other => {
            return Err(BlastClawError::Parse(format!(
                "unsupported contact file extension: {other}"
            )));
        }
    };
    tracing::info!("Parsed {} record(s) from {}", records.len(), path.display());
    Ok(records)
}

/// Pick the delimiter that occurs most often in the header line.
fn sniff_delimiter(header_line: &str) -> u8 {
    [b',', b';', b'\t', b'|']
        .into_iter()
        .max_by_key(|d| header_line.matches(char::from(*d)).count())
        .unwrap_or(b',')
}

fn parse_csv(path: &Path) -> Result<Vec<RawContact>> {
    let mut file = File::open(path)?;
    let mut header_line = String::new();
    BufReader::new(&mut file).read_line(&mut header_line)?;
    let delimiter = sniff_delimiter(header_line.trim_end());
    file.seek(SeekFrom::Start(0))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| BlastClawError::Parse(format!("CSV header: {e}")))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let columns = map_headers(&headers);
    if !columns.iter().any(|(_, role)| *role == ColumnRole::Phone) {
        return Err(BlastClawError::Parse("no phone column found".into()));
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| BlastClawError::Parse(format!("CSV row: {e}")))?;
        let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        records.push(build_record(&cells, &columns));
    }
    Ok(records)
}

fn parse_xlsx(path: &Path) -> Result<Vec<RawContact>> {
    let mut workbook: Xlsx<BufReader<File>> = open_workbook(path)
        .map_err(|e| BlastClawError::Parse(format!("XLSX open: {e}")))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| BlastClawError::Parse("workbook has no sheets".into()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| BlastClawError::Parse(format!("XLSX sheet '{sheet_name}': {e}")))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| BlastClawError::Parse("worksheet is empty".into()))?
        .iter()
        .map(|c| c.to_string())
        .collect();
    let columns = map_headers(&headers);
    if !columns.iter().any(|(_, role)| *role == ColumnRole::Phone) {
        return Err(BlastClawError::Parse("no phone column found".into()));
    }

    let mut records = Vec::new();
    for row in rows {
        let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        records.push(build_record(&cells, &columns));
    }
    Ok(records)
}

fn parse_json(path: &Path) -> Result<Vec<RawContact>> {
    let mut content = String::new();
    File::open(path)?.read_to_string(&mut content)?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| BlastClawError::Parse(format!("JSON: {e}")))?;
    let items = value
        .as_array()
        .ok_or_else(|| BlastClawError::Parse("expected a top-level JSON array".into()))?;

    let mut records = Vec::new();
    for item in items {
        let field = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .find_map(|k| item[k].as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        records.push(RawContact {
            phone_number: field(&["phoneNumber", "phone", "number"]).unwrap_or_default(),
            name: field(&["name", "firstName"]).unwrap_or_default(),
            surname: field(&["surname", "lastName"]).unwrap_or_default(),
            email: field(&["email"]),
            birthday: field(&["birthday"]),
            notes: field(&["notes"]),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("blastclaw-parser-test");
        std::fs::create_dir_all(&dir).ok();
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_column_roles() {
        assert_eq!(column_role("Phone Number"), Some(ColumnRole::Phone));
        assert_eq!(column_role("Telefonnummer"), Some(ColumnRole::Phone));
        assert_eq!(column_role("Last Name"), Some(ColumnRole::Surname));
        assert_eq!(column_role("First Name"), Some(ColumnRole::Name));
        assert_eq!(column_role("E-Mail"), Some(ColumnRole::Email));
        assert_eq!(column_role("whatever"), None);
    }

    #[test]
    fn test_csv_with_semicolons() {
        let path = write_temp(
            "semi.csv",
            "Name;Phone;Email\nAda;+49 170 1;ada@example.com\nBob;+49 170 2;\n",
        );
        let records = parse_contacts_file(&path, "csv").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Ada");
        assert_eq!(records[0].phone_number, "+49 170 1");
        assert_eq!(records[0].email.as_deref(), Some("ada@example.com"));
        assert_eq!(records[1].email, None);
    }

    #[test]
    fn test_csv_without_phone_column_fails() {
        let path = write_temp("nophone.csv", "Name,Email\nAda,a@b.c\n");
        let err = parse_contacts_file(&path, "csv").unwrap_err();
        assert_eq!(err.code(), "PARSE");
    }

    #[test]
    fn test_json_field_synonyms() {
        let path = write_temp(
            "contacts.json",
            r#"[
                {"phoneNumber": "5551", "name": "Ada", "lastName": "L"},
                {"phone": "5552", "firstName": "Bob", "notes": "vip"}
            ]"#,
        );
        let records = parse_contacts_file(&path, ".json").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].surname, "L");
        assert_eq!(records[1].phone_number, "5552");
        assert_eq!(records[1].name, "Bob");
        assert_eq!(records[1].notes.as_deref(), Some("vip"));
    }

    #[test]
    fn test_unknown_extension() {
        let path = write_temp("x.pdf", "");
        assert!(parse_contacts_file(&path, "pdf").is_err());
    }
}
