use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// One row of the course selection CSV. `name` is the expected course name
/// used for the comparison sheet; `short_name` overrides the display name
/// in the timetable. `exercise` and `lab` mark supplementary session types
/// evaluated together with the lecture.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestRow {
    pub no: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub exercise: String,
    #[serde(default)]
    pub lab: String,
    #[serde(default)]
    pub exclude: String,
}

fn flag_set(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "x" | "y" | "yes" | "true"
    )
}

impl ManifestRow {
    pub fn excluded(&self) -> bool {
        flag_set(&self.exclude)
    }

    pub fn has_exercise(&self) -> bool {
        flag_set(&self.exercise)
    }

    pub fn has_lab(&self) -> bool {
        flag_set(&self.lab)
    }

    /// Short name wins over the fetched name; session flags decorate it.
    pub fn display_name(&self, fetched_name: &str) -> String {
        let mut name = if self.short_name.trim().is_empty() {
            fetched_name.to_string()
        } else {
            self.short_name.trim().to_string()
        };
        if self.has_exercise() {
            name.push_str(" + exercise");
        }
        if self.has_lab() {
            name.push_str(" + lab");
        }
        name
    }
}

pub fn load_manifest(path: &Path) -> Result<Vec<ManifestRow>> {
    let file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    rows_from_reader(file).with_context(|| format!("failed to parse {}", path.display()))
}

fn rows_from_reader<R: Read>(reader: R) -> Result<Vec<ManifestRow>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for result in csv_reader.deserialize::<ManifestRow>() {
        rows.push(result?);
    }
    Ok(rows)
}

/// Course numbers to fetch and load, in manifest order.
pub fn included_numbers(rows: &[ManifestRow]) -> Vec<i64> {
    rows.iter()
        .filter(|row| !row.excluded())
        .map(|row| row.no)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
no,name,short_name,category,exercise,lab,exclude
4010031,Experimental Physics A,ExPhys A,compulsory,x,,
4010111,Linear Algebra I,,compulsory,,,x
4010011,Programming,Prog,elective,,1,
";

    #[test]
    fn rows_parse_with_flags() {
        let rows = rows_from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].has_exercise());
        assert!(!rows[0].excluded());
        assert!(rows[1].excluded());
        assert!(rows[2].has_lab());
    }

    #[test]
    fn excluded_rows_are_not_selected() {
        let rows = rows_from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(included_numbers(&rows), vec![4010031, 4010011]);
    }

    #[test]
    fn display_name_prefers_short_name_and_appends_markers() {
        let rows = rows_from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            rows[0].display_name("Experimentalphysik A"),
            "ExPhys A + exercise"
        );
        assert_eq!(rows[1].display_name("Lineare Algebra I"), "Lineare Algebra I");
        assert_eq!(rows[2].display_name("Programmieren"), "Prog + lab");
    }
}
