use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};

/// Two-column `name,alias` CSV with a header row, used for lecturer and
/// room display names. Rows keep their file order; a missing file is an
/// empty table.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: Vec<(String, String)>,
}

impl AliasTable {
    pub fn load(path: &Path) -> Result<AliasTable> {
        if !path.exists() {
            return Ok(AliasTable::default());
        }
        let file =
            fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let table = Self::from_reader(file)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        for (i, (name, _)) in table.entries.iter().enumerate() {
            if table.entries[..i].iter().any(|(other, _)| other == name) {
                println!(
                    "duplicate alias entry for '{}' in {}; keeping the last one.",
                    name,
                    path.display()
                );
            }
        }
        Ok(table)
    }

    pub(crate) fn from_reader<R: Read>(reader: R) -> Result<AliasTable> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut entries = Vec::new();
        for result in csv_reader.records() {
            let record = result?;
            let name = record.get(0).unwrap_or("").to_string();
            if name.is_empty() {
                continue;
            }
            let alias = record.get(1).unwrap_or("").trim().to_string();
            // An empty alias column means the canonical name is fine as is.
            let alias = if alias.is_empty() { name.clone() } else { alias };
            entries.push((name, alias));
        }
        Ok(AliasTable { entries })
    }

    /// The alias for `name`; the name itself when no row matches. With
    /// duplicate rows the most recent one wins.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.entries
            .iter()
            .rev()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, alias)| alias.as_str())
            .unwrap_or(name)
    }

    /// Appends any name not yet in the table, aliased to itself. Returns
    /// how many were added.
    pub fn merge<'a, I>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut added = 0;
        for name in names {
            if !self.entries.iter().any(|(entry_name, _)| entry_name == name) {
                self.entries.push((name.to_string(), name.to_string()));
                added += 1;
            }
        }
        added
    }

    /// Rewrites the whole file, header first, preserving entry order.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            fs::File::create(path).with_context(|| format!("failed to write {}", path.display()))?;
        self.write_to(file)
    }

    fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(["name", "alias"])?;
        for (name, alias) in &self.entries {
            csv_writer.write_record([name, alias])?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> AliasTable {
        AliasTable::from_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn resolves_known_and_unknown_names() {
        let table = table("name,alias\nProf. Dr. A. Miller,Miller\n");
        assert_eq!(table.resolve("Prof. Dr. A. Miller"), "Miller");
        assert_eq!(table.resolve("Somebody Else"), "Somebody Else");
    }

    #[test]
    fn empty_alias_column_falls_back_to_the_name() {
        let table = table("name,alias\nAudimax,\n");
        assert_eq!(table.resolve("Audimax"), "Audimax");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn most_recent_duplicate_wins() {
        let table = table("name,alias\nMiller,Old\nMiller,New\n");
        assert_eq!(table.resolve("Miller"), "New");
    }

    #[test]
    fn merge_appends_only_new_names() {
        let mut table = table("name,alias\nMiller,M.\n");
        let added = table.merge(["Miller", "Schmidt", "Schmidt"]);
        assert_eq!(added, 1);
        assert_eq!(table.resolve("Miller"), "M.");
        assert_eq!(table.resolve("Schmidt"), "Schmidt");
    }

    #[test]
    fn rewrite_preserves_prior_rows_and_appends_new_ones() {
        let mut table = table("name,alias\nMiller,M.\nAudimax,Big Hall\n");
        table.merge(["Seminar Room 2"]);

        let mut buffer = Vec::new();
        table.write_to(&mut buffer).unwrap();
        let written = String::from_utf8(buffer).unwrap();
        assert_eq!(
            written,
            "name,alias\nMiller,M.\nAudimax,Big Hall\nSeminar Room 2,Seminar Room 2\n"
        );
    }

    #[test]
    fn missing_file_is_an_empty_table() {
        let table = AliasTable::load(Path::new("does/not/exist.csv")).unwrap();
        assert!(table.is_empty());
    }
}
