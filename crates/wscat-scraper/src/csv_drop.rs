//! Reader for supplier CSV drop directories.
//!
//! Suppliers drop `*.csv` files into a directory; each file is a full or
//! partial product list. Files are read in name order so later drops win when
//! the same SKU appears twice. IO here is synchronous; async callers wrap it
//! in `spawn_blocking`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::ScraperError;
use crate::types::CsvProductRow;

const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

/// One parsed row with enough provenance to log it.
#[derive(Debug, Clone)]
pub struct CsvDropRecord {
    pub file: String,
    pub line: u64,
    pub file_modified_at: DateTime<Utc>,
    pub row: CsvProductRow,
}

/// Everything read from a drop directory in one pass.
#[derive(Debug, Default)]
pub struct CsvDropBatch {
    pub rows: Vec<CsvDropRecord>,
    /// Rows the CSV layer could not decode at all (wrong field count etc.).
    pub malformed_rows: usize,
    pub files: Vec<String>,
}

/// Picks the most frequent of `,` `;` and tab in a header line.
/// Ties and lines with none of them fall back to `,`.
#[must_use]
pub fn sniff_delimiter(line: &str) -> u8 {
    let mut best = b',';
    let mut best_count = 0usize;
    for delimiter in CANDIDATE_DELIMITERS {
        let count = line.bytes().filter(|b| *b == delimiter).count();
        if count > best_count {
            best = delimiter;
            best_count = count;
        }
    }
    best
}

#[derive(Debug, Clone)]
pub struct CsvDropReader {
    dir: PathBuf,
}

impl CsvDropReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reads every `*.csv` file in the directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::CsvIo`] when the directory or a file cannot be
    /// read and [`ScraperError::Csv`] when a file's header row is unusable.
    pub fn read_all(&self) -> Result<CsvDropBatch, ScraperError> {
        self.read_filtered(None)
    }

    /// Reads only files modified at or after `since`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_all`].
    pub fn read_changed_since(&self, since: DateTime<Utc>) -> Result<CsvDropBatch, ScraperError> {
        self.read_filtered(Some(since))
    }

    fn read_filtered(&self, since: Option<DateTime<Utc>>) -> Result<CsvDropBatch, ScraperError> {
        let mut batch = CsvDropBatch::default();
        for (path, modified_at) in self.list_files()? {
            if since.is_some_and(|since| modified_at < since) {
                continue;
            }
            read_file(&path, modified_at, &mut batch)?;
            batch.files.push(path.display().to_string());
        }
        Ok(batch)
    }

    fn list_files(&self) -> Result<Vec<(PathBuf, DateTime<Utc>)>, ScraperError> {
        let io_err = |source| ScraperError::CsvIo {
            path: self.dir.display().to_string(),
            source,
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let path = entry.path();
            let is_csv = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if !is_csv || !path.is_file() {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(|source| ScraperError::CsvIo {
                    path: path.display().to_string(),
                    source,
                })?;
            files.push((path, DateTime::<Utc>::from(modified)));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }
}

fn read_file(
    path: &Path,
    modified_at: DateTime<Utc>,
    batch: &mut CsvDropBatch,
) -> Result<(), ScraperError> {
    let file_label = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| ScraperError::CsvIo {
        path: file_label.clone(),
        source,
    })?;
    let first_line = content.lines().next().unwrap_or_default();

    let mut reader = ReaderBuilder::new()
        .delimiter(sniff_delimiter(first_line))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let headers: StringRecord = reader
        .headers()
        .map_err(|source| ScraperError::Csv {
            path: file_label.clone(),
            source,
        })?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
        .collect();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(file = %file_label, error = %e, "skipping unreadable CSV row");
                batch.malformed_rows += 1;
                continue;
            }
        };
        let line = record.position().map_or(0, csv::Position::line);

        // Concatenated exports repeat the header mid-file.
        if is_header_repeat(&record, &headers) || record.iter().all(str::is_empty) {
            continue;
        }

        match record.deserialize::<CsvProductRow>(Some(&headers)) {
            Ok(row) => batch.rows.push(CsvDropRecord {
                file: file_label.clone(),
                line,
                file_modified_at: modified_at,
                row,
            }),
            Err(e) => {
                tracing::warn!(file = %file_label, line, error = %e, "skipping malformed CSV row");
                batch.malformed_rows += 1;
            }
        }
    }
    Ok(())
}

fn is_header_repeat(record: &StringRecord, headers: &StringRecord) -> bool {
    record.len() == headers.len()
        && record
            .iter()
            .zip(headers.iter())
            .all(|(cell, header)| cell.eq_ignore_ascii_case(header))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut file = fs::File::create(dir.join(name)).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn sniffs_semicolon_and_tab() {
        assert_eq!(sniff_delimiter("sku;name;price"), b';');
        assert_eq!(sniff_delimiter("sku\tname\tprice"), b'\t');
        assert_eq!(sniff_delimiter("sku,name,price"), b',');
        assert_eq!(sniff_delimiter("sku"), b',');
    }

    #[test]
    fn reads_aliased_headers_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "drop.csv",
            "Product_SKU,Title,Vendor,Price,Qty,Type,Image_URL,Flavor\n\
             AC-1,Acme Whey 900g Vanilla,Acme,£29.99,12,Protein,https://img/1.jpg,Vanilla\n",
        );

        let batch = CsvDropReader::new(dir.path()).read_all().unwrap();
        assert_eq!(batch.rows.len(), 1);
        let row = &batch.rows[0].row;
        assert_eq!(row.sku.as_deref(), Some("AC-1"));
        assert_eq!(row.name.as_deref(), Some("Acme Whey 900g Vanilla"));
        assert_eq!(row.brand.as_deref(), Some("Acme"));
        assert_eq!(row.stock.as_deref(), Some("12"));
        assert_eq!(row.category.as_deref(), Some("Protein"));
        assert_eq!(row.flavour.as_deref(), Some("Vanilla"));
        assert_eq!(batch.rows[0].line, 2);
    }

    #[test]
    fn semicolon_file_with_repeated_header_and_blank_cells() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "drop.csv",
            "sku;name;price;description\n\
             A;Oat Bar;1,50;\n\
             sku;name;price;description\n\
             B;Rice Cake;2,00;Crunchy\n",
        );

        let batch = CsvDropReader::new(dir.path()).read_all().unwrap();
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[0].row.price.as_deref(), Some("1,50"));
        assert!(batch.rows[0].row.description.is_none());
        assert_eq!(batch.rows[1].row.description.as_deref(), Some("Crunchy"));
    }

    #[test]
    fn files_are_read_in_name_order_and_non_csv_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "b.csv", "sku,name\nB,Second\n");
        write_file(dir.path(), "a.CSV", "sku,name\nA,First\n");
        write_file(dir.path(), "notes.txt", "sku,name\nX,Ignored\n");

        let batch = CsvDropReader::new(dir.path()).read_all().unwrap();
        let skus: Vec<_> = batch
            .rows
            .iter()
            .filter_map(|r| r.row.sku.as_deref())
            .collect();
        assert_eq!(skus, vec!["A", "B"]);
        assert_eq!(batch.files.len(), 2);
    }

    #[test]
    fn changed_since_skips_older_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "old.csv", "sku,name\nA,Old\n");

        let future = Utc::now() + chrono::Duration::hours(1);
        let batch = CsvDropReader::new(dir.path())
            .read_changed_since(future)
            .unwrap();
        assert!(batch.rows.is_empty());
        assert!(batch.files.is_empty());
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CsvDropReader::new(dir.path().join("absent"))
            .read_all()
            .unwrap_err();
        assert!(matches!(err, ScraperError::CsvIo { .. }));
    }
}
