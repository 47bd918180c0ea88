use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Reader};
use log::info;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("input file {0:?} does not exist")]
    Missing(PathBuf),
    #[error("column '{0}' not found in input file")]
    ColumnMissing(String),
    #[error("failed to read input file: {0}")]
    Read(String),
}

/// The full input table, every column preserved. Checkpoint snapshots
/// reproduce the whole table plus a results column, so nothing can be
/// dropped at load time.
#[derive(Debug)]
pub struct InputTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    link_idx: usize,
}

impl InputTable {
    /// Non-empty link cells, in row order.
    pub fn links(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| self.link_cell(row))
            .map(str::to_string)
            .collect()
    }

    /// The trimmed link cell of one row, if present and non-empty.
    pub fn link_cell<'a>(&self, row: &'a [String]) -> Option<&'a str> {
        row.get(self.link_idx)
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
    }
}

/// Load the spreadsheet. Extension decides the reader: `.xlsx`/`.xls` go
/// through calamine, everything else is treated as CSV.
pub fn load_table<P: AsRef<Path>>(path: P, link_column: &str) -> Result<InputTable, InputError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(InputError::Missing(path.to_path_buf()));
    }

    let is_excel = path
        .extension()
        .map_or(false, |ext| ext == "xlsx" || ext == "xls");

    let (headers, rows) = if is_excel {
        load_excel(path)?
    } else {
        load_csv(path)?
    };

    let link_idx = headers
        .iter()
        .position(|h| h.trim() == link_column)
        .ok_or_else(|| InputError::ColumnMissing(link_column.to_string()))?;

    info!("Loaded {} rows from {:?}", rows.len(), path);
    Ok(InputTable {
        headers,
        rows,
        link_idx,
    })
}

fn load_csv(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), InputError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| InputError::Read(e.to_string()))?;

    let headers = rdr
        .headers()
        .map_err(|e| InputError::Read(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| InputError::Read(e.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok((headers, rows))
}

// The auto opener picks the reader from the extension, so legacy .xls
// workbooks parse too.
fn load_excel(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), InputError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| InputError::Read(e.to_string()))?;

    let worksheets = workbook.worksheets();
    let (_name, range) = worksheets
        .first()
        .ok_or_else(|| InputError::Read("workbook has no sheets".to_string()))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = match rows_iter.next() {
        Some(header_row) => header_row.iter().map(|cell| cell.to_string()).collect(),
        None => Vec::new(),
    };
    let rows: Vec<Vec<String>> = rows_iter
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();

    Ok((headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_links_and_preserves_all_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "input.csv",
            "id,whatsAppLink,notes\n\
             1,https://chat.whatsapp.com/aaa,first\n\
             2,,empty link kept as row\n\
             3,https://chat.whatsapp.com/bbb,third\n",
        );

        let table = load_table(&path, "whatsAppLink").unwrap();
        assert_eq!(table.headers, vec!["id", "whatsAppLink", "notes"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(
            table.links(),
            vec![
                "https://chat.whatsapp.com/aaa".to_string(),
                "https://chat.whatsapp.com/bbb".to_string(),
            ]
        );
    }

    #[test]
    fn missing_file_is_a_structured_error() {
        let err = load_table("/nonexistent/input.csv", "whatsAppLink").unwrap_err();
        assert!(matches!(err, InputError::Missing(_)));
    }

    #[test]
    fn missing_column_is_a_structured_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "input.csv", "id,url\n1,https://chat.whatsapp.com/x\n");

        let err = load_table(&path, "whatsAppLink").unwrap_err();
        assert!(matches!(err, InputError::ColumnMissing(col) if col == "whatsAppLink"));
    }

    #[test]
    fn unreadable_excel_is_a_structured_error() {
        let dir = tempfile::tempdir().unwrap();
        // Routed to the legacy Excel reader by extension, but the content
        // is not a workbook at all.
        let path = dir.path().join("legacy.xls");
        std::fs::write(&path, b"id,whatsAppLink\n1,https://chat.whatsapp.com/x\n").unwrap();

        let err = load_table(&path, "whatsAppLink").unwrap_err();
        assert!(matches!(err, InputError::Read(_)));
    }

    #[test]
    fn short_rows_do_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "input.csv",
            "id,whatsAppLink\n1,https://chat.whatsapp.com/x\n2\n",
        );

        let table = load_table(&path, "whatsAppLink").unwrap();
        assert_eq!(table.links().len(), 1);
    }
}
