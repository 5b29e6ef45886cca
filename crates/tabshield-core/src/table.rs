use crate::error::{SearchError, SearchResult};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
    /// Sensitive cell that must be protected (`u`).
    Primary,
    /// Cell that may be chosen for secondary suppression (`s`).
    Candidate,
    Other(char),
}

impl CellStatus {
    pub fn from_flag(flag: char) -> Self {
        match flag {
            'u' | 'U' => CellStatus::Primary,
            's' | 'S' => CellStatus::Candidate,
            other => CellStatus::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellRecord {
    pub index: u64,
    pub status: CellStatus,
    /// Loss-of-information weight.
    pub weight: f64,
}

#[derive(Debug, Deserialize)]
struct CellRow {
    index: u64,
    status: String,
    weight: f64,
}

/// The slice of a table the search needs: cell count, status flags and weights.
#[derive(Debug, Clone, Default)]
pub struct CellTable {
    pub cells: Vec<CellRecord>,
}

impl CellTable {
    /// Loads a cell summary CSV with an `index,status,weight` header.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> SearchResult<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> SearchResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut cells = Vec::new();
        for row in rdr.deserialize() {
            let row: CellRow = row?;
            let flag = row.status.chars().next().ok_or_else(|| {
                SearchError::Config(format!("Cell {} has an empty status flag", row.index))
            })?;
            if !row.weight.is_finite() || row.weight < 0.0 {
                return Err(SearchError::Config(format!(
                    "Cell {} has invalid weight {}",
                    row.index, row.weight
                )));
            }
            cells.push(CellRecord {
                index: row.index,
                status: CellStatus::from_flag(flag),
                weight: row.weight,
            });
        }

        Ok(Self { cells })
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn primary_cells(&self) -> impl Iterator<Item = &CellRecord> {
        self.cells
            .iter()
            .filter(|c| c.status == CellStatus::Primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_load_summary() {
        let data = "index,status,weight\n0,s,4.0\n1,u,10.5\n2, u ,2\n3,z,1\n";
        let table = CellTable::from_reader(Cursor::new(data)).unwrap();

        assert_eq!(table.cell_count(), 4);
        let primaries: Vec<u64> = table.primary_cells().map(|c| c.index).collect();
        assert_eq!(primaries, vec![1, 2]);
        assert_eq!(table.cells[3].status, CellStatus::Other('z'));
    }

    #[test]
    fn test_rejects_negative_weight() {
        let data = "index,status,weight\n0,u,-1\n";
        assert!(matches!(
            CellTable::from_reader(Cursor::new(data)),
            Err(SearchError::Config(_))
        ));
    }
}
