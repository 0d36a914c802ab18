use serde::{Deserialize, Serialize};

use crate::aspect::AspectKind;
use crate::types::{NOT_APPLICABLE, UNKNOWN_MARKER};

/// Counts of (predicted, gold) pairs for one aspect.
///
/// Rows are predicted tags plus the unknown marker; columns are gold tags plus
/// the not-applicable tag. Gold characters outside both are added as extra
/// columns the first time they are seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    rows: Vec<char>,
    columns: Vec<char>,
    counts: Vec<Vec<usize>>,
}

/// A rendered matrix: one line per predicted tag, each cell either a raw count
/// or a percentage of the row total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionTable {
    pub cells: CellUnit,
    pub columns: Vec<char>,
    pub rows: Vec<(char, Vec<f64>)>,
}

/// What the cells of a [`ConfusionTable`] hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellUnit {
    Count,
    Percent,
}

impl ConfusionMatrix {
    pub fn new(aspect: AspectKind) -> Self {
        let mut rows = aspect.tags().to_vec();
        rows.push(UNKNOWN_MARKER);
        let mut columns = aspect.tags().to_vec();
        columns.push(NOT_APPLICABLE);
        let counts = vec![vec![0; columns.len()]; rows.len()];
        Self {
            rows,
            columns,
            counts,
        }
    }

    /// Records one token. Predictions outside the row labels are ignored.
    pub fn record(&mut self, predicted: char, gold: char) {
        let Some(row) = self.rows.iter().position(|&r| r == predicted) else {
            return;
        };
        let col = match self.columns.iter().position(|&c| c == gold) {
            Some(col) => col,
            None => {
                self.columns.push(gold);
                for counts in &mut self.counts {
                    counts.push(0);
                }
                self.columns.len() - 1
            }
        };
        self.counts[row][col] += 1;
    }

    pub fn count(&self, predicted: char, gold: char) -> usize {
        let row = self.rows.iter().position(|&r| r == predicted);
        let col = self.columns.iter().position(|&c| c == gold);
        match (row, col) {
            (Some(row), Some(col)) => self.counts[row][col],
            _ => 0,
        }
    }

    pub fn row_total(&self, predicted: char) -> usize {
        self.rows
            .iter()
            .position(|&r| r == predicted)
            .map_or(0, |row| self.counts[row].iter().sum())
    }

    pub fn merge(&mut self, other: &ConfusionMatrix) {
        for (r, &predicted) in other.rows.iter().enumerate() {
            for (c, &gold) in other.columns.iter().enumerate() {
                for _ in 0..other.counts[r][c] {
                    self.record(predicted, gold);
                }
            }
        }
    }

    /// Row-normalised percentages. Rows with no predictions are left out.
    pub fn percentages(&self) -> ConfusionTable {
        self.table(CellUnit::Percent, |c, total| 100.0 * c as f64 / total as f64)
    }

    /// Raw counts. Rows with no predictions are left out.
    pub fn counts(&self) -> ConfusionTable {
        self.table(CellUnit::Count, |c, _| c as f64)
    }

    fn table(&self, cells: CellUnit, cell: impl Fn(usize, usize) -> f64) -> ConfusionTable {
        let rows = self
            .rows
            .iter()
            .zip(&self.counts)
            .filter_map(|(&label, counts)| {
                let total: usize = counts.iter().sum();
                (total > 0).then(|| (label, counts.iter().map(|&c| cell(c, total)).collect()))
            })
            .collect();
        ConfusionTable {
            cells,
            columns: self.columns.clone(),
            rows,
        }
    }
}

impl ConfusionTable {
    /// Plain-text table: integers for counts, two decimals for percentages.
    pub fn render(&self) -> String {
        let mut out = String::from("pred\\gold");
        for c in &self.columns {
            out.push_str(&format!("{c:>8}"));
        }
        out.push('\n');
        for (label, cells) in &self.rows {
            out.push_str(&format!("{label:<9}"));
            for v in cells {
                match self.cells {
                    CellUnit::Count => out.push_str(&format!("{:>8}", *v as usize)),
                    CellUnit::Percent => out.push_str(&format!("{:>7.2}%", v)),
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_percentages() {
        let mut matrix = ConfusionMatrix::new(AspectKind::Pos);
        matrix.record('n', 'n');
        matrix.record('n', 'n');
        matrix.record('n', 'a');
        matrix.record('-', '_');

        assert_eq!(matrix.count('n', 'n'), 2);
        assert_eq!(matrix.row_total('n'), 3);

        let table = matrix.percentages();
        assert_eq!(table.rows.len(), 2);
        let (label, cells) = &table.rows[0];
        assert_eq!(*label, 'n');
        let n_col = table.columns.iter().position(|&c| c == 'n').unwrap();
        assert!((cells[n_col] - 200.0 / 3.0).abs() < 1e-9);
        assert!(table.render().contains("66.67%"));
    }

    #[test]
    fn test_raw_counts_table() {
        let mut matrix = ConfusionMatrix::new(AspectKind::Pos);
        matrix.record('n', 'n');
        matrix.record('n', 'n');
        matrix.record('n', 'a');
        matrix.record('v', 'v');

        let table = matrix.counts();
        assert_eq!(table.cells, CellUnit::Count);
        assert_eq!(table.rows.len(), 2);
        let n_col = table.columns.iter().position(|&c| c == 'n').unwrap();
        let a_col = table.columns.iter().position(|&c| c == 'a').unwrap();
        let (label, cells) = &table.rows[0];
        assert_eq!(*label, 'n');
        assert_eq!((cells[n_col], cells[a_col]), (2.0, 1.0));

        let rendered = table.render();
        assert!(!rendered.contains('%'));
        let n_line = rendered.lines().find(|l| l.starts_with('n')).unwrap();
        let values: Vec<&str> = n_line.split_whitespace().skip(1).collect();
        assert_eq!(values[n_col], "2");
        assert_eq!(values[a_col], "1");
    }

    #[test]
    fn test_unexpected_gold_adds_column() {
        let mut matrix = ConfusionMatrix::new(AspectKind::Degree);
        matrix.record('p', 'x');
        assert_eq!(matrix.count('p', 'x'), 1);
        assert_eq!(matrix.percentages().columns.last(), Some(&'x'));
    }

    #[test]
    fn test_merge() {
        let mut a = ConfusionMatrix::new(AspectKind::Pos);
        let mut b = ConfusionMatrix::new(AspectKind::Pos);
        a.record('v', 'v');
        b.record('v', 'n');
        a.merge(&b);
        assert_eq!(a.row_total('v'), 2);
    }
}
