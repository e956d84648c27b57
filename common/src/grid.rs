/// A coarse 2-D activity histogram over a camera's field of view.
///
/// Cells are stored row-major. The grid is immutable once built; a new
/// heatmap replaces the old grid wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityGrid {
    rows: usize,
    cols: usize,
    cells: Vec<f64>,
}

impl ActivityGrid {
    /// Build a grid from nested rows as returned by `GET /heatmap/{id}`.
    ///
    /// An empty outer vector, or rows that are all empty, give an empty grid.
    /// Rows of differing lengths are rejected.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, GridError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if cols == 0 {
            if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| !r.is_empty()) {
                return Err(GridError::Ragged {
                    row,
                    expected: 0,
                    got: r.len(),
                });
            }
            return Ok(Self::empty());
        }

        let mut cells = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(GridError::Ragged {
                    row: i,
                    expected: cols,
                    got: row.len(),
                });
            }
            cells.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            cells,
        })
    }

    /// Build a grid by evaluating `f(row, col)` for every cell.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        if rows == 0 || cols == 0 {
            return Self::empty();
        }
        let mut cells = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                cells.push(f(i, j));
            }
        }
        Self { rows, cols, cells }
    }

    pub fn empty() -> Self {
        Self {
            rows: 0,
            cols: 0,
            cells: Vec::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.cells[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        (row < self.rows).then(|| &self.cells[row * self.cols..(row + 1) * self.cols])
    }

    /// Iterate `(row, col, value)` in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let cols = self.cols;
        self.cells
            .iter()
            .enumerate()
            .map(move |(idx, &v)| (idx / cols, idx % cols, v))
    }

    pub fn max_value(&self) -> Option<f64> {
        self.cells.iter().copied().reduce(f64::max)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("grid row {row} has {got} cells, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        got: usize,
    },
}
