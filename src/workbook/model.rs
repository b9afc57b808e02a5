// src/workbook/model.rs
// =============================================================================
// In-memory sheet/row/cell structure that the link extractor walks.
//
// The reader (xlsx.rs) builds it; the extractor never touches file formats.
// Cell coordinates use the usual spreadsheet notation: column letters
// followed by a 1-based row number ("B7").
// =============================================================================

/// A whole workbook, sheets in workbook order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    /// Rows top-to-bottom
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// 1-based row number
    pub index: u32,
    /// Cells left-to-right
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Coordinate such as "B7"
    pub reference: String,
    pub value: Option<CellValue>,
    /// Target of an embedded hyperlink, independent of the displayed value
    pub hyperlink: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// Formula error such as "#REF!"
    Error(String),
}

impl Cell {
    pub fn new(reference: impl Into<String>, value: Option<CellValue>) -> Self {
        Cell {
            reference: reference.into(),
            value,
            hyperlink: None,
        }
    }

    pub fn with_hyperlink(mut self, target: impl Into<String>) -> Self {
        self.hyperlink = Some(target.into());
        self
    }

    /// The cell value when it is a string (numbers and booleans are not).
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            Some(CellValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// The value rendered as text, empty for blank cells.
    pub fn display_text(&self) -> String {
        match &self.value {
            Some(CellValue::Text(s)) => s.clone(),
            Some(CellValue::Number(n)) => n.to_string(),
            Some(CellValue::Bool(b)) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            Some(CellValue::Error(e)) => e.clone(),
            None => String::new(),
        }
    }
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Sheet {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Puts a cell at its coordinate, keeping rows and cells sorted.
    /// A cell already at that coordinate is replaced.
    pub fn insert(&mut self, cell: Cell) {
        if let Some(slot) = self.cell_mut(&cell.reference) {
            *slot = cell;
        }
    }

    /// Mutable access to a cell, creating an empty one if needed.
    pub fn cell_mut(&mut self, reference: &str) -> Option<&mut Cell> {
        let (col, row) = parse_reference(reference)?;

        let row_pos = match self.rows.binary_search_by_key(&row, |r| r.index) {
            Ok(pos) => pos,
            Err(pos) => {
                self.rows.insert(pos, Row { index: row, cells: Vec::new() });
                pos
            }
        };

        let cells = &mut self.rows[row_pos].cells;
        let cell_pos = match cells.binary_search_by_key(&col, cell_column) {
            Ok(pos) => pos,
            Err(pos) => {
                cells.insert(pos, Cell::new(format_reference(col, row), None));
                pos
            }
        };
        Some(&mut cells[cell_pos])
    }

    pub fn get(&self, reference: &str) -> Option<&Cell> {
        let (col, row) = parse_reference(reference)?;
        let row_pos = self.rows.binary_search_by_key(&row, |r| r.index).ok()?;
        let cells = &self.rows[row_pos].cells;
        let cell_pos = cells.binary_search_by_key(&col, cell_column).ok()?;
        Some(&cells[cell_pos])
    }

    /// Bottom-right corner (column, row) of the cells present, if any.
    pub fn extent(&self) -> Option<(u32, u32)> {
        let last_row = self.rows.last()?.index;
        let last_col = self
            .rows
            .iter()
            .filter_map(|r| r.cells.last())
            .map(cell_column)
            .max()?;
        Some((last_col, last_row))
    }
}

fn cell_column(cell: &Cell) -> u32 {
    parse_reference(&cell.reference).map_or(0, |(col, _)| col)
}

/// Splits "B7" into (column 2, row 7). Both are 1-based.
/// Absolute markers ("$B$7") are accepted.
pub fn parse_reference(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.trim();
    let letters_end = reference
        .char_indices()
        .find(|(_, c)| !c.is_ascii_alphabetic() && *c != '$')
        .map(|(i, _)| i)?;
    let (letters, digits) = reference.split_at(letters_end);

    let mut col: u32 = 0;
    for c in letters.chars().filter(|c| *c != '$') {
        let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
    }
    let row: u32 = digits.trim_start_matches('$').parse().ok()?;

    if col == 0 || row == 0 {
        return None;
    }
    Some((col, row))
}

/// Column letters for a 1-based column number (1 -> "A", 27 -> "AA").
pub fn column_name(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}

pub fn format_reference(col: u32, row: u32) -> String {
    format!("{}{}", column_name(col), row)
}

/// Every coordinate in a range such as "A1:B2", row by row, cut off at
/// `limit` (column, row). A single coordinate yields itself, and the
/// range's first cell is always kept.
pub fn expand_range(range: &str, limit: (u32, u32)) -> Vec<String> {
    let (start, end) = match range.split_once(':') {
        Some((a, b)) => (a, b),
        None => (range, range),
    };
    let (Some((c1, r1)), Some((c2, r2))) = (parse_reference(start), parse_reference(end)) else {
        return Vec::new();
    };

    let (c_lo, r_lo) = (c1.min(c2), r1.min(r2));
    let c_hi = c1.max(c2).min(limit.0.max(c_lo));
    let r_hi = r1.max(r2).min(limit.1.max(r_lo));
    let mut out = Vec::new();
    for row in r_lo..=r_hi {
        for col in c_lo..=c_hi {
            out.push(format_reference(col, row));
        }
    }
    out
}
