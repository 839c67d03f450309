//! Fixed-width report parsing.
//!
//! `vcd search` prints its results as a human-readable table:
//!
//! ```text
//! Found 1 record(s)
//! name    containerName    isVAppTemplate
//! ------  ---------------  ----------------
//! web01   vapp-web01       False
//! ```
//!
//! The first line is a banner, the second holds the column names and the
//! third underlines each column with a group of hyphens. Each column is as
//! wide as its hyphen group plus one space of padding on either side.

use std::fmt;

use crate::error::{Error, Result};

/// A single column in a fixed-width report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name from the header line.
    pub name: String,
    /// Character offset where the column starts.
    pub start: usize,
    /// Width of the column in characters, padding included.
    pub width: usize,
}

/// Ordered column layout of a fixed-width report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: Vec<Column>,
}

impl ColumnLayout {
    /// Derive the layout from a header line and its hyphen underline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if the number of header names does not match
    /// the number of hyphen groups.
    pub fn from_lines(header: &str, separator: &str) -> Result<Self> {
        let names: Vec<&str> = header.split_whitespace().collect();
        let groups: Vec<&str> = separator.split_whitespace().collect();

        if names.len() != groups.len() {
            return Err(Error::format(format!(
                "header has {} column names but separator has {} hyphen groups",
                names.len(),
                groups.len()
            )));
        }

        let mut start = 0;
        let columns = names
            .into_iter()
            .zip(groups)
            .map(|(name, group)| {
                let width = group.chars().count() + 2;
                let column = Column {
                    name: name.to_string(),
                    start,
                    width,
                };
                start += width;
                column
            })
            .collect();

        Ok(Self { columns })
    }

    /// The columns, in header order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the layout has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Slice a data row into a record.
    ///
    /// Cells past the end of the row are empty.
    pub fn slice_row(&self, row: &str) -> Record {
        let chars: Vec<char> = row.chars().collect();
        let fields = self
            .columns
            .iter()
            .map(|column| {
                let start = column.start.min(chars.len());
                let end = (column.start + column.width).min(chars.len());
                let cell: String = chars[start..end].iter().collect();
                (column.name.clone(), cell.trim().to_string())
            })
            .collect();
        Record { fields }
    }
}

/// One data row of a report, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// Build a record from name/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of the named column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Column names, in header order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Name/value pairs, in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no cells.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Parse a fixed-width report into records.
///
/// The first line is ignored, the second and third define the
/// [`ColumnLayout`], and every following line becomes one [`Record`].
/// Input with fewer than four lines yields no records.
///
/// # Errors
///
/// Returns [`Error::Format`] if the header and separator disagree on the
/// number of columns.
pub fn parse_table<I, S>(lines: I) -> Result<Vec<Record>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut lines = lines.into_iter().skip(1);

    let (header, separator) = match (lines.next(), lines.next()) {
        (Some(header), Some(separator)) => (header, separator),
        _ => return Ok(Vec::new()),
    };
    let layout = ColumnLayout::from_lines(header.as_ref(), separator.as_ref())?;

    Ok(lines.map(|row| layout.slice_row(row.as_ref())).collect())
}
