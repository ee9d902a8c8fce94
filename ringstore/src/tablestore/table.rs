//! The tab-separated table value tablestore rows are parsed into and
//! serialized from: a column-name header, optional extra info rows (type,
//! sense, description -- as in the original's `_seq\t_time\tvalue` schema
//! helper rows), and the data rows themselves.

use crate::error::{CResult, Error};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub info: Vec<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, info: Vec::new(), rows: Vec::new() }
    }

    pub fn push_row(&mut self, row: Vec<String>) -> CResult<()> {
        if row.len() != self.columns.len() {
            return Err(Error::Invalid(format!(
                "row has {} fields, expected {} to match the column header",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Parses a plain tab-separated text table: first line is the column
    /// header; zero or more following lines whose fields are all `--`
    /// (a per-column "no type info" marker, the iiab table-text convention)
    /// are info rows; everything after that is a data row.
    pub fn parse_text(text: &str) -> CResult<Self> {
        let mut lines = text.lines();
        let columns: Vec<String> =
            lines.next().ok_or_else(|| Error::Invalid("empty table text".into()))?.split('\t').map(String::from).collect();
        let mut table = Self::new(columns);

        let mut lines = lines.peekable();
        while let Some(line) = lines.peek() {
            if !line.is_empty() && line.split('\t').all(|field| field == "--") {
                table.info.push(line.split('\t').map(String::from).collect());
                lines.next();
            } else {
                break;
            }
        }

        for line in lines {
            if line.is_empty() {
                continue;
            }
            table.push_row(line.split('\t').map(String::from).collect())?;
        }
        Ok(table)
    }

    /// The schema/header blob recorded in a span: the column-name row, plus
    /// -- if present -- the info rows, newline-joined.
    pub fn header_blob(&self) -> String {
        let mut blob = self.columns.join("\t");
        for row in &self.info {
            blob.push('\n');
            blob.push_str(&row.join("\t"));
        }
        blob
    }

    /// The row body as stored in the owning timestore record: data rows
    /// only, tab-separated, newline-joined.
    pub fn body_blob(&self) -> String {
        self.rows.iter().map(|row| row.join("\t")).collect::<Vec<_>>().join("\n")
    }

    pub fn parse_header(header: &str) -> (Vec<String>, Vec<Vec<String>>) {
        let mut lines = header.split('\n');
        let columns = lines.next().unwrap_or("").split('\t').map(String::from).collect();
        let info = lines.map(|line| line.split('\t').map(String::from).collect()).collect();
        (columns, info)
    }

    pub fn from_header_and_body(header: &str, body: &str) -> Self {
        let (columns, info) = Self::parse_header(header);
        let rows = if body.is_empty() {
            Vec::new()
        } else {
            body.lines().map(|line| line.split('\t').map(String::from).collect()).collect()
        };
        Self { columns, info, rows }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_text_splits_header_and_rows() {
        let table = Table::parse_text("a\tb\n1\t2\n3\t4").unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows, vec![vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn header_and_body_round_trip() {
        let mut table = Table::new(vec!["a".to_string(), "b".to_string()]);
        table.info.push(vec!["int".to_string(), "str".to_string()]);
        table.push_row(vec!["1".to_string(), "x".to_string()]).unwrap();

        let header = table.header_blob();
        let body = table.body_blob();
        let back = Table::from_header_and_body(&header, &body);
        assert_eq!(back.columns, table.columns);
        assert_eq!(back.info, table.info);
        assert_eq!(back.rows, table.rows);
    }

    #[test]
    fn mismatched_row_length_rejected() {
        let mut table = Table::new(vec!["a".to_string()]);
        assert!(table.push_row(vec!["1".to_string(), "2".to_string()]).is_err());
    }

    #[test]
    fn parse_text_strips_leading_info_row() {
        let table = Table::parse_text("x\ty\n--\t--\n1\t2").unwrap();
        assert_eq!(table.columns, vec!["x", "y"]);
        assert_eq!(table.info, vec![vec!["--", "--"]]);
        assert_eq!(table.rows, vec![vec!["1", "2"]]);
    }

    #[test]
    fn parse_text_without_info_row_is_unaffected() {
        let table = Table::parse_text("a\tb\n1\t2").unwrap();
        assert!(table.info.is_empty());
        assert_eq!(table.rows, vec![vec!["1", "2"]]);
    }
}
