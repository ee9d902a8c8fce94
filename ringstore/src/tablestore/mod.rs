//! Tablestore: a timestore ring of tab-separated rows, paired with a
//! spanstore block recording which header was in force for each run of
//! sequences, so the schema can evolve underneath a live ring. Ground:
//! spec's own §4.5 put/get/mget algorithms -- there is no original C source
//! for this layer, only `timestore.c`'s call shapes for the ring it sits on.

pub mod table;

use std::sync::Arc;

use crate::container::{Engine, TxMode};
use crate::error::{CResult, Error};
use crate::holstore::Holstore;
use crate::spanstore::{self, SpanTable, TimeSearch};
use crate::timestore::{self, RingDescriptor, Timestore};

pub use table::Table;

/// A row's schema provenance: either the header recorded for the span it
/// belongs to, or -- if that span's metadata write failed or was purged
/// without a surviving span -- a placeholder that still lets the row be
/// read back, just without a known column layout.
#[derive(Clone, Debug, PartialEq)]
pub enum Header {
    Known(String),
    Unknown,
}

impl Header {
    pub fn as_str(&self) -> &str {
        match self {
            Header::Known(s) => s,
            Header::Unknown => "_unknown",
        }
    }
}

/// One raw row together with the header its owning span recorded.
#[derive(Clone, Debug, PartialEq)]
pub struct RawRow {
    pub seq: u64,
    pub time: u64,
    pub header: Header,
    pub fields: Vec<String>,
}

fn parse_row(raw: timestore::TsRecord, header: Header) -> CResult<RawRow> {
    let text = String::from_utf8(raw.data)?;
    let fields = match &header {
        Header::Known(h) => {
            let (_, _) = Table::parse_header(h);
            text.split('\t').map(String::from).collect()
        }
        Header::Unknown => text.split('\t').map(String::from).collect(),
    };
    Ok(RawRow { seq: raw.seq, time: raw.time, header, fields })
}

pub(crate) fn merge_row(table: &mut Table, row_columns: &[String], values: &[String]) {
    let grew = row_columns.iter().any(|c| !table.columns.contains(c));
    if grew {
        for c in row_columns {
            if !table.columns.contains(c) {
                table.columns.push(c.clone());
            }
        }
        for row in table.rows.iter_mut() {
            row.resize(table.columns.len(), String::new());
        }
    }
    let mut out = vec![String::new(); table.columns.len()];
    for (c, v) in row_columns.iter().zip(values.iter()) {
        if let Some(idx) = table.columns.iter().position(|x| x == c) {
            out[idx] = v.clone();
        }
    }
    table.rows.push(out);
}

fn resolve_period(descriptor: &RingDescriptor) -> CResult<u64> {
    if let Some(p) = descriptor.sample_period_secs {
        if p > 0 {
            return Ok(p);
        }
    }
    let digits: String = descriptor.name.chars().rev().take_while(|c| c.is_ascii_digit()).collect::<Vec<_>>().into_iter().rev().collect();
    digits
        .parse()
        .map_err(|_| Error::Invalid(format!("ring {:?} has no explicit sample period and its name carries none either", descriptor.name)))
}

/// Factory for opening/creating table rings inside one holstore.
pub struct Tablestore<E: Engine> {
    hol: Arc<Holstore<E>>,
    timestore: Timestore<E>,
}

impl<E: Engine> Tablestore<E> {
    pub fn new(hol: Arc<Holstore<E>>) -> Self {
        let timestore = Timestore::new(Arc::clone(&hol));
        Self { hol, timestore }
    }

    pub fn create(
        &self,
        name: &str,
        description: &str,
        password: Option<&str>,
        nslots: u32,
        sample_period_secs: Option<u64>,
    ) -> CResult<TableHandle<E>> {
        let ring = self.timestore.create(name, description, password, nslots, sample_period_secs)?;
        Ok(TableHandle { hol: Arc::clone(&self.hol), ring, current_span: None, schema: Vec::new() })
    }

    pub fn open(&self, name: &str, password: Option<&str>) -> CResult<TableHandle<E>> {
        let ring = self.timestore.open(name, password)?;
        let name = name.to_string();
        let (current_span, schema) = self.hol.container().with_transaction(TxMode::ReadOnly, |tx| {
            let spans = spanstore::read_block(tx, &name)?.unwrap_or_default();
            Ok(match spans.get_latest() {
                Some(span) => {
                    let (columns, _) = Table::parse_header(&span.header);
                    (Some((span.from_seq, span.to_seq)), columns)
                }
                None => (None, Vec::new()),
            })
        })?;
        Ok(TableHandle { hol: Arc::clone(&self.hol), ring, current_span, schema })
    }

    pub fn remove(&self, name: &str) -> CResult<()> {
        self.timestore.remove(name)?;
        self.hol.container().with_transaction(TxMode::ReadWrite, |tx| tx.delete(format!("__spans_{name}").into_bytes()))
    }
}

/// One open table ring: a timestore ring for row payloads, plus the cached
/// schema/span bounds tablestore needs to decide whether the next `put`
/// extends the current span or opens a new one.
pub struct TableHandle<E: Engine> {
    hol: Arc<Holstore<E>>,
    ring: timestore::Ring<E>,
    current_span: Option<(u64, u64)>,
    schema: Vec<String>,
}

impl<E: Engine> TableHandle<E> {
    pub fn name(&self) -> &str {
        self.ring.name()
    }

    pub fn put(&mut self, table: &Table) -> CResult<u64> {
        let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        self.put_with_time(table, now)
    }

    pub fn put_text(&mut self, text: &str) -> CResult<u64> {
        let table = Table::parse_text(text)?;
        self.put(&table)
    }

    /// Appends `table`'s rows at `t`, opening a new span if the column
    /// layout changed (a deliberately coarse check: column count only, not
    /// column identity) or extending the current one otherwise.
    ///
    /// The row write and the span metadata update are two separate
    /// transactions: if the row commits but the span update then fails, the
    /// row is not rolled back. It stays readable, just under
    /// [`Header::Unknown`] until the ring's schema is rewritten by a later
    /// successful `put`.
    pub fn put_with_time(&mut self, table: &Table, t: u64) -> CResult<u64> {
        if table.columns.is_empty() {
            return Err(Error::Invalid("a table must have at least one column".into()));
        }
        let body = table.body_blob();
        let seq = self.ring.put_with_time(body.as_bytes(), t)?;

        let name = self.ring.name().to_string();
        let new_span_needed = self.current_span.is_none() || table.column_count() != self.schema.len();
        let header = table.header_blob();

        let span_update = self.hol.container().with_transaction(TxMode::ReadWrite, |tx| {
            let mut spans = spanstore::read_block(tx, &name)?.unwrap_or_default();

            if new_span_needed {
                if !spans.new_span(seq, seq, t, t, header.clone()) {
                    return Err(Error::Internal(format!("span for ring {name} already covers sequence {seq}")));
                }
            } else {
                let (from, to) = self.current_span.expect("new_span_needed false implies a current span");
                if !spans.extend(from, to, seq, t) {
                    spans.new_span(seq, seq, t, t, header.clone());
                }
            }

            if let Some(oldest_seq) = Timestore::<E>::read_descriptor(tx, &name)?.oldest {
                if let Some(oldest_raw) = tx.get(&timestore::datum_key(&name, oldest_seq))? {
                    let (_, oldest_time) = timestore::decode_datum(oldest_raw)?;
                    spans.purge(oldest_seq, oldest_time);
                }
            }

            spanstore::write_block(tx, &name, &spans)?;
            Ok(())
        });

        match span_update {
            Ok(()) => {
                self.current_span =
                    Some(if new_span_needed { (seq, seq) } else { (self.current_span.unwrap().0, seq) });
                self.schema = table.columns.clone();
            }
            Err(e) => {
                log::warn!("ring {name}: row {seq} committed but its span metadata did not: {e}");
            }
        }

        Ok(seq)
    }

    /// Reads the next unread row and advances the cursor.
    pub fn get(&mut self) -> CResult<Option<(Table, u64, u64)>> {
        let record = match self.ring.get()? {
            Some(r) => r,
            None => return Ok(None),
        };
        let header = self.header_for_seq(record.seq)?;
        let text = String::from_utf8(record.data)?;
        let table = match &header {
            Header::Known(h) => Table::from_header_and_body(h, &text),
            Header::Unknown => {
                let mut table = Table::new(vec!["value".to_string()]);
                table.rows.push(vec![text]);
                table
            }
        };
        Ok(Some((table, record.time, record.seq)))
    }

    fn header_for_seq(&self, seq: u64) -> CResult<Header> {
        let name = self.ring.name().to_string();
        self.hol.container().with_transaction(TxMode::ReadOnly, |tx| {
            let spans = spanstore::read_block(tx, &name)?.unwrap_or_default();
            Ok(match spans.get_seq(seq) {
                Some(span) => Header::Known(span.header.clone()),
                None => Header::Unknown,
            })
        })
    }

    /// Reads up to `want` unread rows as their raw header/fields pairs,
    /// without merging them into one table.
    pub fn mget_raw(&mut self, want: usize) -> CResult<Vec<RawRow>> {
        let mut out = Vec::with_capacity(want);
        for _ in 0..want {
            match self.ring.get()? {
                Some(record) => {
                    let header = self.header_for_seq(record.seq)?;
                    out.push(parse_row(record, header)?);
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// All rows belonging to the span that contains `seq`.
    pub fn get_span_by_seq(&self, seq: u64) -> CResult<Table> {
        let name = self.ring.name().to_string();
        let span = self.hol.container().with_transaction(TxMode::ReadOnly, |tx| {
            let spans = spanstore::read_block(tx, &name)?.unwrap_or_default();
            spans.get_seq(seq).cloned().ok_or_else(|| Error::NotFound(format!("span containing sequence {seq}")))
        })?;
        self.table_for_span(&span)
    }

    fn table_for_span(&self, span: &crate::spanstore::Span) -> CResult<Table> {
        let mut table = {
            let (columns, info) = Table::parse_header(&span.header);
            Table { columns, info, rows: Vec::new() }
        };
        for seq in span.from_seq..=span.to_seq {
            if let Some(record) = self.ring.peek(seq)? {
                let text = String::from_utf8(record.data)?;
                table.rows.push(text.split('\t').map(String::from).collect());
            }
        }
        Ok(table)
    }

    /// All rows in `[from, to]`, merged into one table whose column set
    /// grows to accommodate every span's header the range touches.
    pub fn mget_by_seqs(&self, from: u64, to: u64) -> CResult<Table> {
        let name = self.ring.name().to_string();
        let spans = self.hol.container().with_transaction(TxMode::ReadOnly, |tx| Ok(spanstore::read_block(tx, &name)?.unwrap_or_default()))?;

        let mut table = Table::default();
        for seq in from..=to {
            let Some(record) = self.ring.peek(seq)? else { continue };
            let text = String::from_utf8(record.data)?;
            let fields: Vec<String> = text.split('\t').map(String::from).collect();
            match spans.get_seq(seq) {
                Some(span) => {
                    let (columns, _) = Table::parse_header(&span.header);
                    merge_row(&mut table, &columns, &fields);
                }
                None => {
                    let columns = vec!["value".to_string()];
                    merge_row(&mut table, &columns, &[text]);
                }
            }
        }
        Ok(table)
    }

    /// One table per span overlapping `[from_t, to_t]`, each keyed by that
    /// span's start time, at a row cadence derived from the ring's sampling
    /// period.
    pub fn get_cons_by_time(&self, from_t: u64, to_t: u64) -> CResult<Vec<(u64, Table)>> {
        let name = self.ring.name().to_string();
        let (descriptor, spans) = self.hol.container().with_transaction(TxMode::ReadOnly, |tx| {
            Ok((Timestore::<E>::read_descriptor(tx, &name)?, spanstore::read_block(tx, &name)?.unwrap_or_default()))
        })?;
        let period = resolve_period(&descriptor)?;

        let start_span = spans.get_time(from_t, TimeSearch::Next);
        let end_span = spans.get_time(to_t, TimeSearch::Prev);
        let (start_idx, end_idx) = match (start_span, end_span) {
            (Some(s), Some(e)) => {
                let si = spans.spans().iter().position(|x| x.from_seq == s.from_seq).unwrap();
                let ei = spans.spans().iter().position(|x| x.from_seq == e.from_seq).unwrap();
                if si > ei {
                    return Ok(Vec::new());
                }
                (si, ei)
            }
            _ => return Ok(Vec::new()),
        };

        let mut out = Vec::new();
        for span in &spans.spans()[start_idx..=end_idx] {
            if span.to_time < from_t || span.from_time > to_t {
                continue;
            }
            let seq_start = if span.from_time >= from_t {
                span.from_seq
            } else {
                span.from_seq + (from_t - span.from_time) / period.max(1)
            }
            .clamp(span.from_seq, span.to_seq);
            let seq_end = if span.to_time <= to_t {
                span.to_seq
            } else {
                span.from_seq + (to_t - span.from_time) / period.max(1)
            }
            .clamp(span.from_seq, span.to_seq);

            let mut bounded = span.clone();
            bounded.from_seq = seq_start;
            bounded.to_seq = seq_end;
            out.push((span.from_time, self.table_for_span(&bounded)?));
        }
        Ok(out)
    }

    pub fn jump_youngest_span(&mut self) -> CResult<()> {
        let name = self.ring.name().to_string();
        let span = self.hol.container().with_transaction(TxMode::ReadOnly, |tx| {
            spanstore::read_block(tx, &name)?.unwrap_or_default().get_latest().cloned().ok_or_else(|| Error::NotFound("no spans yet".into()))
        })?;
        self.ring.set_jump(span.from_seq as i64 - 1)?;
        Ok(())
    }

    pub fn jump_oldest_span(&mut self) -> CResult<()> {
        let name = self.ring.name().to_string();
        let span = self.hol.container().with_transaction(TxMode::ReadOnly, |tx| {
            spanstore::read_block(tx, &name)?.unwrap_or_default().get_oldest().cloned().ok_or_else(|| Error::NotFound("no spans yet".into()))
        })?;
        self.ring.set_jump(span.from_seq as i64 - 1)?;
        Ok(())
    }

    pub fn jump_seq_span(&mut self, seq: u64) -> CResult<()> {
        let name = self.ring.name().to_string();
        let span = self.hol.container().with_transaction(TxMode::ReadOnly, |tx| {
            spanstore::read_block(tx, &name)?.unwrap_or_default().get_seq(seq).cloned().ok_or_else(|| Error::NotFound(format!("span for sequence {seq}")))
        })?;
        self.ring.set_jump(span.from_seq as i64 - 1)?;
        Ok(())
    }

    pub fn get_header_latest(&self) -> CResult<Option<String>> {
        let name = self.ring.name().to_string();
        self.hol.container().with_transaction(TxMode::ReadOnly, |tx| {
            Ok(spanstore::read_block(tx, &name)?.and_then(|s| s.get_latest().map(|s| s.header.clone())))
        })
    }

    pub fn get_header_oldest(&self) -> CResult<Option<String>> {
        let name = self.ring.name().to_string();
        self.hol.container().with_transaction(TxMode::ReadOnly, |tx| {
            Ok(spanstore::read_block(tx, &name)?.and_then(|s| s.get_oldest().map(|s| s.header.clone())))
        })
    }

    pub fn get_header_seq(&self, seq: u64) -> CResult<Option<String>> {
        let name = self.ring.name().to_string();
        self.hol.container().with_transaction(TxMode::ReadOnly, |tx| {
            Ok(spanstore::read_block(tx, &name)?.and_then(|s| s.get_seq(seq).map(|s| s.header.clone())))
        })
    }

    pub fn ring(&self) -> &timestore::Ring<E> {
        &self.ring
    }

    pub fn ring_mut(&mut self) -> &mut timestore::Ring<E> {
        &mut self.ring
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::container::MemoryEngine;

    fn tablestore() -> Tablestore<MemoryEngine> {
        let hol = Arc::new(Holstore::create_in_memory().unwrap());
        Tablestore::new(hol)
    }

    fn row_table(cols: &[&str], rows: &[&[&str]]) -> Table {
        let mut t = Table::new(cols.iter().map(|s| s.to_string()).collect());
        for row in rows {
            t.push_row(row.iter().map(|s| s.to_string()).collect()).unwrap();
        }
        t
    }

    #[test]
    fn put_and_get_round_trip() {
        let store = tablestore();
        let mut handle = store.create("widgets", "", None, 0, None).unwrap();
        let table = row_table(&["id", "name"], &[&["1", "a"]]);
        let seq = handle.put_with_time(&table, 100).unwrap();
        assert_eq!(seq, 0);

        let (got, t, seq) = handle.get().unwrap().unwrap();
        assert_eq!(t, 100);
        assert_eq!(seq, 0);
        assert_eq!(got.columns, vec!["id", "name"]);
        assert_eq!(got.rows, vec![vec!["1", "a"]]);
    }

    #[test]
    fn schema_change_opens_new_span() {
        let store = tablestore();
        let mut handle = store.create("widgets", "", None, 0, None).unwrap();
        handle.put_with_time(&row_table(&["a"], &[&["1"]]), 1).unwrap();
        handle.put_with_time(&row_table(&["a"], &[&["2"]]), 2).unwrap();
        handle.put_with_time(&row_table(&["a", "b"], &[&["3", "x"]]), 3).unwrap();

        assert_eq!(handle.get_header_seq(1).unwrap(), Some("a".to_string()));
        assert_eq!(handle.get_header_seq(2).unwrap(), Some("a\tb".to_string()));
    }

    #[test]
    fn mget_by_seqs_merges_schemas() {
        let store = tablestore();
        let mut handle = store.create("widgets", "", None, 0, None).unwrap();
        handle.put_with_time(&row_table(&["a"], &[&["1"]]), 1).unwrap();
        handle.put_with_time(&row_table(&["a", "b"], &[&["2", "y"]]), 2).unwrap();

        let merged = handle.mget_by_seqs(0, 1).unwrap();
        assert_eq!(merged.columns, vec!["a", "b"]);
        assert_eq!(merged.rows[0], vec!["1", ""]);
        assert_eq!(merged.rows[1], vec!["2", "y"]);
    }

    #[test]
    fn get_cons_by_time_uses_explicit_period() {
        let store = tablestore();
        let mut handle = store.create("widgets", "", None, 0, Some(10)).unwrap();
        handle.put_with_time(&row_table(&["a"], &[&["1"]]), 0).unwrap();
        handle.put_with_time(&row_table(&["a"], &[&["2"]]), 10).unwrap();
        handle.put_with_time(&row_table(&["a"], &[&["3"]]), 20).unwrap();

        let windows = handle.get_cons_by_time(0, 20).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].1.rows.len(), 3);
    }

    #[test]
    fn put_text_with_info_rows_evolves_schema_across_spans() {
        let store = tablestore();
        let mut handle = store.create("widgets", "", None, 0, None).unwrap();
        handle.put_text("x\ty\n--\t--\n1\t2").unwrap();
        handle.put_text("x\ty\tz\n--\t--\t--\n3\t4\t5").unwrap();

        assert_eq!(handle.get_header_seq(0).unwrap().as_deref(), Some("x\ty\n--\t--"));
        assert_eq!(handle.get_header_seq(1).unwrap().as_deref(), Some("x\ty\tz\n--\t--\t--"));

        let merged = handle.mget_by_seqs(0, 1).unwrap();
        assert_eq!(merged.columns, vec!["x", "y", "z"]);
        assert_eq!(merged.rows, vec![vec!["1", "2", ""], vec!["3", "4", "5"]]);
    }

    #[test]
    fn span_write_failure_is_tolerated() {
        // A row whose span never got written (simulated by removing the
        // spans block after the fact) still reads back, tagged Unknown.
        let store = tablestore();
        let mut handle = store.create("widgets", "", None, 0, None).unwrap();
        handle.put_with_time(&row_table(&["a"], &[&["1"]]), 1).unwrap();

        handle
            .hol
            .container()
            .with_transaction(TxMode::ReadWrite, |tx| tx.delete(b"__spans_widgets".to_vec()))
            .unwrap();

        let header = handle.header_for_seq(0).unwrap();
        assert_eq!(header, Header::Unknown);
    }
}
