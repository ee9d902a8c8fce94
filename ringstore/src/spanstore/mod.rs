//! Spanstore: a per-ring secondary index recording which schema/header was
//! in force for each contiguous run of timestore sequences. Stored as a
//! single holstore value at key `"__spans_<ring>"` rather than as its own
//! ring -- there is no timestore counterpart for this layer in the system
//! this crate is modeled on, so the encoding here (tab-separated rows, one
//! span per line, with the header blob's own newlines escaped) follows the
//! tab-separated-row convention tablestore uses for everything else.

use crate::container::{Engine, Transaction};
use crate::error::{CResult, Error};

fn spans_key(ring: &str) -> Vec<u8> {
    format!("__spans_{ring}").into_bytes()
}

/// One contiguous run of sequences written under a single schema.
#[derive(Clone, Debug, PartialEq)]
pub struct Span {
    pub from_seq: u64,
    pub to_seq: u64,
    pub from_time: u64,
    pub to_time: u64,
    pub header: String,
}

impl Span {
    fn contains_seq(&self, seq: u64) -> bool {
        seq >= self.from_seq && seq <= self.to_seq
    }

    fn contains_time(&self, t: u64) -> bool {
        t >= self.from_time && t <= self.to_time
    }
}

fn escape(header: &str) -> String {
    header.replace('\\', "\\\\").replace('\n', "\\n")
}

fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// How [`SpanTable::get_time`] should resolve a time that falls between two
/// spans, or exactly on a boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeSearch {
    Exact,
    Next,
    Prev,
}

/// The ordered list of spans covering one ring, from oldest to youngest.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanTable {
    spans: Vec<Span>,
}

impl SpanTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        for span in &self.spans {
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\n",
                span.from_seq,
                span.to_seq,
                span.from_time,
                span.to_time,
                escape(&span.header)
            ));
        }
        out.into_bytes()
    }

    fn decode(bytes: &[u8]) -> CResult<Self> {
        let text = String::from_utf8(bytes.to_vec())?;
        let mut spans = Vec::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let mut fields = line.splitn(5, '\t');
            let from_seq = fields
                .next()
                .ok_or_else(|| Error::Corrupt("span row missing from_seq".into()))?
                .parse()
                .map_err(|_| Error::Corrupt("bad from_seq".into()))?;
            let to_seq = fields
                .next()
                .ok_or_else(|| Error::Corrupt("span row missing to_seq".into()))?
                .parse()
                .map_err(|_| Error::Corrupt("bad to_seq".into()))?;
            let from_time = fields
                .next()
                .ok_or_else(|| Error::Corrupt("span row missing from_time".into()))?
                .parse()
                .map_err(|_| Error::Corrupt("bad from_time".into()))?;
            let to_time = fields
                .next()
                .ok_or_else(|| Error::Corrupt("span row missing to_time".into()))?
                .parse()
                .map_err(|_| Error::Corrupt("bad to_time".into()))?;
            let header = unescape(fields.next().ok_or_else(|| Error::Corrupt("span row missing header".into()))?);
            spans.push(Span { from_seq, to_seq, from_time, to_time, header });
        }
        Ok(Self { spans })
    }

    /// Appends a new span. Fails if it would overlap the current latest span.
    pub fn new_span(&mut self, from: u64, to: u64, from_t: u64, to_t: u64, header: String) -> bool {
        if let Some(last) = self.spans.last() {
            if from <= last.to_seq {
                return false;
            }
        }
        self.spans.push(Span { from_seq: from, to_seq: to, from_time: from_t, to_time: to_t, header });
        true
    }

    /// Extends the span currently covering `[from, to]` to also cover
    /// `new_seq`/`new_time`.
    pub fn extend(&mut self, from: u64, to: u64, new_seq: u64, new_time: u64) -> bool {
        match self.spans.last_mut() {
            Some(span) if span.from_seq == from && span.to_seq == to => {
                span.to_seq = new_seq;
                span.to_time = new_time;
                true
            }
            _ => false,
        }
    }

    /// Drops spans entirely below `oldest_seq_still_alive`, and clamps the
    /// new leading span's start if it straddles the eviction boundary.
    pub fn purge(&mut self, oldest_seq_still_alive: u64, oldest_time_still_alive: u64) {
        self.spans.retain(|span| span.to_seq >= oldest_seq_still_alive);
        if let Some(first) = self.spans.first_mut() {
            if first.from_seq < oldest_seq_still_alive {
                first.from_seq = oldest_seq_still_alive;
                first.from_time = oldest_time_still_alive;
            }
        }
    }

    pub fn get_seq(&self, seq: u64) -> Option<&Span> {
        self.spans.iter().find(|span| span.contains_seq(seq))
    }

    pub fn get_time(&self, t: u64, mode: TimeSearch) -> Option<&Span> {
        if let Some(span) = self.spans.iter().find(|span| span.contains_time(t)) {
            return Some(span);
        }
        match mode {
            TimeSearch::Exact => None,
            TimeSearch::Next => self.spans.iter().find(|span| span.from_time > t),
            TimeSearch::Prev => self.spans.iter().rev().find(|span| span.to_time < t),
        }
    }

    pub fn get_oldest(&self) -> Option<&Span> {
        self.spans.first()
    }

    pub fn get_latest(&self) -> Option<&Span> {
        self.spans.last()
    }
}

pub fn read_block<E: Engine>(tx: &mut Transaction<E>, ring: &str) -> CResult<Option<SpanTable>> {
    match tx.get(&spans_key(ring))? {
        Some(raw) => Ok(Some(SpanTable::decode(&raw)?)),
        None => Ok(None),
    }
}

pub fn write_block<E: Engine>(tx: &mut Transaction<E>, ring: &str, table: &SpanTable) -> CResult<()> {
    tx.put(spans_key(ring), table.encode())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_then_extend() {
        let mut t = SpanTable::new();
        assert!(t.new_span(0, 0, 100, 100, "a\tb".to_string()));
        assert!(t.extend(0, 0, 1, 150));
        assert_eq!(t.get_latest().unwrap().to_seq, 1);
        assert_eq!(t.get_latest().unwrap().to_time, 150);
    }

    #[test]
    fn overlapping_new_span_rejected() {
        let mut t = SpanTable::new();
        t.new_span(0, 5, 0, 50, "h".to_string());
        assert!(!t.new_span(3, 6, 30, 60, "h2".to_string()));
        assert!(t.new_span(6, 6, 60, 60, "h2".to_string()));
    }

    #[test]
    fn purge_drops_and_clamps() {
        let mut t = SpanTable::new();
        t.new_span(0, 2, 0, 20, "a".to_string());
        t.new_span(3, 5, 30, 50, "b".to_string());
        t.purge(4, 40);
        assert_eq!(t.spans().len(), 1);
        assert_eq!(t.get_oldest().unwrap().from_seq, 4);
        assert_eq!(t.get_oldest().unwrap().from_time, 40);
    }

    #[test]
    fn get_time_modes() {
        let mut t = SpanTable::new();
        t.new_span(0, 2, 0, 20, "a".to_string());
        t.new_span(3, 5, 30, 50, "b".to_string());
        assert_eq!(t.get_time(25, TimeSearch::Exact), None);
        assert_eq!(t.get_time(25, TimeSearch::Next).unwrap().from_seq, 3);
        assert_eq!(t.get_time(25, TimeSearch::Prev).unwrap().from_seq, 0);
    }

    #[test]
    fn header_with_newline_round_trips() {
        let mut t = SpanTable::new();
        t.new_span(0, 0, 0, 0, "col1\tcol2\ninfo1\tinfo2".to_string());
        let bytes = t.encode();
        let back = SpanTable::decode(&bytes).unwrap();
        assert_eq!(back.get_oldest().unwrap().header, "col1\tcol2\ninfo1\tinfo2");
    }
}
