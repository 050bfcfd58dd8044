use super::error::{RecordError, RecordResult};
use super::record::Record;
use super::value::ColumnKind;

/// One column of a relation schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A relation schema: name, ordered columns and the derived fixed
/// record size. Column order and widths never change after creation.
#[derive(Debug, Clone)]
pub struct Relation {
    name: String,
    columns: Vec<ColumnInfo>,
    record_size: usize,
}

impl Relation {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        let record_size = columns.iter().map(|c| c.kind.width()).sum();
        Self {
            name: name.into(),
            columns,
            record_size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Encode `rec` into `buf` starting at `pos`. The codec is pure:
    /// it touches nothing but the given byte range.
    pub fn write_record(&self, rec: &Record, buf: &mut [u8], pos: usize) -> RecordResult<()> {
        if rec.len() != self.columns.len() {
            return Err(RecordError::ArityMismatch {
                expected: self.columns.len(),
                actual: rec.len(),
            });
        }
        if pos + self.record_size > buf.len() {
            return Err(RecordError::BadBuffer { offset: pos });
        }
        let mut off = pos;
        for (col, value) in self.columns.iter().zip(rec.values()) {
            let width = col.kind.width();
            col.kind.encode(&col.name, value, &mut buf[off..off + width])?;
            off += width;
        }
        Ok(())
    }

    /// Decode the record stored in `buf` at `pos`.
    pub fn read_record(&self, buf: &[u8], pos: usize) -> RecordResult<Record> {
        if pos + self.record_size > buf.len() {
            return Err(RecordError::BadBuffer { offset: pos });
        }
        let mut values = Vec::with_capacity(self.columns.len());
        let mut off = pos;
        for col in &self.columns {
            let width = col.kind.width();
            values.push(col.kind.decode(&buf[off..off + width]));
            off += width;
        }
        Ok(Record::new(values))
    }

    /// Schema line as printed by DESCRIBE:
    /// `Fruit (id:INT,name:VARCHAR(20),price:FLOAT)`.
    pub fn describe(&self) -> String {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{}:{}", c.name, c.kind.type_name()))
            .collect();
        format!("{} ({})", self.name, cols.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fruit_schema() -> Relation {
        Relation::new(
            "Fruit",
            vec![
                ColumnInfo::new("id", ColumnKind::Int),
                ColumnInfo::new("name", ColumnKind::Varchar(20)),
                ColumnInfo::new("price", ColumnKind::Float),
            ],
        )
    }

    #[test]
    fn test_record_size() {
        assert_eq!(fruit_schema().record_size(), 4 + 20 + 4);
    }

    #[test]
    fn test_column_index() {
        let rel = fruit_schema();
        assert_eq!(rel.column_index("id"), Some(0));
        assert_eq!(rel.column_index("price"), Some(2));
        assert_eq!(rel.column_index("missing"), None);
    }

    #[test]
    fn test_round_trip() {
        let rel = fruit_schema();
        let rec = Record::from_strs(&["1", "Pomme", "1.2"]);
        let mut buf = vec![0u8; 64];
        rel.write_record(&rec, &mut buf, 10).unwrap();
        let back = rel.read_record(&buf, 10).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_text_truncated_at_column_width() {
        let rel = Relation::new("T", vec![ColumnInfo::new("s", ColumnKind::Char(4))]);
        let mut buf = vec![0u8; 8];
        rel.write_record(&Record::from_strs(&["abcdefgh"]), &mut buf, 0)
            .unwrap();
        let back = rel.read_record(&buf, 0).unwrap();
        assert_eq!(back.get(0), Some("abcd"));
    }

    #[test]
    fn test_arity_mismatch() {
        let rel = fruit_schema();
        let mut buf = vec![0u8; 64];
        let rec = Record::from_strs(&["1", "Pomme"]);
        assert!(matches!(
            rel.write_record(&rec, &mut buf, 0),
            Err(RecordError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn test_buffer_bounds_checked() {
        let rel = fruit_schema();
        let mut buf = vec![0u8; rel.record_size() - 1];
        let rec = Record::from_strs(&["1", "Pomme", "1.2"]);
        assert!(matches!(
            rel.write_record(&rec, &mut buf, 0),
            Err(RecordError::BadBuffer { .. })
        ));
        assert!(matches!(
            rel.read_record(&buf, 0),
            Err(RecordError::BadBuffer { .. })
        ));
    }

    #[test]
    fn test_bad_int_value() {
        let rel = fruit_schema();
        let mut buf = vec![0u8; 64];
        let rec = Record::from_strs(&["one", "Pomme", "1.2"]);
        assert!(matches!(
            rel.write_record(&rec, &mut buf, 0),
            Err(RecordError::BadInt { .. })
        ));
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            fruit_schema().describe(),
            "Fruit (id:INT,name:VARCHAR(20),price:FLOAT)"
        );
    }
}
