use bincode::{Decode, Encode};

/// A single typed cell value in a result set row.
#[derive(Debug, Encode, Decode, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }
}

/// One statement's tabular output.
///
/// A batched request yields zero or more of these, one per statement, in
/// statement order. `error_message` is empty on success; a non-empty value
/// means this statement failed server-side even though the overall response
/// frame reported success.
#[derive(Debug, Encode, Decode, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub position: i32,
    pub sql_text: String,
    pub schemas: Vec<String>,
    pub tables: Vec<String>,
    pub parameters: Vec<String>,
    /// Server-side processing time metric.
    pub processing_time: i64,
    pub columns: Vec<String>,
    /// Column data-type names, parallel to `columns`.
    pub data_types: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: i32,
    pub column_count: i32,
    pub rows_affected: i32,
    pub error_message: String,
}

impl ResultSet {
    /// Bounds-checked cell access.
    pub fn value(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Position of a column by name, case-insensitive.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// First cell of the first row; what a scalar query produces.
    pub fn scalar(&self) -> Option<&Value> {
        self.value(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::{from_bytes, to_bytes};

    fn sample() -> ResultSet {
        ResultSet {
            sql_text: "SELECT id, name FROM t;".into(),
            columns: vec!["id".into(), "name".into()],
            data_types: vec!["Integer".into(), "Text".into()],
            rows: vec![
                vec![Value::Integer(1), Value::Text("one".into())],
                vec![Value::Integer(2), Value::Null],
            ],
            row_count: 2,
            column_count: 2,
            ..ResultSet::default()
        }
    }

    #[test]
    fn cell_access() {
        let rs = sample();
        assert_eq!(rs.value(0, 0), Some(&Value::Integer(1)));
        assert_eq!(rs.value(1, 1), Some(&Value::Null));
        assert_eq!(rs.value(2, 0), None);
        assert_eq!(rs.value(0, 5), None);
    }

    #[test]
    fn column_lookup_ignores_case() {
        let rs = sample();
        assert_eq!(rs.column_index("NAME"), Some(1));
        assert_eq!(rs.column_index("missing"), None);
    }

    #[test]
    fn scalar_is_first_cell() {
        assert_eq!(sample().scalar(), Some(&Value::Integer(1)));
        assert_eq!(ResultSet::default().scalar(), None);
    }

    #[test]
    fn survives_wire_encoding() {
        let sets = vec![sample(), ResultSet::default()];
        let bytes = to_bytes(&sets).unwrap();
        let decoded: Vec<ResultSet> = from_bytes(&bytes).unwrap();
        assert_eq!(decoded, sets);
    }
}
