use crate::error::GbdbError;
use serde_json::{Map, Value, json};

/// A row is an ordered mapping from column name to JSON value, always
/// carrying an integer `id` unique within its table.
pub type Row = Map<String, Value>;

/// Value stored in header-row columns, also the default for columns a
/// caller leaves out on insert.
pub const HEADER_SENTINEL: &str = "-header-";

/// Id of the header row; always row 0 of a live table.
pub const HEADER_ID: i64 = -1;

pub fn row_id(row: &Row) -> Option<i64> {
    row.get("id").and_then(Value::as_i64)
}

pub fn is_header(row: &Row) -> bool {
    row_id(row) == Some(HEADER_ID)
}

/// A table's implicit schema: the ordered column set and per-column
/// defaults, parsed from the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHeader {
    /// Ordered `(column, default)` pairs, `id` excluded.
    pub columns: Vec<(String, Value)>,
}

impl TableHeader {
    pub fn from_columns<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|c| (c.as_ref().to_string(), json!(HEADER_SENTINEL)))
                .collect(),
        }
    }

    /// Bootstraps a header from the keys of a first row, in their order.
    pub fn from_row_keys(row: &Row) -> Self {
        Self {
            columns: row
                .keys()
                .filter(|k| *k != "id")
                .map(|k| (k.clone(), json!(HEADER_SENTINEL)))
                .collect(),
        }
    }

    /// Parses the header out of a stored row; `None` if it is not a
    /// header row.
    pub fn parse(row: &Row) -> Option<Self> {
        if !is_header(row) {
            return None;
        }
        Some(Self {
            columns: row
                .iter()
                .filter(|(k, _)| *k != "id")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), json!(HEADER_ID));
        for (column, default) in &self.columns {
            row.insert(column.clone(), default.clone());
        }
        row
    }

    pub fn contains(&self, column: &str) -> bool {
        column == "id" || self.columns.iter().any(|(c, _)| c == column)
    }

    /// Column names in header order, `id` first.
    pub fn keys(&self) -> Vec<String> {
        std::iter::once("id".to_string())
            .chain(self.columns.iter().map(|(c, _)| c.clone()))
            .collect()
    }

    /// Builds a full row for insertion: columns follow header order,
    /// missing columns take the header default, unknown columns are
    /// rejected.
    pub fn build_row(&self, id: i64, data: &Row) -> Result<Row, GbdbError> {
        if let Some(unknown) = data.keys().find(|k| !self.contains(k)) {
            return Err(GbdbError::Malformed(format!("unknown column '{unknown}'")));
        }
        let mut row = Row::new();
        row.insert("id".into(), json!(id));
        for (column, default) in &self.columns {
            let value = data.get(column).cloned().unwrap_or_else(|| default.clone());
            row.insert(column.clone(), value);
        }
        Ok(row)
    }
}

/// Loose equality for `where` filters: structural equality, or matching
/// canonical string forms. `1` matches `"1"` and `1.0`; `"01"` does not
/// match `1` (strings are taken verbatim, never parsed as numbers).
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (canonical(a), canonical(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn canonical(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Some((f as i64).to_string())
                } else {
                    Some(f.to_string())
                }
            } else {
                n.as_u64().map(|u| u.to_string())
            }
        }
        // Null and composites only match structurally.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{HEADER_SENTINEL, Row, TableHeader, is_header, loose_eq, row_id};
    use serde_json::json;

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        let mut row = Row::new();
        for (k, v) in pairs {
            row.insert((*k).into(), v.clone());
        }
        row
    }

    #[test]
    fn header_roundtrip_preserves_column_order() {
        let header = TableHeader::from_columns(&["name", "email"]);
        let stored = header.to_row();
        assert!(is_header(&stored));
        assert_eq!(
            stored.keys().collect::<Vec<_>>(),
            vec!["id", "name", "email"]
        );
        assert_eq!(TableHeader::parse(&stored), Some(header));
    }

    #[test]
    fn parse_rejects_data_rows() {
        let data = row(&[("id", json!(3)), ("name", json!("Ann"))]);
        assert_eq!(TableHeader::parse(&data), None);
    }

    #[test]
    fn build_row_defaults_missing_columns() {
        let header = TableHeader::from_columns(&["name", "email"]);
        let built = header
            .build_row(0, &row(&[("name", json!("Ann"))]))
            .expect("build");
        assert_eq!(built["id"], json!(0));
        assert_eq!(built["name"], json!("Ann"));
        assert_eq!(built["email"], json!(HEADER_SENTINEL));
    }

    #[test]
    fn build_row_rejects_unknown_columns() {
        let header = TableHeader::from_columns(&["name"]);
        let err = header
            .build_row(0, &row(&[("name", json!("Ann")), ("age", json!(4))]))
            .expect_err("reject");
        assert_eq!(err.code_str(), "malformed");
    }

    #[test]
    fn bootstrap_header_from_row_keys_skips_id() {
        let data = row(&[("id", json!(7)), ("name", json!("Ann")), ("email", json!("a@x.io"))]);
        let header = TableHeader::from_row_keys(&data);
        assert_eq!(header.keys(), vec!["id", "name", "email"]);
        assert_eq!(row_id(&data), Some(7));
    }

    #[test]
    fn loose_eq_coerces_across_scalar_types() {
        assert!(loose_eq(&json!(1), &json!("1")));
        assert!(loose_eq(&json!(1), &json!(1.0)));
        assert!(loose_eq(&json!(true), &json!("true")));
        assert!(loose_eq(&json!("Ann"), &json!("Ann")));
        assert!(!loose_eq(&json!("01"), &json!(1)));
        assert!(!loose_eq(&json!(null), &json!("")));
        assert!(loose_eq(&json!(null), &json!(null)));
    }
}
