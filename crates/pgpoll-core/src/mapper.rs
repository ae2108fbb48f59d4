//! Row to observation mapping.
//!
//! Two strategies:
//! - [`map_stat_database_row`] — positional mapping of a built-in
//!   `pg_stat_database` row (layout in [`crate::queries`]).
//! - [`QueryLayout`] — mapping of catalog query rows, either by the columns a
//!   definition declares or by the legacy fixed `schema, table, size` shape.
//!
//! A row is mapped completely before anything is emitted, so a scan error
//! never leaves half a row in the sink.

use crate::catalog::QueryDefinition;
use crate::driver::{SqlRow, Value};
use crate::error::GatherError;
use crate::queries::STAT_DATABASE_COLUMNS;
use crate::sink::{MetricValue, Observation, Tags};

/// Integer counters of the built-in row and their column positions.
pub const STAT_DATABASE_COUNTERS: [(&str, usize); 13] = [
    ("xact_commit", 3),
    ("xact_rollback", 4),
    ("blks_read", 5),
    ("blks_hit", 6),
    ("tup_returned", 7),
    ("tup_fetched", 8),
    ("tup_inserted", 9),
    ("tup_updated", 10),
    ("tup_deleted", 11),
    ("conflicts", 12),
    ("temp_files", 13),
    ("temp_bytes", 14),
    ("deadlocks", 15),
];

const DATNAME_COLUMN: usize = 1;
const BLK_READ_TIME_COLUMN: usize = 16;

/// Tags set by the engine itself; declared tag columns may not replace them.
pub const RESERVED_TAGS: [&str; 2] = ["server", "db"];

/// Metric name used by the fixed catalog layout.
pub const FIXED_LAYOUT_METRIC: &str = "size";

/// Maps one built-in statistics row into its observations, tagged with
/// `server` and `db`.
pub fn map_stat_database_row(
    row: &SqlRow,
    server_tag: &str,
) -> Result<Vec<Observation>, GatherError> {
    if row.len() < STAT_DATABASE_COLUMNS {
        return Err(GatherError::scan(
            "*",
            format!(
                "expected at least {} columns, found {}",
                STAT_DATABASE_COLUMNS,
                row.len()
            ),
        ));
    }

    let mut tags = Tags::new();
    tags.insert("server".to_string(), server_tag.to_string());
    tags.insert("db".to_string(), row.text(DATNAME_COLUMN)?.to_string());

    let mut observations = Vec::with_capacity(STAT_DATABASE_COUNTERS.len() + 2);
    for (metric, idx) in STAT_DATABASE_COUNTERS {
        observations.push(observation(metric, MetricValue::Int(row.int(idx)?), &tags));
    }

    let read_time = row.float(BLK_READ_TIME_COLUMN)?;
    observations.push(observation("blk_read_time", MetricValue::Float(read_time), &tags));
    // Reports the read-time column; the write-time column (17) is not read.
    observations.push(observation("blk_write_time", MetricValue::Float(read_time), &tags));

    Ok(observations)
}

/// How rows of a catalog query are turned into observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryLayout<'a> {
    /// Exactly three columns: schema (text), table (text), size (float).
    /// Emits one `size` observation tagged `schema` and `table`.
    Fixed,
    /// Columns looked up by name: each value column becomes a metric named
    /// after the column, each tag column a tag. A tag column named after one
    /// of [`RESERVED_TAGS`] is a scan error.
    Declared {
        tags: &'a [String],
        values: &'a [String],
    },
}

impl<'a> QueryLayout<'a> {
    /// Definitions that declare value columns use them; the rest fall back
    /// to the fixed layout.
    pub fn for_definition(definition: &'a QueryDefinition) -> Self {
        if definition.values.is_empty() {
            QueryLayout::Fixed
        } else {
            QueryLayout::Declared {
                tags: &definition.tags,
                values: &definition.values,
            }
        }
    }

    /// Maps one row. Every observation carries `server` and `db` tags.
    pub fn map_row(
        &self,
        row: &SqlRow,
        server_tag: &str,
        database: &str,
    ) -> Result<Vec<Observation>, GatherError> {
        let mut tags = Tags::new();
        tags.insert("server".to_string(), server_tag.to_string());
        tags.insert("db".to_string(), database.to_string());

        match self {
            QueryLayout::Fixed => {
                if row.len() != 3 {
                    return Err(GatherError::scan(
                        "*",
                        format!("expected 3 columns (schema, table, size), found {}", row.len()),
                    ));
                }
                tags.insert("schema".to_string(), row.text(0)?.to_string());
                tags.insert("table".to_string(), row.text(1)?.to_string());
                let size = row.float(2)?;
                Ok(vec![observation(
                    FIXED_LAYOUT_METRIC,
                    MetricValue::Float(size),
                    &tags,
                )])
            }
            QueryLayout::Declared {
                tags: tag_columns,
                values,
            } => {
                for column in tag_columns.iter() {
                    if RESERVED_TAGS.contains(&column.as_str()) {
                        return Err(GatherError::scan(
                            column,
                            format!("tag column would replace the reserved `{}` tag", column),
                        ));
                    }
                    let idx = row.index_of(column)?;
                    tags.insert(column.clone(), tag_value(row, idx, column)?);
                }
                values
                    .iter()
                    .map(|column| -> Result<Observation, GatherError> {
                        let idx = row.index_of(column)?;
                        Ok(observation(column, metric_value(row, idx, column)?, &tags))
                    })
                    .collect()
            }
        }
    }
}

fn observation(metric: &str, value: MetricValue, tags: &Tags) -> Observation {
    Observation {
        metric: metric.to_string(),
        value,
        tags: tags.clone(),
    }
}

fn tag_value(row: &SqlRow, idx: usize, column: &str) -> Result<String, GatherError> {
    match row.value(idx)? {
        Value::Text(s) => Ok(s.clone()),
        v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_)) => Ok(v.to_string()),
        other => Err(GatherError::scan(
            column,
            format!("cannot use {} as a tag value", other),
        )),
    }
}

fn metric_value(row: &SqlRow, idx: usize, column: &str) -> Result<MetricValue, GatherError> {
    match row.value(idx)? {
        Value::Int(i) => Ok(MetricValue::Int(*i)),
        Value::Float(x) => Ok(MetricValue::Float(*x)),
        Value::Bool(b) => Ok(MetricValue::Int(i64::from(*b))),
        other => Err(GatherError::scan(
            column,
            format!("expected a numeric value, found {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn stat_row(datname: &str) -> SqlRow {
        let mut values = vec![Value::Int(16384), Value::from(datname), Value::Int(3)];
        // xact_commit..deadlocks = 100..=112
        values.extend((100..=112).map(Value::Int));
        values.push(Value::Float(1.25)); // blk_read_time
        values.push(Value::Float(9.75)); // blk_write_time
        values.push(Value::Unsupported("timestamptz".to_string()));
        let columns = (0..values.len()).map(|i| format!("c{}", i)).collect();
        SqlRow::new(columns, values)
    }

    fn find<'a>(obs: &'a [Observation], metric: &str) -> &'a Observation {
        obs.iter()
            .find(|o| o.metric == metric)
            .unwrap_or_else(|| panic!("missing metric {}", metric))
    }

    #[test]
    fn stat_row_maps_every_named_counter() {
        let obs = map_stat_database_row(&stat_row("app"), "host=db1").unwrap();

        assert_eq!(obs.len(), 15);
        assert_eq!(find(&obs, "xact_commit").value, MetricValue::Int(100));
        assert_eq!(find(&obs, "blks_hit").value, MetricValue::Int(103));
        assert_eq!(find(&obs, "temp_bytes").value, MetricValue::Int(111));
        assert_eq!(find(&obs, "deadlocks").value, MetricValue::Int(112));
        for o in &obs {
            assert_eq!(o.tag("server"), Some("host=db1"));
            assert_eq!(o.tag("db"), Some("app"));
            assert_eq!(o.tags.len(), 2);
        }
    }

    #[test]
    fn stat_row_write_time_reports_read_time_column() {
        let obs = map_stat_database_row(&stat_row("app"), "host=db1").unwrap();
        assert_eq!(find(&obs, "blk_read_time").value, MetricValue::Float(1.25));
        assert_eq!(find(&obs, "blk_write_time").value, MetricValue::Float(1.25));
    }

    #[test]
    fn stat_row_too_short_is_scan_error() {
        let row = SqlRow::from_pairs([("datname", Value::from("app"))]);
        let err = map_stat_database_row(&row, "host=db1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Scan);
    }

    #[test]
    fn fixed_layout_maps_schema_table_size() {
        let def = QueryDefinition::new("tables_size", "SELECT ...");
        let layout = QueryLayout::for_definition(&def);
        assert_eq!(layout, QueryLayout::Fixed);

        let row = SqlRow::from_pairs([
            ("schema", Value::from("public")),
            ("table", Value::from("orders")),
            ("bytes", Value::Int(2048)),
        ]);
        let obs = layout.map_row(&row, "host=db1", "app").unwrap();

        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].metric, "size");
        assert_eq!(obs[0].value, MetricValue::Float(2048.0));
        assert_eq!(obs[0].tag("schema"), Some("public"));
        assert_eq!(obs[0].tag("table"), Some("orders"));
        assert_eq!(obs[0].tag("db"), Some("app"));
        assert_eq!(obs[0].tag("server"), Some("host=db1"));
    }

    #[test]
    fn fixed_layout_rejects_other_shapes() {
        let layout = QueryLayout::Fixed;
        let wide = SqlRow::from_pairs([
            ("a", Value::from("x")),
            ("b", Value::from("y")),
            ("c", Value::Float(1.0)),
            ("d", Value::Float(2.0)),
        ]);
        assert_eq!(
            layout.map_row(&wide, "s", "db").unwrap_err().kind(),
            ErrorKind::Scan
        );

        let swapped = SqlRow::from_pairs([
            ("size", Value::Float(1.0)),
            ("schema", Value::from("public")),
            ("table", Value::from("t")),
        ]);
        assert_eq!(
            layout.map_row(&swapped, "s", "db").unwrap_err().kind(),
            ErrorKind::Scan
        );
    }

    #[test]
    fn declared_layout_uses_named_columns() {
        let def = QueryDefinition::new("tables_size", "SELECT ...")
            .with_tags(["schema", "table"])
            .with_values(["bytes", "rows"]);
        let layout = QueryLayout::for_definition(&def);

        let row = SqlRow::from_pairs([
            ("rows", Value::Int(10)),
            ("table", Value::from("orders")),
            ("bytes", Value::Int(8192)),
            ("schema", Value::from("public")),
        ]);
        let obs = layout.map_row(&row, "host=db1", "app").unwrap();

        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].metric, "bytes");
        assert_eq!(obs[0].value, MetricValue::Int(8192));
        assert_eq!(obs[1].metric, "rows");
        assert_eq!(obs[1].value, MetricValue::Int(10));
        assert_eq!(obs[1].tag("table"), Some("orders"));
        assert_eq!(obs[1].tag("schema"), Some("public"));
        assert_eq!(obs[1].tag("db"), Some("app"));
    }

    #[test]
    fn declared_layout_missing_column_is_scan_error() {
        let def = QueryDefinition::new("q", "SELECT 1").with_values(["bytes"]);
        let row = SqlRow::from_pairs([("size", Value::Int(1))]);
        let err = QueryLayout::for_definition(&def)
            .map_row(&row, "s", "db")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Scan);
        assert!(err.to_string().contains("bytes"));
    }

    #[test]
    fn declared_layout_rejects_text_values_and_null_tags() {
        let def = QueryDefinition::new("q", "SELECT 1")
            .with_tags(["name"])
            .with_values(["v"]);
        let layout = QueryLayout::for_definition(&def);

        let text_value = SqlRow::from_pairs([("name", Value::from("a")), ("v", Value::from("1"))]);
        assert!(layout.map_row(&text_value, "s", "db").is_err());

        let null_tag = SqlRow::from_pairs([("name", Value::Null), ("v", Value::Int(1))]);
        assert!(layout.map_row(&null_tag, "s", "db").is_err());
    }

    #[test]
    fn declared_layout_cannot_replace_server_or_db() {
        let row = SqlRow::from_pairs([
            ("server", Value::from("other")),
            ("db", Value::from("shared")),
            ("v", Value::Int(1)),
        ]);
        for reserved in RESERVED_TAGS {
            let def = QueryDefinition::new("q", "SELECT 1")
                .with_tags([reserved])
                .with_values(["v"]);
            let err = QueryLayout::for_definition(&def)
                .map_row(&row, "host=db1", "app")
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Scan);
            assert!(err.to_string().contains(reserved));
        }

        // the same columns are fine as metric values
        let def = QueryDefinition::new("q", "SELECT 1").with_values(["v"]);
        let obs = QueryLayout::for_definition(&def)
            .map_row(&row, "host=db1", "app")
            .unwrap();
        assert_eq!(obs[0].tag("server"), Some("host=db1"));
        assert_eq!(obs[0].tag("db"), Some("app"));
    }
}
