//! SQL for built-in `pg_stat_database` collection.
//!
//! Columns are listed explicitly so the positional layout is the same on
//! every server version (newer releases append columns to the view):
//!
//! | # | column | | # | column |
//! |---|--------|-|---|--------|
//! | 0 | datid (ignored) | | 10 | tup_updated |
//! | 1 | datname | | 11 | tup_deleted |
//! | 2 | numbackends (ignored) | | 12 | conflicts |
//! | 3 | xact_commit | | 13 | temp_files |
//! | 4 | xact_rollback | | 14 | temp_bytes |
//! | 5 | blks_read | | 15 | deadlocks |
//! | 6 | blks_hit | | 16 | blk_read_time |
//! | 7 | tup_returned | | 17 | blk_write_time |
//! | 8 | tup_fetched | | 18 | stats_reset (ignored) |
//! | 9 | tup_inserted | | | |

/// Number of columns selected by the built-in queries.
pub const STAT_DATABASE_COLUMNS: usize = 19;

const STAT_DATABASE_SELECT: &str = r#"
            SELECT
                datid,
                COALESCE(datname, '') as datname,
                COALESCE(numbackends, 0)::bigint as numbackends,
                COALESCE(xact_commit, 0)::bigint as xact_commit,
                COALESCE(xact_rollback, 0)::bigint as xact_rollback,
                COALESCE(blks_read, 0)::bigint as blks_read,
                COALESCE(blks_hit, 0)::bigint as blks_hit,
                COALESCE(tup_returned, 0)::bigint as tup_returned,
                COALESCE(tup_fetched, 0)::bigint as tup_fetched,
                COALESCE(tup_inserted, 0)::bigint as tup_inserted,
                COALESCE(tup_updated, 0)::bigint as tup_updated,
                COALESCE(tup_deleted, 0)::bigint as tup_deleted,
                COALESCE(conflicts, 0)::bigint as conflicts,
                COALESCE(temp_files, 0)::bigint as temp_files,
                COALESCE(temp_bytes, 0)::bigint as temp_bytes,
                COALESCE(deadlocks, 0)::bigint as deadlocks,
                COALESCE(blk_read_time, 0)::double precision as blk_read_time,
                COALESCE(blk_write_time, 0)::double precision as blk_write_time,
                stats_reset
            FROM pg_stat_database
"#;

/// Statistics for every database on the server.
pub fn build_stat_database_all_query() -> String {
    format!("{STAT_DATABASE_SELECT}            WHERE datname IS NOT NULL\n")
}

/// Statistics for one database; `$1` is the database name.
pub fn build_stat_database_one_query() -> String {
    format!("{STAT_DATABASE_SELECT}            WHERE datname = $1\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selected_columns(q: &str) -> Vec<String> {
        let select = q
            .split("SELECT")
            .nth(1)
            .and_then(|s| s.split("FROM").next())
            .unwrap_or_default();
        select
            .split(",\n")
            .map(|c| c.split_whitespace().last().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn stat_database_query_selects_documented_layout() {
        let cols = selected_columns(&build_stat_database_all_query());
        assert_eq!(cols.len(), STAT_DATABASE_COLUMNS);
        assert_eq!(cols[1], "datname");
        assert_eq!(cols[3], "xact_commit");
        assert_eq!(cols[15], "deadlocks");
        assert_eq!(cols[16], "blk_read_time");
        assert_eq!(cols[17], "blk_write_time");
        assert_eq!(cols[18], "stats_reset");
    }

    #[test]
    fn stat_database_all_query_has_no_parameters() {
        let q = build_stat_database_all_query();
        assert!(q.contains("FROM pg_stat_database"));
        assert!(q.contains("WHERE datname IS NOT NULL"));
        assert!(!q.contains("$1"));
    }

    #[test]
    fn stat_database_one_query_filters_by_name() {
        let q = build_stat_database_one_query();
        assert!(q.contains("WHERE datname = $1"));
    }
}
