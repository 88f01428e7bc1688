//! Static SQL safety checks, dialect normalization, and limit injection.
//!
//! These run before every execution attempt inside the metrics agent's
//! repair loop. Checks are intentionally textual; the engine does not
//! parse SQL, it only enforces the structural contract (SELECT-only,
//! known tables, no fabricated rows, bounded result size).

use std::sync::LazyLock;

use regex::Regex;

use op_capabilities::KNOWN_TABLES;

static LIMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\b").expect("static pattern"));
static LIMIT_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\s+(\d+)").expect("static pattern"));
static STRING_AGG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSTRING_AGG\s*\(").expect("static pattern"));
// GROUP_CONCAT(DISTINCT x, ', ') is invalid in SQLite; the delimiter
// argument must be dropped when DISTINCT is present.
static DISTINCT_DELIM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bGROUP_CONCAT\s*\(\s*DISTINCT\s+([^,()]+?)\s*,\s*[^)]*\)")
        .expect("static pattern")
});
static VALUES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bVALUES\s*\(").expect("static pattern"));
static UNION_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bUNION(\s+ALL)?\b").expect("static pattern"));
static FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFROM\b").expect("static pattern"));

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Check failures
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why a statement failed a static check. The description is fed back
/// into the repair loop verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlCheckError {
    NotSelect,
    NoKnownTable,
    LiteralRows,
    LiteralUnion,
    UnsupportedAggregate,
}

impl std::fmt::Display for SqlCheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SqlCheckError::NotSelect => {
                "only read-only SELECT statements are allowed (WITH ... SELECT is fine)"
            }
            SqlCheckError::NoKnownTable => {
                "the query must read from at least one of: agent_runs, call_model, call_tool, call_chain"
            }
            SqlCheckError::LiteralRows => {
                "fabricating rows with VALUES (...) is not allowed; query real tables instead"
            }
            SqlCheckError::LiteralUnion => {
                "every UNION branch must select FROM a real table, not literal values"
            }
            SqlCheckError::UnsupportedAggregate => {
                "STRING_AGG is not supported by this dialect; use GROUP_CONCAT"
            }
        };
        f.write_str(text)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Normalization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Rewrite known dialect incompatibilities. Idempotent: normalizing an
/// already-normalized statement is a no-op.
pub fn normalize(sql: &str) -> String {
    let sql = STRING_AGG_RE.replace_all(sql, "GROUP_CONCAT(");
    let sql = DISTINCT_DELIM_RE.replace_all(&sql, "GROUP_CONCAT(DISTINCT $1)");
    sql.trim().to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Static safety check. Call [`normalize`] first; a statement that still
/// carries STRING_AGG after normalization is rejected here.
pub fn validate(sql: &str) -> Result<(), SqlCheckError> {
    let trimmed = sql.trim();
    let upper = trimmed.to_uppercase();

    if !(upper.starts_with("SELECT") || upper.starts_with("WITH")) {
        return Err(SqlCheckError::NotSelect);
    }
    if upper.starts_with("WITH") && !upper.contains("SELECT") {
        return Err(SqlCheckError::NotSelect);
    }
    if STRING_AGG_RE.is_match(trimmed) {
        return Err(SqlCheckError::UnsupportedAggregate);
    }
    if VALUES_RE.is_match(trimmed) {
        return Err(SqlCheckError::LiteralRows);
    }
    if UNION_SPLIT_RE.is_match(trimmed) {
        for branch in UNION_SPLIT_RE.split(trimmed) {
            if !FROM_RE.is_match(branch) {
                return Err(SqlCheckError::LiteralUnion);
            }
        }
    }

    let lowered = trimmed.to_lowercase();
    if !KNOWN_TABLES.iter().any(|t| references_table(&lowered, t)) {
        return Err(SqlCheckError::NoKnownTable);
    }

    Ok(())
}

fn references_table(lowered_sql: &str, table: &str) -> bool {
    lowered_sql.match_indices(table).any(|(idx, _)| {
        let before_ok = idx == 0
            || !lowered_sql.as_bytes()[idx - 1].is_ascii_alphanumeric()
                && lowered_sql.as_bytes()[idx - 1] != b'_';
        let end = idx + table.len();
        let after_ok = end >= lowered_sql.len()
            || !lowered_sql.as_bytes()[end].is_ascii_alphanumeric()
                && lowered_sql.as_bytes()[end] != b'_';
        before_ok && after_ok
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Limit injection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Append `LIMIT default_limit` when the statement has no limit of its
/// own. A pre-existing limit is preserved unchanged. Returns the
/// (possibly rewritten) statement and whether the limit was injected.
pub fn ensure_limit(sql: &str, default_limit: u64) -> (String, bool) {
    if LIMIT_RE.is_match(sql) {
        return (sql.to_string(), false);
    }
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    (format!("{trimmed} LIMIT {default_limit}"), true)
}

/// The numeric LIMIT value, if the statement carries one.
pub fn extract_limit(sql: &str) -> Option<u64> {
    LIMIT_VALUE_RE
        .captures(sql)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_agg_is_rewritten_and_renormalizing_is_noop() {
        let sql = "SELECT STRING_AGG(tool_name, ', ') FROM call_tool";
        let once = normalize(sql);
        assert_eq!(once, "SELECT GROUP_CONCAT(tool_name, ', ') FROM call_tool");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn distinct_delimiter_is_stripped() {
        let sql = "SELECT GROUP_CONCAT(DISTINCT tool_name, ', ') FROM call_tool";
        assert_eq!(
            normalize(sql),
            "SELECT GROUP_CONCAT(DISTINCT tool_name) FROM call_tool"
        );
    }

    #[test]
    fn non_select_statements_are_rejected() {
        assert_eq!(
            validate("DELETE FROM agent_runs"),
            Err(SqlCheckError::NotSelect)
        );
        assert_eq!(
            validate("UPDATE call_tool SET tool_status = 'ok'"),
            Err(SqlCheckError::NotSelect)
        );
    }

    #[test]
    fn cte_select_is_accepted() {
        let sql = "WITH recent AS (SELECT run_id FROM agent_runs LIMIT 5) \
                   SELECT COUNT(*) FROM recent";
        assert_eq!(validate(sql), Ok(()));
    }

    #[test]
    fn unknown_tables_are_rejected() {
        assert_eq!(
            validate("SELECT * FROM users LIMIT 10"),
            Err(SqlCheckError::NoKnownTable)
        );
        // Substring matches do not count as a table reference.
        assert_eq!(
            validate("SELECT * FROM agent_runs_archive LIMIT 10"),
            Err(SqlCheckError::NoKnownTable)
        );
    }

    #[test]
    fn literal_rows_and_unions_are_rejected() {
        assert_eq!(
            validate("SELECT * FROM (VALUES (1, 2)) JOIN agent_runs"),
            Err(SqlCheckError::LiteralRows)
        );
        assert_eq!(
            validate("SELECT run_id FROM agent_runs UNION SELECT 'fake'"),
            Err(SqlCheckError::LiteralUnion)
        );
        assert_eq!(
            validate(
                "SELECT run_id FROM agent_runs UNION ALL SELECT run_id FROM call_model LIMIT 5"
            ),
            Ok(())
        );
    }

    #[test]
    fn unnormalized_string_agg_is_rejected() {
        assert_eq!(
            validate("SELECT STRING_AGG(tool_name, ',') FROM call_tool"),
            Err(SqlCheckError::UnsupportedAggregate)
        );
    }

    #[test]
    fn limit_injection_is_idempotent() {
        let (with_limit, added) = ensure_limit("SELECT * FROM agent_runs;", 100);
        assert_eq!(with_limit, "SELECT * FROM agent_runs LIMIT 100");
        assert!(added);

        let (unchanged, added) = ensure_limit(&with_limit, 100);
        assert_eq!(unchanged, with_limit);
        assert!(!added);

        // An existing limit is preserved, not rewritten.
        let (kept, added) = ensure_limit("SELECT * FROM agent_runs LIMIT 7", 100);
        assert_eq!(kept, "SELECT * FROM agent_runs LIMIT 7");
        assert!(!added);
        assert_eq!(extract_limit(&kept), Some(7));
    }

    #[test]
    fn extract_limit_handles_missing_and_lowercase() {
        assert_eq!(extract_limit("SELECT * FROM agent_runs"), None);
        assert_eq!(extract_limit("select * from agent_runs limit 42"), Some(42));
    }
}
