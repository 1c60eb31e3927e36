//! Rewrites PostgreSQL-flavoured SQL into what the query engine accepts.

use std::sync::OnceLock;

use regex::Regex;

fn ilike_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(\w+(?:\.\w+)?)\s+(NOT\s+)?ILIKE\s+('[^']*'|"[^"]*"|[^\s,)]+)"#).ok()
    })
    .as_ref()
}

/// Apply every rewrite in order.
pub fn rewrite_sql(sql: &str) -> String {
    let sql = sql.trim();
    let sql = translate_catalog_queries(sql);
    rewrite_ilike(&sql)
}

/// `x [NOT] ILIKE 'p'` becomes `LOWER(x) [NOT ]LIKE LOWER('p')`.
///
/// Matches starting inside a single-quoted literal are left alone.
pub fn rewrite_ilike(sql: &str) -> String {
    let Some(re) = ilike_re() else {
        return sql.to_string();
    };
    re.replace_all(sql, |caps: &regex::Captures<'_>| {
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        if in_string_literal(&sql[..start]) {
            return caps[0].to_string();
        }
        let not = if caps.get(2).is_some() { "NOT " } else { "" };
        format!("LOWER({}) {}LIKE LOWER({})", &caps[1], not, &caps[3])
    })
    .into_owned()
}

/// An odd number of quotes before a position puts it inside a literal.
/// Escaped `''` pairs keep the parity.
fn in_string_literal(prefix: &str) -> bool {
    prefix.bytes().filter(|b| *b == b'\'').count() % 2 == 1
}

/// PostgreSQL catalog lookups have no equivalent in the engine.
pub fn translate_catalog_queries(sql: &str) -> String {
    let lower = sql.to_ascii_lowercase();
    if lower.contains("pg_tables") || lower.contains("information_schema.tables") {
        return "SHOW TABLES".to_string();
    }
    if lower.contains("information_schema.columns") || lower.contains("pg_attribute") {
        return "SELECT 'Use training data - tables are already loaded in memory' as info"
            .to_string();
    }
    sql.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ilike() {
        assert_eq!(
            rewrite_ilike("SELECT * FROM z WHERE zone ILIKE '%airport%'"),
            "SELECT * FROM z WHERE LOWER(zone) LIKE LOWER('%airport%')"
        );
        assert_eq!(
            rewrite_ilike("WHERE t.borough not ilike 'Queens' AND x = 1"),
            "WHERE LOWER(t.borough) NOT LIKE LOWER('Queens') AND x = 1"
        );
    }

    #[test]
    fn test_ilike_inside_literal_untouched() {
        assert_eq!(
            rewrite_ilike("SELECT * FROM notes WHERE note = 'a ILIKE b'"),
            "SELECT * FROM notes WHERE note = 'a ILIKE b'"
        );
        assert_eq!(
            rewrite_ilike("WHERE note = 'it''s ILIKE x' AND zone ILIKE '%jfk%'"),
            "WHERE note = 'it''s ILIKE x' AND LOWER(zone) LIKE LOWER('%jfk%')"
        );
    }

    #[test]
    fn test_plain_sql_untouched() {
        let sql = "SELECT count(*) FROM trips WHERE fare_amount > 10";
        assert_eq!(rewrite_sql(sql), sql);
    }

    #[test]
    fn test_catalog_queries() {
        assert_eq!(
            rewrite_sql("SELECT tablename FROM pg_tables WHERE schemaname='public'"),
            "SHOW TABLES"
        );
        assert_eq!(
            rewrite_sql("select * from INFORMATION_SCHEMA.TABLES"),
            "SHOW TABLES"
        );
        assert!(rewrite_sql("select column_name from information_schema.columns")
            .starts_with("SELECT 'Use training data"));
    }
}
