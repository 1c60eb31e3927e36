use serde::{Deserialize, Serialize};

/// Rows collected by [`QueryExecutionAdapter::run`](super::QueryExecutionAdapter::run).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query_id: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Tab-separated text with a header line, truncated to `max_rows`.
    pub fn render_text(&self, max_rows: usize) -> String {
        if self.rows.is_empty() {
            return "Query returned no rows".to_string();
        }
        let mut out = self.columns.join("\t");
        for row in self.rows.iter().take(max_rows) {
            out.push('\n');
            out.push_str(&row.join("\t"));
        }
        if self.rows.len() > max_rows {
            out.push_str(&format!(
                "\n... (showing {} of {} rows)",
                max_rows,
                self.rows.len()
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(n: usize) -> QueryResult {
        QueryResult {
            query_id: "q".into(),
            columns: vec!["zone".into(), "trips".into()],
            rows: (0..n).map(|i| vec![format!("z{}", i), i.to_string()]).collect(),
        }
    }

    #[test]
    fn test_render_truncates() {
        let text = result(5).render_text(2);
        assert_eq!(text, "zone\ttrips\nz0\t0\nz1\t1\n... (showing 2 of 5 rows)");
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(result(0).render_text(10), "Query returned no rows");
    }
}
