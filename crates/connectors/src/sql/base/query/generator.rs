use crate::sql::base::query::dialect::Dialect;

/// Renders the statements the drivers run. Table, column and condition text
/// is inserted verbatim.
pub struct QueryGenerator<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> QueryGenerator<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn select(&self, table: &str, columns: &[String], condition: Option<&str>) -> String {
        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), table);
        if let Some(condition) = condition {
            sql.push_str(" WHERE ");
            sql.push_str(condition);
        }
        sql
    }

    pub fn insert(&self, table: &str, columns: &[String]) -> String {
        let placeholders = (0..columns.len())
            .map(|i| self.dialect.get_placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        )
    }

    /// Substitutes the first `{0}` in `template` with the table name.
    pub fn truncate(&self, template: &str, table: &str) -> String {
        template.replacen("{0}", table, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::base::query::dialect::{Generic, MySql, Postgres};

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn select_without_condition_has_no_where() {
        let generator = QueryGenerator::new(&Generic);
        let sql = generator.select("users", &columns(&["id", "name"]), None);
        assert_eq!(sql, "SELECT id, name FROM users");
    }

    #[test]
    fn select_with_condition_has_single_where() {
        let generator = QueryGenerator::new(&Generic);
        let sql = generator.select("users", &columns(&["id"]), Some("id > 10 AND name <> ''"));
        assert_eq!(sql, "SELECT id FROM users WHERE id > 10 AND name <> ''");
        assert_eq!(sql.matches("WHERE").count(), 1);
    }

    #[test]
    fn insert_placeholders_follow_dialect() {
        let cols = columns(&["id", "name", "id"]);
        assert_eq!(
            QueryGenerator::new(&MySql).insert("users", &cols),
            "INSERT INTO users (id, name, id) VALUES (?, ?, ?)"
        );
        assert_eq!(
            QueryGenerator::new(&Postgres).insert("users", &cols),
            "INSERT INTO users (id, name, id) VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn truncate_renders_template() {
        let generator = QueryGenerator::new(&Generic);
        assert_eq!(
            generator.truncate("TRUNCATE TABLE {0}", "users"),
            "TRUNCATE TABLE users"
        );
        assert_eq!(
            generator.truncate("DELETE FROM {0} WHERE KEY = 1", "users"),
            "DELETE FROM users WHERE KEY = 1"
        );
    }
}
