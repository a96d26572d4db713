/*!
SQL statement synthesis for restored tables.

Table and column names come from the snapshot and are interpolated into
DDL/DML, so they must pass [`validate_identifier`] first and are always
double-quoted. Row values are bound as parameters. [`quote_literal`] is only
used to render statements as text (restore previews), never for execution.
*/

use once_cell::sync::Lazy;
use regex::Regex;

use crate::snapshot::Row;
use crate::{Result, VaultError};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]{0,127}$").expect("identifier pattern is valid")
});

/// Accept only plain SQL identifiers
pub fn validate_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(VaultError::invalid_identifier(name))
    }
}

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote a text literal, doubling embedded quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `CREATE TABLE IF NOT EXISTS` with one TEXT column per column of `sample`
pub fn create_table_statement(table: &str, sample: &Row) -> Result<String> {
    let columns = sample
        .columns()
        .map(|column| validate_identifier(column).map(|c| format!("{} TEXT", quote_identifier(c))))
        .collect::<Result<Vec<_>>>()?;
    if columns.is_empty() {
        return Err(VaultError::validation(format!(
            "Cannot create table {table:?} from a row without columns"
        )));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(validate_identifier(table)?),
        columns.join(", ")
    ))
}

/// Parameterized `INSERT OR REPLACE` for the columns of `row`, in row order
pub fn replace_statement(table: &str, row: &Row) -> Result<String> {
    let columns = row
        .columns()
        .map(|column| validate_identifier(column).map(quote_identifier))
        .collect::<Result<Vec<_>>>()?;
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>();
    Ok(format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        quote_identifier(validate_identifier(table)?),
        columns.join(", "),
        placeholders.join(", ")
    ))
}

/// Render an `INSERT OR REPLACE` with inline literals, for display only
pub fn render_replace_statement(table: &str, row: &Row) -> Result<String> {
    let columns = row
        .columns()
        .map(|column| validate_identifier(column).map(quote_identifier))
        .collect::<Result<Vec<_>>>()?;
    let values = row
        .values()
        .map(|value| value.map_or_else(|| "NULL".to_string(), quote_literal))
        .collect::<Vec<_>>();
    Ok(format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({});",
        quote_identifier(validate_identifier(table)?),
        columns.join(", "),
        values.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_allow_list() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("_private_2").is_ok());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("users; DROP TABLE x").is_err());
        assert!(validate_identifier("na\"me").is_err());
        assert!(validate_identifier(&"a".repeat(200)).is_err());
    }

    #[test]
    fn test_quote_doubling() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_create_table_from_sample_row() {
        let row = Row::new().with("id", "1").with("name", "Alice");
        assert_eq!(
            create_table_statement("users", &row).unwrap(),
            r#"CREATE TABLE IF NOT EXISTS "users" ("id" TEXT, "name" TEXT)"#
        );
        assert!(create_table_statement("users", &Row::new()).is_err());
        assert!(create_table_statement("bad name", &row).is_err());
    }

    #[test]
    fn test_replace_statement_uses_placeholders() {
        let row = Row::new().with("id", "1").with("name", "Alice");
        assert_eq!(
            replace_statement("users", &row).unwrap(),
            r#"INSERT OR REPLACE INTO "users" ("id", "name") VALUES (?1, ?2)"#
        );
    }

    #[test]
    fn test_rendered_statement_escapes_quotes() {
        let mut row = Row::new().with("id", "1").with("name", "it's");
        row.push("bio", None);
        assert_eq!(
            render_replace_statement("users", &row).unwrap(),
            r#"INSERT OR REPLACE INTO "users" ("id", "name", "bio") VALUES ('1', 'it''s', NULL);"#
        );
    }
}
