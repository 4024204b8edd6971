//! Names derived from the source file.

use std::path::Path;

use chrono::{DateTime, TimeZone};

/// PostgreSQL truncates identifiers longer than this many bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Database name for a source file: its stem, lowercased.
///
/// `/uploads/Sales.MDB` → `sales`. Returns `None` when the path has no
/// usable file stem.
pub fn database_name(source: &Path) -> Option<String> {
    let stem = source.file_stem()?.to_str()?.trim();
    if stem.is_empty() {
        return None;
    }
    Some(stem.to_lowercase())
}

/// Role created to own `database` when no role name is given.
pub fn default_role(database: &str) -> String {
    format!("{database}_user")
}

/// `<database>_<YYYYmmddHHMMSS>`, shortened to fit an identifier.
pub fn backup_name<Tz: TimeZone>(database: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let suffix = format!("_{}", at.format("%Y%m%d%H%M%S"));
    let budget = MAX_IDENTIFIER_LEN.saturating_sub(suffix.len());
    format!("{}{}", truncate_at_char_boundary(database, budget), suffix)
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn sanitize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// `schema_<database>.sql`
pub fn schema_file_name(database: &str) -> String {
    format!("schema_{}.sql", sanitize(database))
}

/// `table_<table>.sql`, with anything outside `[a-z0-9_]` replaced by `_`.
pub fn table_file_name(table: &str) -> String {
    format!("table_{}.sql", sanitize(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_database_name_from_stem() {
        assert_eq!(database_name(Path::new("/uploads/Sales.MDB")).as_deref(), Some("sales"));
        assert_eq!(database_name(Path::new("Inventory 2019.mdb")).as_deref(), Some("inventory 2019"));
        // a plain strip of ".mdb" characters would eat the trailing "d"
        assert_eq!(database_name(Path::new("Bid.mdb")).as_deref(), Some("bid"));
        assert_eq!(database_name(Path::new("/")), None);
    }

    #[test]
    fn test_default_role() {
        assert_eq!(default_role("sales"), "sales_user");
    }

    #[test]
    fn test_backup_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(backup_name("sales", &at), "sales_20240309140507");
    }

    #[test]
    fn test_backup_name_fits_identifier_limit() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let long = "é".repeat(40);
        let name = backup_name(&long, &at);
        assert!(name.len() <= MAX_IDENTIFIER_LEN);
        assert!(name.ends_with("_20240309140507"));
    }

    #[test]
    fn test_artifact_file_names() {
        assert_eq!(schema_file_name("sales"), "schema_sales.sql");
        assert_eq!(table_file_name("Order Details"), "table_order_details.sql");
        assert_eq!(table_file_name("Customers"), "table_customers.sql");
    }
}
