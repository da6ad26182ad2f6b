/**
 * Guarded Query Executor
 * Static checks over SQL text before it reaches the pool. This is a
 * guard-rail against accidentally unparameterized or obviously hostile query
 * strings, not a SQL parser: content-mutating routes must build their queries
 * through here. Migrations and the constant health probe go straight to the
 * pool.
 */
use lazy_static::lazy_static;
use regex::Regex;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgPool, Postgres, Transaction};
use std::future::Future;

lazy_static! {
    /// Denylisted fragments. Matching text is refused outright.
    static ref DENIED: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"(?i)\bdrop\s+table\b").unwrap(), "DROP TABLE"),
        (Regex::new(r"(?i)\bunion\s+select\b").unwrap(), "UNION SELECT"),
        (Regex::new(r"--").unwrap(), "line comment"),
        (Regex::new(r"/\*").unwrap(), "block comment"),
        (Regex::new(r"(?i)\b1\s*=\s*1\b").unwrap(), "1=1 condition"),
        (Regex::new(r"(?i)\bexec\s*\(").unwrap(), "EXEC("),
    ];

    /// Positional placeholder ($1, $2, ...).
    static ref PLACEHOLDER: Regex = Regex::new(r"\$\d+").unwrap();
}

#[derive(Debug, PartialEq, Eq)]
pub enum GuardError {
    /// Query text matched the denylist.
    Denied(&'static str),
    /// DML statement carries no positional placeholder, so it cannot have
    /// been parameterized.
    MissingPlaceholder,
}

impl std::fmt::Display for GuardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardError::Denied(what) => write!(f, "query refused: contains {}", what),
            GuardError::MissingPlaceholder => {
                write!(f, "query refused: statement has no positional placeholder")
            }
        }
    }
}

impl std::error::Error for GuardError {}

impl From<GuardError> for sqlx::Error {
    fn from(e: GuardError) -> Self {
        sqlx::Error::Protocol(e.to_string())
    }
}

/// Check one SQL string against the guard rules.
pub fn check_sql(sql: &str) -> Result<(), GuardError> {
    for (pattern, what) in DENIED.iter() {
        if pattern.is_match(sql) {
            return Err(GuardError::Denied(what));
        }
    }

    let first_word = sql
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    if matches!(first_word.as_str(), "select" | "insert" | "update" | "delete")
        && !PLACEHOLDER.is_match(sql)
    {
        return Err(GuardError::MissingPlaceholder);
    }

    Ok(())
}

/// Guarded `sqlx::query`.
pub fn query(sql: &str) -> Result<sqlx::query::Query<'_, Postgres, PgArguments>, GuardError> {
    check_sql(sql)?;
    Ok(sqlx::query(sql))
}

/// Guarded `sqlx::query_as`.
pub fn query_as<T>(
    sql: &str,
) -> Result<sqlx::query::QueryAs<'_, Postgres, T, PgArguments>, GuardError>
where
    T: for<'r> sqlx::FromRow<'r, PgRow>,
{
    check_sql(sql)?;
    Ok(sqlx::query_as::<Postgres, T>(sql))
}

/// Run a batch of statements on one connection inside BEGIN/COMMIT. The
/// closure receives the transaction by value and hands it back on success;
/// any error drops the transaction, which rolls it back.
pub async fn transaction<T, F, Fut>(pool: &PgPool, f: F) -> Result<T, sqlx::Error>
where
    F: FnOnce(Transaction<'static, Postgres>) -> Fut,
    Fut: Future<Output = Result<(Transaction<'static, Postgres>, T), sqlx::Error>>,
{
    let tx = pool.begin().await?;
    let (tx, value) = f(tx).await?;
    tx.commit().await?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameterized_dml_allowed() {
        assert!(check_sql("SELECT id FROM projects WHERE id = $1").is_ok());
        assert!(check_sql("UPDATE badges SET sort_order = $1 WHERE id = $2").is_ok());
        assert!(check_sql("DELETE FROM projects WHERE id = $1").is_ok());
    }

    #[test]
    fn test_unparameterized_dml_refused() {
        assert_eq!(
            check_sql("SELECT * FROM projects"),
            Err(GuardError::MissingPlaceholder)
        );
        assert_eq!(
            check_sql("delete from badges"),
            Err(GuardError::MissingPlaceholder)
        );
    }

    #[test]
    fn test_drop_table_refused() {
        assert_eq!(
            check_sql("SELECT $1; DROP TABLE projects"),
            Err(GuardError::Denied("DROP TABLE"))
        );
    }

    #[test]
    fn test_union_select_refused() {
        assert_eq!(
            check_sql("SELECT id FROM projects WHERE id = $1 UNION SELECT password FROM users"),
            Err(GuardError::Denied("UNION SELECT"))
        );
    }

    #[test]
    fn test_comment_sequences_refused() {
        assert!(matches!(
            check_sql("SELECT id FROM projects WHERE id = $1 -- hide"),
            Err(GuardError::Denied(_))
        ));
        assert!(matches!(
            check_sql("SELECT id FROM projects /* x */ WHERE id = $1"),
            Err(GuardError::Denied(_))
        ));
    }

    #[test]
    fn test_tautology_refused() {
        assert_eq!(
            check_sql("SELECT id FROM projects WHERE 1=1 AND id = $1"),
            Err(GuardError::Denied("1=1 condition"))
        );
        assert_eq!(
            check_sql("SELECT id FROM projects WHERE 1 = 1 AND id = $1"),
            Err(GuardError::Denied("1=1 condition"))
        );
    }

    #[test]
    fn test_exec_refused() {
        assert_eq!(
            check_sql("SELECT $1; EXEC (shutdown)"),
            Err(GuardError::Denied("EXEC("))
        );
    }

    #[test]
    fn test_non_dml_without_placeholder_allowed() {
        // BEGIN/COMMIT and similar control statements carry no parameters.
        assert!(check_sql("BEGIN").is_ok());
    }

    #[test]
    fn test_query_builder_refuses_bad_sql() {
        assert!(query("SELECT * FROM projects").is_err());
        assert!(query("SELECT id FROM projects WHERE id = $1").is_ok());
    }
}
