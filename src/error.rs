use sqlx::Error as SqlxError;
use sqlx::error::ErrorKind;
use sqlx::migrate::MigrateError;
use thiserror::Error as ThisError;
use validator::ValidationErrors;

#[derive(Debug, ThisError)]
pub enum DataError {
    #[error("Invalid data: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Foreign key constraint violated: {constraint}")]
    ForeignKeyViolation { constraint: String },

    #[error("Not-null constraint violated: {constraint}")]
    NotNullViolation { constraint: String },

    #[error("Unsupported database url scheme: {0}")]
    UnsupportedDatabase(String),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Database error: {0}")]
    Database(SqlxError),
}

impl DataError {
    /// True when validation rejected `field` before any query ran.
    pub fn is_invalid(&self, field: &str) -> bool {
        matches!(self, DataError::Validation(errors) if errors.errors().contains_key(field))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::Database(SqlxError::RowNotFound))
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DataError::UniqueViolation { .. })
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, DataError::ForeignKeyViolation { .. })
    }
}

/// Constraint failures are lifted out of the driver error so callers can
/// branch on them without caring which engine produced them.
impl From<SqlxError> for DataError {
    fn from(e: SqlxError) -> Self {
        let SqlxError::Database(db_err) = &e else {
            return DataError::Database(e);
        };
        // SQLite leaves `constraint()` empty and names the column in the message.
        let constraint = db_err
            .constraint()
            .map(str::to_string)
            .unwrap_or_else(|| db_err.message().to_string());
        match db_err.kind() {
            ErrorKind::UniqueViolation => DataError::UniqueViolation { constraint },
            ErrorKind::ForeignKeyViolation => DataError::ForeignKeyViolation { constraint },
            ErrorKind::NotNullViolation => DataError::NotNullViolation { constraint },
            _ => DataError::Database(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_stays_a_database_error() {
        let err: DataError = SqlxError::RowNotFound.into();
        assert!(err.is_not_found());
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn validation_errors_name_the_field() {
        let mut errors = ValidationErrors::new();
        errors.add("title", validator::ValidationError::new("length"));
        let err = DataError::from(errors);
        assert!(err.is_invalid("title"));
        assert!(!err.is_invalid("description"));
        assert!(err.to_string().starts_with("Invalid data: "));
    }
}
