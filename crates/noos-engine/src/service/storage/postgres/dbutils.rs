//! `DBErrorHandler`: translates `sqlx::Error` into [`EngineError`], grounded
//! on `implementations/postgres/dbutils.rs`'s Postgres-error-code mapping.

use crate::error::EngineError;

pub(crate) trait DBErrorHandler
where
    Self: ToString + Sized + Send + Sync + std::error::Error + 'static,
{
    fn into_engine_error(self, message: impl Into<String>) -> EngineError;
}

impl DBErrorHandler for sqlx::Error {
    fn into_engine_error(self, message: impl Into<String>) -> EngineError {
        match &self {
            Self::Database(db) => {
                if db.is_unique_violation() {
                    return EngineError::conflict(message.into()).with_source(self);
                }
                match db.code().as_deref() {
                    // https://www.postgresql.org/docs/current/errcodes-appendix.html
                    Some(
                        "2D000" | "25000" | "25001" | "25P01" | "25P02" | "25P03" | "40000"
                        | "40001" | "40002" | "40003" | "40004",
                    ) => EngineError::conflict("concurrent modification failed")
                        .with_detail(message.into())
                        .with_source(self),
                    _ => EngineError::internal(message.into()).with_source(self),
                }
            }
            Self::RowNotFound => EngineError::not_found(message.into()),
            _ => EngineError::internal(message.into()).with_source(self),
        }
    }
}
