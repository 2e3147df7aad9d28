use thiserror::Error;

use crate::breeds::BreedError;

/// Coarse classification used by the HTTP layer to pick a status code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    Upstream,
    Internal,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("breed catalog unavailable: {0}")]
    Upstream(#[from] BreedError),

    #[error("cat id {0} not found")]
    CatNotFound(i64),
    #[error("mission id {0} not found")]
    MissionNotFound(i64),
    #[error("target id {0} not found")]
    TargetNotFound(i64),

    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown breed: {0}")]
    InvalidBreed(String),
    #[error("a mission needs between 1 and 3 targets, got {0}")]
    InvalidTargetCount(usize),
    #[error("duplicate target name in mission: {0}")]
    DuplicateTargetName(String),

    #[error("cat id {0} already has an active mission")]
    CatAlreadyHasActiveMission(i64),
    #[error("mission id {0} is completed and cannot be updated")]
    MissionAlreadyCompleted(i64),
    #[error("target id {0} is completed and cannot be updated")]
    TargetAlreadyCompleted(i64),
    #[error("mission id {0} is assigned and cannot be deleted")]
    AssignedMissionCannotBeDeleted(i64),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::CatNotFound(_) | AppError::MissionNotFound(_) | AppError::TargetNotFound(_) => {
                ErrorKind::NotFound
            }
            AppError::InvalidInput(_)
            | AppError::InvalidBreed(_)
            | AppError::InvalidTargetCount(_)
            | AppError::DuplicateTargetName(_) => ErrorKind::Validation,
            AppError::CatAlreadyHasActiveMission(_)
            | AppError::MissionAlreadyCompleted(_)
            | AppError::TargetAlreadyCompleted(_)
            | AppError::AssignedMissionCannotBeDeleted(_) => ErrorKind::Conflict,
            AppError::Upstream(_) => ErrorKind::Upstream,
            AppError::Io(_) | AppError::Db(_) | AppError::Json(_) => ErrorKind::Internal,
        }
    }
}

/// True when the store rejected a write because of a unique index.
pub fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    )
}
