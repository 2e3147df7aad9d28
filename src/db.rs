use std::fs;
use std::path::{Path, PathBuf};

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement};
use url::Url;

use crate::entities::{cat, mission, target};
use crate::error::AppError;

/// At most one active mission per cat. Enforced by the store so that two
/// concurrent assignments cannot both pass the engine's check.
const ACTIVE_MISSION_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS idx_missions_active_cat \
     ON missions (cat_id) WHERE completed = 0 AND cat_id IS NOT NULL;";

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn absolute_path(path: &Path) -> Result<PathBuf, AppError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    let path = absolute_path(path)?;
    let mut url = Url::from_file_path(&path)
        .map_err(|_| AppError::InvalidInput(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    Ok(Database::connect(&sqlite_url).await?)
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await?;

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut cat_stmt = schema.create_table_from_entity(cat::Entity);
    cat_stmt.if_not_exists();
    db.execute(builder.build(&cat_stmt)).await?;

    let mut mission_stmt = schema.create_table_from_entity(mission::Entity);
    mission_stmt.if_not_exists();
    db.execute(builder.build(&mission_stmt)).await?;

    let mut target_stmt = schema.create_table_from_entity(target::Entity);
    target_stmt.if_not_exists();
    db.execute(builder.build(&target_stmt)).await?;

    let mut target_name_index = Index::create()
        .name("uq_target_mission_name")
        .table(target::Entity)
        .col(target::Column::MissionId)
        .col(target::Column::Name)
        .unique()
        .to_owned();
    target_name_index.if_not_exists();
    db.execute(builder.build(&target_name_index)).await?;

    let mut mission_cat_index = Index::create()
        .name("idx_missions_cat")
        .table(mission::Entity)
        .col(mission::Column::CatId)
        .to_owned();
    mission_cat_index.if_not_exists();
    db.execute(builder.build(&mission_cat_index)).await?;

    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        ACTIVE_MISSION_INDEX,
    ))
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("nested").join("spy_cats.db");
        ensure_parent_dir(&path).expect("ensure parent");
        let db = connect(&path).await.expect("connect db");
        ensure_schema(&db).await.expect("first schema");
        ensure_schema(&db).await.expect("second schema");
        assert!(path.exists());
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let resolved = absolute_path(Path::new("spy_cats.db")).expect("absolute");
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("spy_cats.db"));
    }
}
