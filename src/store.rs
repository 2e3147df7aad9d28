//! Per-entity repositories.
//!
//! Each repository borrows a connection, which is either the pool or an open
//! transaction, so the engine decides the transaction boundary. Lookups by id
//! return `Option` and leave the not-found decision to the caller.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, Set,
};

use crate::entities::{cat, mission, target};
use crate::error::AppError;
use crate::model::{CatInput, CatQuery, MissionQuery, TargetChanges, TargetInput};
use crate::pagination::PageParams;

pub struct Cats<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> Cats<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: CatInput) -> Result<cat::Model, AppError> {
        let now = Utc::now();
        let active = cat::ActiveModel {
            name: Set(input.name),
            years_of_experience: Set(input.years_of_experience),
            breed: Set(input.breed),
            salary: Set(input.salary),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(active.insert(self.db).await?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<cat::Model>, AppError> {
        Ok(cat::Entity::find_by_id(id).one(self.db).await?)
    }

    pub async fn count(&self, query: &CatQuery) -> Result<u64, AppError> {
        Ok(Self::filtered(query).count(self.db).await?)
    }

    pub async fn list(
        &self,
        query: &CatQuery,
        page: PageParams,
    ) -> Result<Vec<cat::Model>, AppError> {
        Ok(Self::filtered(query)
            .order_by_asc(cat::Column::Id)
            .limit(page.limit)
            .offset(page.offset)
            .all(self.db)
            .await?)
    }

    pub async fn update_salary(&self, id: i64, salary: f64) -> Result<Option<cat::Model>, AppError> {
        let active = cat::ActiveModel {
            id: Set(id),
            salary: Set(salary),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        match active.update(self.db).await {
            Ok(model) => Ok(Some(model)),
            Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let result = cat::Entity::delete_by_id(id).exec(self.db).await?;
        Ok(result.rows_affected > 0)
    }

    fn filtered(query: &CatQuery) -> Select<cat::Entity> {
        let mut select = cat::Entity::find();
        if let Some(breed) = query.breed.as_deref() {
            select = select.filter(cat::Column::Breed.eq(breed));
        }
        select
    }
}

pub struct Missions<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> Missions<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn create(&self, completed: bool) -> Result<mission::Model, AppError> {
        let now = Utc::now();
        let active = mission::ActiveModel {
            completed: Set(completed),
            cat_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(active.insert(self.db).await?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<mission::Model>, AppError> {
        Ok(mission::Entity::find_by_id(id).one(self.db).await?)
    }

    pub async fn count(&self, query: &MissionQuery) -> Result<u64, AppError> {
        Ok(Self::filtered(query).count(self.db).await?)
    }

    pub async fn list(
        &self,
        query: &MissionQuery,
        page: PageParams,
    ) -> Result<Vec<mission::Model>, AppError> {
        Ok(Self::filtered(query)
            .order_by_asc(mission::Column::Id)
            .limit(page.limit)
            .offset(page.offset)
            .all(self.db)
            .await?)
    }

    /// An active mission held by `cat_id`, other than `excluding`.
    pub async fn active_for_cat(
        &self,
        cat_id: i64,
        excluding: i64,
    ) -> Result<Option<mission::Model>, AppError> {
        Ok(mission::Entity::find()
            .filter(mission::Column::CatId.eq(cat_id))
            .filter(mission::Column::Completed.eq(false))
            .filter(mission::Column::Id.ne(excluding))
            .order_by_asc(mission::Column::Id)
            .one(self.db)
            .await?)
    }

    /// Raw store errors are returned untouched so the caller can recognise a
    /// unique-index violation.
    pub async fn set_cat(&self, id: i64, cat_id: i64) -> Result<mission::Model, sea_orm::DbErr> {
        let active = mission::ActiveModel {
            id: Set(id),
            cat_id: Set(Some(cat_id)),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        active.update(self.db).await
    }

    pub async fn mark_completed(&self, id: i64) -> Result<mission::Model, AppError> {
        let active = mission::ActiveModel {
            id: Set(id),
            completed: Set(true),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        match active.update(self.db).await {
            Ok(model) => Ok(model),
            Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
                Err(AppError::MissionNotFound(id))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn unassign_cat(&self, cat_id: i64) -> Result<u64, AppError> {
        let result = mission::Entity::update_many()
            .col_expr(mission::Column::CatId, Expr::value(Option::<i64>::None))
            .col_expr(mission::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(mission::Column::CatId.eq(cat_id))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let result = mission::Entity::delete_by_id(id).exec(self.db).await?;
        Ok(result.rows_affected > 0)
    }

    fn filtered(query: &MissionQuery) -> Select<mission::Entity> {
        let mut select = mission::Entity::find();
        if let Some(completed) = query.completed {
            select = select.filter(mission::Column::Completed.eq(completed));
        }
        if let Some(cat_id) = query.cat_id {
            select = select.filter(mission::Column::CatId.eq(cat_id));
        }
        select
    }
}

pub struct Targets<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> Targets<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn create_many(
        &self,
        mission_id: i64,
        inputs: Vec<TargetInput>,
    ) -> Result<Vec<target::Model>, sea_orm::DbErr> {
        let now = Utc::now();
        let mut created = Vec::with_capacity(inputs.len());
        for input in inputs {
            let active = target::ActiveModel {
                mission_id: Set(mission_id),
                name: Set(input.name),
                country: Set(input.country),
                notes: Set(input.notes),
                completed: Set(input.completed),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            created.push(active.insert(self.db).await?);
        }
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<target::Model>, AppError> {
        Ok(target::Entity::find_by_id(id).one(self.db).await?)
    }

    pub async fn for_mission(&self, mission_id: i64) -> Result<Vec<target::Model>, AppError> {
        Ok(target::Entity::find()
            .filter(target::Column::MissionId.eq(mission_id))
            .order_by_asc(target::Column::Id)
            .all(self.db)
            .await?)
    }

    pub async fn for_missions(
        &self,
        mission_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<target::Model>>, AppError> {
        let mut grouped: HashMap<i64, Vec<target::Model>> = HashMap::new();
        if mission_ids.is_empty() {
            return Ok(grouped);
        }

        let targets = target::Entity::find()
            .filter(target::Column::MissionId.is_in(mission_ids.to_vec()))
            .order_by_asc(target::Column::MissionId)
            .order_by_asc(target::Column::Id)
            .all(self.db)
            .await?;

        for target in targets {
            grouped.entry(target.mission_id).or_default().push(target);
        }
        Ok(grouped)
    }

    /// Applies the present fields of `changes`. Returns the row unchanged
    /// when no field would differ.
    pub async fn update(
        &self,
        current: target::Model,
        changes: TargetChanges,
    ) -> Result<target::Model, AppError> {
        if changes.is_empty() {
            return Ok(current);
        }
        let mut active = target::ActiveModel {
            id: Set(current.id),
            ..Default::default()
        };
        let mut changed = false;
        if let Some(notes) = changes.notes {
            if current.notes.as_deref() != Some(notes.as_str()) {
                active.notes = Set(Some(notes));
                changed = true;
            }
        }
        if let Some(completed) = changes.completed {
            if current.completed != completed {
                active.completed = Set(completed);
                changed = true;
            }
        }
        if !changed {
            return Ok(current);
        }
        active.updated_at = Set(Utc::now());

        match active.update(self.db).await {
            Ok(model) => Ok(model),
            Err(sea_orm::DbErr::RecordNotFound(_)) | Err(sea_orm::DbErr::RecordNotUpdated) => {
                Err(AppError::TargetNotFound(current.id))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn delete_for_mission(&self, mission_id: i64) -> Result<u64, AppError> {
        let result = target::Entity::delete_many()
            .filter(target::Column::MissionId.eq(mission_id))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use sea_orm::DatabaseConnection;
    use tempfile::TempDir;

    async fn setup_db() -> (TempDir, DatabaseConnection) {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("spy_cats.db");
        let db = db::connect(&db_path).await.expect("connect db");
        db::ensure_schema(&db).await.expect("ensure schema");
        (dir, db)
    }

    fn cat_input(name: &str, breed: &str) -> CatInput {
        CatInput {
            name: name.to_string(),
            breed: breed.to_string(),
            years_of_experience: 2,
            salary: 1000.0,
        }
    }

    fn target_input(name: &str) -> TargetInput {
        TargetInput {
            name: name.to_string(),
            country: "UA".to_string(),
            notes: None,
            completed: false,
        }
    }

    #[tokio::test]
    async fn count_and_list_share_the_filter() {
        let (_dir, db) = setup_db().await;
        let cats = Cats::new(&db);
        for name in ["Tom", "Luna", "Felix"] {
            cats.create(cat_input(name, "Bengal")).await.expect("create");
        }
        cats.create(cat_input("Misty", "Siamese")).await.expect("create");

        let query = CatQuery {
            breed: Some("Bengal".to_string()),
        };
        let page = PageParams::new(Some(2), Some(0)).expect("page");
        assert_eq!(cats.count(&query).await.expect("count"), 3);
        let first = cats.list(&query, page).await.expect("list");
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|cat| cat.breed == "Bengal"));
        assert!(first[0].id < first[1].id);
    }

    #[tokio::test]
    async fn get_by_id_reports_absence_as_none() {
        let (_dir, db) = setup_db().await;
        assert!(Cats::new(&db).get_by_id(42).await.expect("get").is_none());
        assert!(Missions::new(&db).get_by_id(42).await.expect("get").is_none());
        assert!(Targets::new(&db).get_by_id(42).await.expect("get").is_none());
        assert!(Cats::new(&db)
            .update_salary(42, 10.0)
            .await
            .expect("update")
            .is_none());
    }

    #[tokio::test]
    async fn target_names_are_unique_per_mission() {
        let (_dir, db) = setup_db().await;
        let missions = Missions::new(&db);
        let targets = Targets::new(&db);
        let first = missions.create(false).await.expect("mission");
        let second = missions.create(false).await.expect("mission");

        targets
            .create_many(first.id, vec![target_input("Ghost")])
            .await
            .expect("first target");
        targets
            .create_many(second.id, vec![target_input("Ghost")])
            .await
            .expect("same name in another mission");
        let err = targets
            .create_many(first.id, vec![target_input("Ghost")])
            .await
            .unwrap_err();
        assert!(crate::error::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn store_rejects_second_active_mission_for_a_cat() {
        let (_dir, db) = setup_db().await;
        let cat = Cats::new(&db)
            .create(cat_input("Tom", "Bengal"))
            .await
            .expect("cat");
        let missions = Missions::new(&db);
        let first = missions.create(false).await.expect("mission");
        let second = missions.create(false).await.expect("mission");

        missions.set_cat(first.id, cat.id).await.expect("assign first");
        let err = missions.set_cat(second.id, cat.id).await.unwrap_err();
        assert!(crate::error::is_unique_violation(&err));

        missions.mark_completed(first.id).await.expect("complete");
        missions
            .set_cat(second.id, cat.id)
            .await
            .expect("assign after completion");
    }

    #[tokio::test]
    async fn deleting_a_mission_row_cascades_to_targets() {
        let (_dir, db) = setup_db().await;
        let missions = Missions::new(&db);
        let targets = Targets::new(&db);
        let mission = missions.create(false).await.expect("mission");
        targets
            .create_many(mission.id, vec![target_input("A"), target_input("B")])
            .await
            .expect("targets");

        assert!(missions.delete(mission.id).await.expect("delete"));
        assert!(targets
            .for_mission(mission.id)
            .await
            .expect("targets")
            .is_empty());
    }

    #[tokio::test]
    async fn unchanged_target_patch_is_a_no_op() {
        let (_dir, db) = setup_db().await;
        let mission = Missions::new(&db).create(false).await.expect("mission");
        let targets = Targets::new(&db);
        let created = targets
            .create_many(mission.id, vec![target_input("A")])
            .await
            .expect("targets")
            .remove(0);

        let same = targets
            .update(
                created.clone(),
                TargetChanges {
                    notes: None,
                    completed: Some(false),
                },
            )
            .await
            .expect("update");
        assert_eq!(same, created);
    }
}
