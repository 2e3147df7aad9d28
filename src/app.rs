use std::collections::HashSet;
use std::sync::Arc;

use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tracing::{debug, info};

use crate::breeds::BreedCatalog;
use crate::entities::{cat, mission, target};
use crate::error::{is_unique_violation, AppError};
use crate::model::{
    CatChanges, CatInput, CatQuery, MissionInput, MissionQuery, TargetChanges, TargetInput,
    MAX_TARGETS, MIN_TARGETS,
};
use crate::pagination::{Page, PageParams};
use crate::store::{Cats, Missions, Targets};

const MAX_NAME_LEN: usize = 100;
const MIN_COUNTRY_LEN: usize = 2;

/// Mission lifecycle engine. Every mutation goes through here so the
/// invariants are checked against persisted state inside one transaction.
pub struct App {
    db: DatabaseConnection,
    breeds: Arc<BreedCatalog>,
}

#[derive(Clone, Debug)]
pub struct MissionDetail {
    pub mission: mission::Model,
    pub targets: Vec<target::Model>,
}

#[derive(Clone, Debug)]
pub struct TargetUpdate {
    pub target: target::Model,
    /// Set when this update completed the last pending target.
    pub mission_completed: bool,
}

impl App {
    pub fn new(db: DatabaseConnection, breeds: Arc<BreedCatalog>) -> Self {
        Self { db, breeds }
    }

    #[cfg(test)]
    fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn create_cat(&self, input: CatInput) -> Result<cat::Model, AppError> {
        let name = ensure_len("cat name", &input.name, 1, MAX_NAME_LEN)?;
        let breed = ensure_len("cat breed", &input.breed, 1, MAX_NAME_LEN)?;
        if input.years_of_experience < 0 {
            return Err(AppError::InvalidInput(
                "years of experience cannot be negative".to_string(),
            ));
        }
        ensure_salary(input.salary)?;

        if !self.breeds.is_valid_breed(&breed).await? {
            return Err(AppError::InvalidBreed(breed));
        }

        let cat = Cats::new(&self.db)
            .create(CatInput {
                name,
                breed,
                ..input
            })
            .await?;
        info!(cat_id = cat.id, breed = %cat.breed, "Created cat");
        Ok(cat)
    }

    pub async fn get_cat(&self, id: i64) -> Result<cat::Model, AppError> {
        Cats::new(&self.db)
            .get_by_id(id)
            .await?
            .ok_or(AppError::CatNotFound(id))
    }

    pub async fn list_cats(
        &self,
        query: &CatQuery,
        params: PageParams,
    ) -> Result<Page<cat::Model>, AppError> {
        let cats = Cats::new(&self.db);
        let total = cats.count(query).await?;
        if total == 0 {
            return Ok(Page::empty(params));
        }
        let items = cats.list(query, params).await?;
        Ok(Page {
            items,
            total,
            params,
        })
    }

    pub async fn update_cat(&self, id: i64, changes: CatChanges) -> Result<cat::Model, AppError> {
        ensure_salary(changes.salary)?;
        let cat = Cats::new(&self.db)
            .update_salary(id, changes.salary)
            .await?
            .ok_or(AppError::CatNotFound(id))?;
        info!(cat_id = id, salary = cat.salary, "Updated cat salary");
        Ok(cat)
    }

    pub async fn delete_cat(&self, id: i64) -> Result<(), AppError> {
        let txn = self.db.begin().await?;
        let result: Result<u64, AppError> = async {
            let unassigned = Missions::new(&txn).unassign_cat(id).await?;
            if !Cats::new(&txn).delete(id).await? {
                return Err(AppError::CatNotFound(id));
            }
            Ok(unassigned)
        }
        .await;

        let unassigned = finalize_transaction(txn, result).await?;
        info!(cat_id = id, unassigned, "Deleted cat");
        Ok(())
    }

    pub async fn create_mission(&self, input: MissionInput) -> Result<MissionDetail, AppError> {
        let targets = validate_targets(input.targets)?;
        let all_done = targets.iter().all(|target| target.completed);
        if input.completed && !all_done {
            return Err(AppError::InvalidInput(
                "mission cannot be completed while targets are pending".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let result: Result<MissionDetail, AppError> = async {
            let mission = Missions::new(&txn).create(all_done).await?;
            let targets = Targets::new(&txn)
                .create_many(mission.id, targets)
                .await
                .map_err(|err| {
                    if is_unique_violation(&err) {
                        AppError::DuplicateTargetName(format!("mission id {}", mission.id))
                    } else {
                        err.into()
                    }
                })?;
            Ok(MissionDetail { mission, targets })
        }
        .await;

        let detail = finalize_transaction(txn, result).await?;
        info!(
            mission_id = detail.mission.id,
            targets = detail.targets.len(),
            completed = detail.mission.completed,
            "Created mission"
        );
        Ok(detail)
    }

    pub async fn get_mission(&self, id: i64) -> Result<MissionDetail, AppError> {
        let mission = Missions::new(&self.db)
            .get_by_id(id)
            .await?
            .ok_or(AppError::MissionNotFound(id))?;
        let targets = Targets::new(&self.db).for_mission(id).await?;
        Ok(MissionDetail { mission, targets })
    }

    pub async fn list_missions(
        &self,
        query: &MissionQuery,
        params: PageParams,
    ) -> Result<Page<MissionDetail>, AppError> {
        let missions = Missions::new(&self.db);
        let total = missions.count(query).await?;
        if total == 0 {
            return Ok(Page::empty(params));
        }
        let page = missions.list(query, params).await?;
        let ids: Vec<i64> = page.iter().map(|mission| mission.id).collect();
        let mut targets = Targets::new(&self.db).for_missions(&ids).await?;

        let items = page
            .into_iter()
            .map(|mission| {
                let targets = targets.remove(&mission.id).unwrap_or_default();
                MissionDetail { mission, targets }
            })
            .collect();
        Ok(Page {
            items,
            total,
            params,
        })
    }

    pub async fn assign_cat(&self, mission_id: i64, cat_id: i64) -> Result<MissionDetail, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<MissionDetail, AppError> = async {
            Cats::new(&txn)
                .get_by_id(cat_id)
                .await?
                .ok_or(AppError::CatNotFound(cat_id))?;
            let missions = Missions::new(&txn);
            let mission = missions
                .get_by_id(mission_id)
                .await?
                .ok_or(AppError::MissionNotFound(mission_id))?;
            if !mission.is_active() {
                return Err(AppError::MissionAlreadyCompleted(mission_id));
            }

            let mission = if mission.cat_id == Some(cat_id) {
                debug!(mission_id, cat_id, "Cat already assigned to mission");
                mission
            } else {
                if let Some(active) = missions.active_for_cat(cat_id, mission_id).await? {
                    debug!(cat_id, active_mission_id = active.id, "Cat is busy");
                    return Err(AppError::CatAlreadyHasActiveMission(cat_id));
                }
                // The partial unique index settles races the check above cannot see.
                missions
                    .set_cat(mission_id, cat_id)
                    .await
                    .map_err(|err| {
                        if is_unique_violation(&err) {
                            AppError::CatAlreadyHasActiveMission(cat_id)
                        } else {
                            err.into()
                        }
                    })?
            };

            let targets = Targets::new(&txn).for_mission(mission_id).await?;
            Ok(MissionDetail { mission, targets })
        }
        .await;

        let detail = finalize_transaction(txn, result).await?;
        info!(mission_id, cat_id, "Assigned cat to mission");
        Ok(detail)
    }

    pub async fn get_target(&self, mission_id: i64, target_id: i64) -> Result<target::Model, AppError> {
        Missions::new(&self.db)
            .get_by_id(mission_id)
            .await?
            .ok_or(AppError::MissionNotFound(mission_id))?;
        owned_target(&self.db, mission_id, target_id).await
    }

    pub async fn update_target(
        &self,
        mission_id: i64,
        target_id: i64,
        changes: TargetChanges,
    ) -> Result<TargetUpdate, AppError> {
        let txn = self.db.begin().await?;
        let result = self
            .update_target_with_txn(&txn, mission_id, target_id, changes)
            .await;
        let update = finalize_transaction(txn, result).await?;
        if update.mission_completed {
            info!(mission_id, "All targets completed, mission completed");
        }
        Ok(update)
    }

    async fn update_target_with_txn(
        &self,
        txn: &DatabaseTransaction,
        mission_id: i64,
        target_id: i64,
        changes: TargetChanges,
    ) -> Result<TargetUpdate, AppError> {
        let missions = Missions::new(txn);
        let targets = Targets::new(txn);

        let mission = missions
            .get_by_id(mission_id)
            .await?
            .ok_or(AppError::MissionNotFound(mission_id))?;
        let current = owned_target(txn, mission_id, target_id).await?;
        if !mission.is_active() {
            return Err(AppError::MissionAlreadyCompleted(mission_id));
        }
        if current.completed {
            return Err(AppError::TargetAlreadyCompleted(target_id));
        }

        let target = targets.update(current, changes).await?;
        debug!(mission_id, target_id, completed = target.completed, "Updated target");

        let siblings = targets.for_mission(mission_id).await?;
        let mission_completed = !siblings.is_empty() && siblings.iter().all(|t| t.completed);
        if mission_completed {
            missions.mark_completed(mission_id).await?;
        }
        Ok(TargetUpdate {
            target,
            mission_completed,
        })
    }

    pub async fn delete_mission(&self, id: i64) -> Result<(), AppError> {
        let txn = self.db.begin().await?;
        let result: Result<u64, AppError> = async {
            let missions = Missions::new(&txn);
            let mission = missions
                .get_by_id(id)
                .await?
                .ok_or(AppError::MissionNotFound(id))?;
            if mission.cat_id.is_some() {
                return Err(AppError::AssignedMissionCannotBeDeleted(id));
            }
            let removed = Targets::new(&txn).delete_for_mission(id).await?;
            missions.delete(id).await?;
            Ok(removed)
        }
        .await;

        let removed = finalize_transaction(txn, result).await?;
        info!(mission_id = id, targets = removed, "Deleted mission");
        Ok(())
    }
}

/// Targets addressed through another mission are reported as missing.
async fn owned_target<C: sea_orm::ConnectionTrait>(
    db: &C,
    mission_id: i64,
    target_id: i64,
) -> Result<target::Model, AppError> {
    Targets::new(db)
        .get_by_id(target_id)
        .await?
        .filter(|target| target.mission_id == mission_id)
        .ok_or(AppError::TargetNotFound(target_id))
}

async fn finalize_transaction<T>(
    txn: DatabaseTransaction,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                return Err(rollback_err.into());
            }
            Err(err)
        }
    }
}

fn validate_targets(targets: Vec<TargetInput>) -> Result<Vec<TargetInput>, AppError> {
    if !(MIN_TARGETS..=MAX_TARGETS).contains(&targets.len()) {
        return Err(AppError::InvalidTargetCount(targets.len()));
    }

    let mut seen = HashSet::new();
    let mut validated = Vec::with_capacity(targets.len());
    for target in targets {
        let name = ensure_len("target name", &target.name, 1, MAX_NAME_LEN)?;
        let country = ensure_len("target country", &target.country, MIN_COUNTRY_LEN, MAX_NAME_LEN)?;
        if !seen.insert(name.clone()) {
            return Err(AppError::DuplicateTargetName(name));
        }
        validated.push(TargetInput {
            name,
            country,
            ..target
        });
    }
    Ok(validated)
}

/// Trims `value` and checks its length in characters.
fn ensure_len(label: &str, value: &str, min: usize, max: usize) -> Result<String, AppError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min || len > max {
        return Err(AppError::InvalidInput(format!(
            "{label} must be between {min} and {max} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn ensure_salary(salary: f64) -> Result<(), AppError> {
    if !salary.is_finite() || salary < 0.0 {
        return Err(AppError::InvalidInput(
            "salary must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}
