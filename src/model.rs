use serde::{Deserialize, Serialize};

pub const MIN_TARGETS: usize = 1;
pub const MAX_TARGETS: usize = 3;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatInput {
    pub name: String,
    pub breed: String,
    pub years_of_experience: i32,
    pub salary: f64,
}

/// Salary is the only mutable cat attribute.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatChanges {
    pub salary: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatQuery {
    pub breed: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetInput {
    pub name: String,
    pub country: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MissionInput {
    #[serde(default)]
    pub completed: bool,
    pub targets: Vec<TargetInput>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MissionAssignment {
    pub cat_id: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MissionQuery {
    pub completed: Option<bool>,
    pub cat_id: Option<i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TargetChanges {
    pub notes: Option<String>,
    pub completed: Option<bool>,
}

impl TargetChanges {
    pub fn is_empty(&self) -> bool {
        self.notes.is_none() && self.completed.is_none()
    }
}
