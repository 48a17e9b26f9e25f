use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::grouping::fold_label;
use crate::normalize::StatusCode;

/// A score cell as it arrives from the store: free text, a bare number, or nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawScore {
    #[default]
    Blank,
    Number(f64),
    Text(String),
}

impl From<&str> for RawScore {
    fn from(s: &str) -> Self {
        RawScore::Text(s.to_string())
    }
}

impl From<f64> for RawScore {
    fn from(v: f64) -> Self {
        RawScore::Number(v)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    #[serde(default)]
    pub id: String,
    pub assessment_id: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub classroom_id: String,
    pub student_id: String,
    pub skill_id: String,
    #[serde(default)]
    pub raw_score: RawScore,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Activity row as the store hands it over. Older rows carry the activity
/// name under one of several field names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActivityRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub classroom_id: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub area_name: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub curriculum_activity_name: Option<String>,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub raw_activity: Option<String>,
    #[serde(default)]
    pub sub_activity_label: Option<String>,
    #[serde(default)]
    pub sub_activity: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub planning_date: Option<NaiveDate>,
}

/// Canonical activity shape; everything downstream of `normalize_activity`
/// works on this.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    pub student_id: Option<String>,
    pub classroom_id: Option<String>,
    pub area_id: Option<String>,
    pub area_name: Option<String>,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub activity_name: Option<String>,
    pub sub_activity_label: Option<String>,
    pub status: StatusCode,
    pub planning_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub sort_order: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sort_order: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    #[serde(default)]
    pub area_id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub classroom_id: String,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Student {
    pub fn display_name(&self) -> String {
        match (self.last_name.trim(), self.first_name.trim()) {
            ("", "") => self.id.clone(),
            (last, "") => last.to_string(),
            ("", first) => first.to_string(),
            (last, first) => format!("{}, {}", last, first),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: String,
    pub name: String,
}

/// Everything the engine reads for one pass. Replaced wholesale, never diffed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub classrooms: Vec<Classroom>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub areas: Vec<Area>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub score_records: Vec<ScoreRecord>,
    #[serde(default)]
    pub activity_records: Vec<RawActivityRecord>,
}

/// Dimension lookups passed into the grouper and the aggregator.
#[derive(Debug, Clone, Default)]
pub struct LookupContext {
    pub skills_by_id: HashMap<String, Skill>,
    pub areas_by_id: HashMap<String, Area>,
    pub categories_by_id: HashMap<String, Category>,
    pub students_by_id: HashMap<String, Student>,
    pub classrooms_by_id: HashMap<String, Classroom>,
}

impl LookupContext {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            skills_by_id: index_by_id(&snapshot.skills, |s| &s.id),
            areas_by_id: index_by_id(&snapshot.areas, |a| &a.id),
            categories_by_id: index_by_id(&snapshot.categories, |c| &c.id),
            students_by_id: index_by_id(&snapshot.students, |s| &s.id),
            classrooms_by_id: index_by_id(&snapshot.classrooms, |c| &c.id),
        }
    }

    pub fn area_name(&self, area_id: &str) -> Option<&str> {
        self.areas_by_id.get(area_id).map(|a| a.name.as_str())
    }

    pub fn category_name(&self, category_id: &str) -> Option<&str> {
        self.categories_by_id.get(category_id).map(|c| c.name.as_str())
    }

    /// Area whose name folds to the same text. Duplicate names resolve to the
    /// smallest id.
    pub fn area_id_by_name(&self, name: &str) -> Option<&str> {
        let folded = fold_label(name);
        self.areas_by_id
            .values()
            .filter(|a| fold_label(&a.name) == folded)
            .map(|a| a.id.as_str())
            .min()
    }

    /// Same as `area_id_by_name`, restricted to `area_id` when one is known.
    pub fn category_id_by_name(&self, name: &str, area_id: Option<&str>) -> Option<&str> {
        let folded = fold_label(name);
        self.categories_by_id
            .values()
            .filter(|c| fold_label(&c.name) == folded)
            .filter(|c| match (area_id, c.area_id.as_deref()) {
                (Some(want), Some(have)) => want == have,
                _ => true,
            })
            .map(|c| c.id.as_str())
            .min()
    }
}

fn index_by_id<T: Clone>(items: &[T], id: impl Fn(&T) -> &String) -> HashMap<String, T> {
    items
        .iter()
        .map(|item| (id(item).clone(), item.clone()))
        .collect()
}
