use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::grouping::{fold_label, GENERAL};
use crate::model::{LookupContext, ScoreRecord};
use crate::normalize::{clamp_percent, parse_score, select_effective, ParsedScore};

const GENERAL_AREA_KEY: &str = "general";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupFilters {
    pub classroom_id: String,
    #[serde(default)]
    pub template_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupOptions {
    pub needs_focus_limit: usize,
    pub weak_skill_limit: usize,
}

impl Default for RollupOptions {
    fn default() -> Self {
        Self {
            needs_focus_limit: 5,
            weak_skill_limit: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaAverage {
    pub area_id: Option<String>,
    pub name: String,
    pub avg: i64,
    pub count: usize,
    pub skill_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillAverage {
    pub key: String,
    pub name: String,
    pub area_id: Option<String>,
    pub avg: i64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakSkill {
    pub key: String,
    pub name: String,
    pub avg: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRollup {
    pub student_id: String,
    pub display_name: String,
    pub avg: i64,
    pub count: usize,
    pub x_count: usize,
    pub weak_skills: Vec<WeakSkill>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupResult {
    pub filters: RollupFilters,
    pub mastery_rate: Option<i64>,
    pub observation_count: usize,
    pub area_averages: Vec<AreaAverage>,
    pub skill_averages: Vec<SkillAverage>,
    pub needs_focus: Vec<SkillAverage>,
    pub per_student: Vec<StudentRollup>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    sum: f64,
    count: usize,
}

impl Tally {
    fn add(&mut self, v: f64) {
        self.sum += v;
        self.count += 1;
    }

    /// `None` when nothing numeric was observed: "no data" must never read as 0%.
    fn average(&self) -> Option<i64> {
        if self.count == 0 {
            return None;
        }
        Some((self.sum / self.count as f64).round() as i64)
    }
}

#[derive(Debug, Default)]
struct SkillGroup {
    name: String,
    area_id: Option<String>,
    tally: Tally,
}

#[derive(Debug, Default)]
struct StudentAcc {
    tally: Tally,
    x_count: usize,
    skills: HashMap<String, Tally>,
}

struct ResolvedSkill {
    key: String,
    name: String,
    area_id: Option<String>,
}

fn resolve_skill(rec: &ScoreRecord, ctx: &LookupContext, scoped: bool) -> ResolvedSkill {
    let skill = ctx.skills_by_id.get(&rec.skill_id);
    let name = skill
        .map(|s| s.name.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| rec.skill_id.clone());
    let area_id = skill.and_then(|s| s.area_id.clone()).filter(|a| !a.is_empty());
    let area_part = area_id.as_deref().unwrap_or(GENERAL_AREA_KEY);
    let key = if scoped {
        // Same-named skills from different templates stay apart.
        let template = effective_template(rec, ctx).unwrap_or("");
        format!("{}::{}::{}", template, area_part, fold_label(&name))
    } else {
        format!("{}::{}", area_part, fold_label(&name))
    };
    ResolvedSkill { key, name, area_id }
}

/// The record's own template, else the one its skill was defined under.
pub fn effective_template<'a>(rec: &'a ScoreRecord, ctx: &'a LookupContext) -> Option<&'a str> {
    rec.template_id
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| {
            ctx.skills_by_id
                .get(&rec.skill_id)
                .and_then(|s| s.template_id.as_deref())
                .filter(|t| !t.is_empty())
        })
}

/// Records in the filtered classroom and template, reduced to one effective
/// record per (assessment, skill). Scoping runs before latest-wins, so rows
/// outside the scope never shadow rows inside it. Rollup and gap
/// classification both read through here.
pub fn scoped_records<'a>(
    score_records: &'a [ScoreRecord],
    ctx: &LookupContext,
    filters: &RollupFilters,
) -> Vec<&'a ScoreRecord> {
    select_effective(score_records.iter().filter(|r| {
        r.classroom_id == filters.classroom_id
            && filters
                .template_id
                .as_deref()
                .map(|t| effective_template(r, ctx) == Some(t))
                .unwrap_or(true)
    }))
}

fn by_avg_then_name(a: &SkillAverage, b: &SkillAverage) -> Ordering {
    a.avg
        .cmp(&b.avg)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.key.cmp(&b.key))
}

/// Rolls effective score records for one classroom up into mastery rate,
/// area, skill and student averages.
///
/// The mastery rate is the mean over every numeric observation, so a student
/// with more scored cells weighs more than one with few.
pub fn compute_rollup(
    score_records: &[ScoreRecord],
    ctx: &LookupContext,
    filters: &RollupFilters,
    options: RollupOptions,
) -> RollupResult {
    let scoped = filters.template_id.is_some();

    let mut overall = Tally::default();
    let mut per_area: HashMap<Option<String>, Tally> = HashMap::new();
    let mut per_skill: HashMap<String, SkillGroup> = HashMap::new();
    let mut per_student: HashMap<String, StudentAcc> = HashMap::new();

    let selected = scoped_records(score_records, ctx, filters);

    for rec in selected {
        let parsed = parse_score(&rec.raw_score);
        let student = per_student.entry(rec.student_id.clone()).or_default();
        let value = match parsed {
            ParsedScore::Numeric(v) => clamp_percent(v),
            ParsedScore::NotPerformed => {
                student.x_count += 1;
                continue;
            }
            ParsedScore::Blank => continue,
        };

        let skill = resolve_skill(rec, ctx, scoped);
        overall.add(value);
        student.tally.add(value);
        student.skills.entry(skill.key.clone()).or_default().add(value);
        per_area.entry(skill.area_id.clone()).or_default().add(value);

        let group = per_skill.entry(skill.key).or_insert_with(|| SkillGroup {
            name: skill.name.clone(),
            area_id: skill.area_id.clone(),
            tally: Tally::default(),
        });
        if skill.name < group.name {
            group.name = skill.name;
        }
        group.tally.add(value);
    }

    let mut skill_averages: Vec<SkillAverage> = per_skill
        .iter()
        .filter_map(|(key, g)| {
            Some(SkillAverage {
                key: key.clone(),
                name: g.name.clone(),
                area_id: g.area_id.clone(),
                avg: g.tally.average()?,
                count: g.tally.count,
            })
        })
        .collect();
    skill_averages.sort_by(by_avg_then_name);
    let needs_focus: Vec<SkillAverage> = skill_averages
        .iter()
        .take(options.needs_focus_limit)
        .cloned()
        .collect();

    let mut area_averages: Vec<AreaAverage> = per_area
        .iter()
        .filter_map(|(area_id, tally)| {
            let name = area_id
                .as_deref()
                .map(|id| ctx.area_name(id).unwrap_or(id).to_string())
                .unwrap_or_else(|| GENERAL.to_string());
            let skill_count = skill_averages
                .iter()
                .filter(|s| s.area_id == *area_id)
                .count();
            Some(AreaAverage {
                area_id: area_id.clone(),
                name,
                avg: tally.average()?,
                count: tally.count,
                skill_count,
            })
        })
        .collect();
    area_averages.sort_by(|a, b| {
        let sort_key = |x: &AreaAverage| {
            x.area_id
                .as_deref()
                .map(|id| ctx.areas_by_id.get(id).map(|a| a.sort_order).unwrap_or(i64::MAX - 1))
                .unwrap_or(i64::MAX)
        };
        sort_key(a)
            .cmp(&sort_key(b))
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut students: Vec<StudentRollup> = per_student
        .into_iter()
        .filter_map(|(student_id, acc)| {
            let avg = acc.tally.average()?;
            let mut weak: Vec<WeakSkill> = acc
                .skills
                .iter()
                .filter_map(|(key, tally)| {
                    Some(WeakSkill {
                        key: key.clone(),
                        name: per_skill
                            .get(key)
                            .map(|g| g.name.clone())
                            .unwrap_or_else(|| key.clone()),
                        avg: tally.average()?,
                    })
                })
                .collect();
            weak.sort_by(|a, b| {
                a.avg
                    .cmp(&b.avg)
                    .then_with(|| a.name.cmp(&b.name))
                    .then_with(|| a.key.cmp(&b.key))
            });
            weak.truncate(options.weak_skill_limit);
            let display_name = ctx
                .students_by_id
                .get(&student_id)
                .map(|s| s.display_name())
                .unwrap_or_else(|| student_id.clone());
            Some(StudentRollup {
                student_id,
                display_name,
                avg,
                count: acc.tally.count,
                x_count: acc.x_count,
                weak_skills: weak,
            })
        })
        .collect();
    students.sort_by(|a, b| {
        let order = |id: &str| {
            ctx.students_by_id
                .get(id)
                .map(|s| s.sort_order)
                .unwrap_or(i64::MAX)
        };
        order(&a.student_id)
            .cmp(&order(&b.student_id))
            .then_with(|| a.display_name.cmp(&b.display_name))
            .then_with(|| a.student_id.cmp(&b.student_id))
    });

    RollupResult {
        filters: filters.clone(),
        mastery_rate: overall.average(),
        observation_count: overall.count,
        area_averages,
        skill_averages,
        needs_focus,
        per_student: students,
    }
}
