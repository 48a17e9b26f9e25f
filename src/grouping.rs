use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::model::{ActivityRecord, LookupContext, RawActivityRecord};
use crate::normalize::{normalize_status, recognize_status, StatusCode};

pub const UNASSIGNED: &str = "Unassigned";
pub const GENERAL: &str = "General";
pub const UNCATEGORIZED: &str = "Uncategorized";
pub const UNTITLED: &str = "Untitled";

fn non_blank(v: Option<&String>) -> Option<String> {
    v.map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Folds the loosely shaped store row into one `ActivityRecord`. Ids and
/// names are filled from each other through `ctx`, so an id-only row and a
/// name-only row for the same area land on the same key.
pub fn normalize_activity(raw: &RawActivityRecord, ctx: &LookupContext) -> ActivityRecord {
    let raw_area_name = non_blank(raw.area_name.as_ref());
    let raw_category_name = non_blank(raw.category_name.as_ref());
    let area_of_category = |id: Option<&str>| {
        id.and_then(|id| ctx.categories_by_id.get(id))
            .and_then(|c| non_blank(c.area_id.as_ref()))
    };

    let mut category_id = non_blank(raw.category_id.as_ref());
    let mut area_id = non_blank(raw.area_id.as_ref())
        .or_else(|| area_of_category(category_id.as_deref()))
        .or_else(|| {
            raw_area_name
                .as_deref()
                .and_then(|n| ctx.area_id_by_name(n))
                .map(str::to_string)
        });
    if category_id.is_none() {
        category_id = raw_category_name
            .as_deref()
            .and_then(|n| ctx.category_id_by_name(n, area_id.as_deref()))
            .map(str::to_string);
        if area_id.is_none() {
            area_id = area_of_category(category_id.as_deref());
        }
    }

    let area_name = raw_area_name.or_else(|| {
        area_id
            .as_deref()
            .and_then(|id| ctx.area_name(id))
            .map(|s| s.to_string())
    });
    let category_name = raw_category_name.or_else(|| {
        category_id
            .as_deref()
            .and_then(|id| ctx.category_name(id))
            .map(|s| s.to_string())
    });

    let activity_name = non_blank(raw.curriculum_activity_name.as_ref())
        .or_else(|| non_blank(raw.activity.as_ref()))
        .or_else(|| non_blank(raw.raw_activity.as_ref()));
    let sub_activity_label = non_blank(raw.sub_activity_label.as_ref())
        .or_else(|| non_blank(raw.sub_activity.as_ref()))
        .or_else(|| non_blank(raw.note.as_ref()));

    let status_raw = raw.status.as_deref().unwrap_or("");
    if !status_raw.trim().is_empty() && recognize_status(status_raw).is_none() {
        tracing::warn!(
            record_id = %raw.id,
            status = %status_raw,
            "unrecognized activity status, treating as P"
        );
    }

    ActivityRecord {
        id: raw.id.clone(),
        student_id: non_blank(raw.student_id.as_ref()),
        classroom_id: non_blank(raw.classroom_id.as_ref()),
        area_id,
        area_name,
        category_id,
        category_name,
        activity_name,
        sub_activity_label,
        status: normalize_status(status_raw),
        planning_date: raw.planning_date,
    }
}

/// Lower-cased, whitespace-collapsed text used to merge casing/spacing variants.
pub fn fold_label(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKey {
    pub key: String,
    pub label: String,
}

impl GroupKey {
    fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }

    fn synthetic(label: &str) -> Self {
        Self::new(format!("__{}", label.to_ascii_lowercase()), label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupLevel {
    Classroom,
    Area,
    Category,
    Activity,
    SubActivity,
    Student,
    Status,
}

impl GroupLevel {
    pub const CLASS_BOARD: [GroupLevel; 6] = [
        GroupLevel::Classroom,
        GroupLevel::Area,
        GroupLevel::Category,
        GroupLevel::Activity,
        GroupLevel::SubActivity,
        GroupLevel::Student,
    ];

    pub const STUDENT_BOARD: [GroupLevel; 3] = [
        GroupLevel::Area,
        GroupLevel::Category,
        GroupLevel::SubActivity,
    ];

    pub fn extract(self, r: &ActivityRecord, ctx: &LookupContext) -> GroupKey {
        match self {
            GroupLevel::Classroom => match r.classroom_id.as_deref() {
                Some(id) => {
                    let label = ctx
                        .classrooms_by_id
                        .get(id)
                        .map(|c| c.name.clone())
                        .unwrap_or_else(|| id.to_string());
                    GroupKey::new(id, label)
                }
                None => GroupKey::synthetic(UNASSIGNED),
            },
            GroupLevel::Area => match (r.area_id.as_deref(), r.area_name.as_deref()) {
                (Some(id), Some(name)) => GroupKey::new(id, name),
                (Some(id), None) => GroupKey::new(id, id),
                (None, Some(name)) => GroupKey::new(format!("name:{}", fold_label(name)), name),
                (None, None) => GroupKey::synthetic(GENERAL),
            },
            GroupLevel::Category => match (r.category_id.as_deref(), r.category_name.as_deref()) {
                (Some(id), Some(name)) => GroupKey::new(id, name),
                (Some(id), None) => GroupKey::new(id, id),
                (None, Some(name)) => GroupKey::new(format!("name:{}", fold_label(name)), name),
                (None, None) => GroupKey::synthetic(UNCATEGORIZED),
            },
            GroupLevel::Activity => match r.activity_name.as_deref() {
                Some(name) => GroupKey::new(fold_label(name), name),
                None => GroupKey::synthetic(UNTITLED),
            },
            GroupLevel::SubActivity => match r.sub_activity_label.as_deref() {
                Some(label) => GroupKey::new(fold_label(label), label),
                None => GroupKey::synthetic(UNTITLED),
            },
            GroupLevel::Student => match r.student_id.as_deref() {
                Some(id) => {
                    let label = ctx
                        .students_by_id
                        .get(id)
                        .map(|s| s.display_name())
                        .unwrap_or_else(|| id.to_string());
                    GroupKey::new(id, label)
                }
                None => GroupKey::synthetic(UNASSIGNED),
            },
            GroupLevel::Status => GroupKey::new(r.status.as_str(), r.status.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GroupOptions {
    pub collapse_single_classroom: bool,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            collapse_single_classroom: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupNode {
    pub key: String,
    pub label: String,
    pub level: GroupLevel,
    pub count: usize,
    pub status_counts: BTreeMap<StatusCode, usize>,
    pub children: Vec<GroupNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<ActivityRecord>,
}

struct NodeBuilder {
    label: String,
    level: GroupLevel,
    count: usize,
    status_counts: BTreeMap<StatusCode, usize>,
    children: HashMap<String, NodeBuilder>,
    records: Vec<ActivityRecord>,
}

impl NodeBuilder {
    fn new(label: String, level: GroupLevel) -> Self {
        Self {
            label,
            level,
            count: 0,
            status_counts: StatusCode::ALL.iter().map(|s| (*s, 0)).collect(),
            children: HashMap::new(),
            records: Vec::new(),
        }
    }

    fn visit(&mut self, label: &str, status: StatusCode) {
        self.count += 1;
        *self.status_counts.entry(status).or_insert(0) += 1;
        // Merged variants keep the smallest label so input order never shows.
        if label < self.label.as_str() {
            self.label = label.to_string();
        }
    }

    fn finish(self, key: String) -> GroupNode {
        let mut children: Vec<GroupNode> = self
            .children
            .into_iter()
            .map(|(k, child)| child.finish(k))
            .collect();
        children.sort_by(|a, b| compare_nodes(a, b));
        let mut records = self.records;
        records.sort_by(|a, b| {
            a.planning_date
                .cmp(&b.planning_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        GroupNode {
            key,
            label: self.label,
            level: self.level,
            count: self.count,
            status_counts: self.status_counts,
            children,
            records,
        }
    }
}

fn compare_nodes(a: &GroupNode, b: &GroupNode) -> Ordering {
    compare_labels(&a.label, &b.label)
        .then_with(|| a.label.cmp(&b.label))
        .then_with(|| a.key.cmp(&b.key))
}

/// Case-insensitive ordering that compares digit runs by value, so
/// "Unit 2" sorts before "Unit 10". This is not locale collation the way
/// `localeCompare` does it: letters compare by lower-cased code point, so
/// accented letters such as "é" sort after "z".
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let na = take_digits(&mut ai);
                let nb = take_digits(&mut bi);
                let ord = na
                    .len()
                    .cmp(&nb.len())
                    .then_with(|| na.cmp(&nb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                let ord = ca.to_lowercase().cmp(cb.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                ai.next();
                bi.next();
            }
        }
    }
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = it.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        it.next();
    }
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Groups records level by level. Records missing an attribute land in the
/// level's synthetic bucket; the terminal level keeps the records themselves.
pub fn build_tree(
    records: &[ActivityRecord],
    levels: &[GroupLevel],
    ctx: &LookupContext,
    options: GroupOptions,
) -> Vec<GroupNode> {
    let levels = effective_levels(records, levels, options);
    let Some(last) = levels.len().checked_sub(1) else {
        return Vec::new();
    };

    let mut roots: HashMap<String, NodeBuilder> = HashMap::new();
    for r in records {
        let mut siblings = &mut roots;
        for (depth, level) in levels.iter().enumerate() {
            let gk = level.extract(r, ctx);
            let node = siblings
                .entry(gk.key)
                .or_insert_with(|| NodeBuilder::new(gk.label.clone(), *level));
            node.visit(&gk.label, r.status);
            if depth == last {
                node.records.push(r.clone());
                break;
            }
            siblings = &mut node.children;
        }
    }

    let mut out: Vec<GroupNode> = roots
        .into_iter()
        .map(|(k, node)| node.finish(k))
        .collect();
    out.sort_by(compare_nodes);
    out
}

fn effective_levels(
    records: &[ActivityRecord],
    levels: &[GroupLevel],
    options: GroupOptions,
) -> Vec<GroupLevel> {
    if !options.collapse_single_classroom || !levels.contains(&GroupLevel::Classroom) {
        return levels.to_vec();
    }
    let classrooms: HashSet<Option<&str>> =
        records.iter().map(|r| r.classroom_id.as_deref()).collect();
    if classrooms.len() > 1 {
        return levels.to_vec();
    }
    levels
        .iter()
        .copied()
        .filter(|l| *l != GroupLevel::Classroom)
        .collect()
}
