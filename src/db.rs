use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::grouping::normalize_activity;
use crate::model::{
    Area, Category, Classroom, LookupContext, RawActivityRecord, RawScore, ScoreRecord, Skill,
    Snapshot, Student,
};
use crate::normalize::sanitize_for_storage;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("progress.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            active INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_classroom ON students(classroom_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS areas(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories(
            id TEXT PRIMARY KEY,
            area_id TEXT,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS skills(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            area_id TEXT,
            category_id TEXT,
            template_id TEXT,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    // Scores are only ever stored in sanitized form.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS score_records(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            assessment_id TEXT NOT NULL,
            template_id TEXT,
            student_id TEXT NOT NULL,
            skill_id TEXT NOT NULL,
            score TEXT CHECK(score IS NULL OR score = 'X'
                OR (score GLOB '[0-9]*' AND CAST(score AS INTEGER) BETWEEN 0 AND 100)),
            comment TEXT,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_score_records_classroom ON score_records(classroom_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_records(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            student_id TEXT,
            area_id TEXT,
            area_name TEXT,
            category_id TEXT,
            category_name TEXT,
            activity_name TEXT,
            sub_activity_label TEXT,
            status TEXT NOT NULL CHECK(status IN ('P', 'W', 'M', 'A')),
            planning_date TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_records_classroom ON activity_records(classroom_id)",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        None => Ok(None),
        Some(text) => match serde_json::from_str(&text) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring malformed stored setting");
                Ok(None)
            }
        },
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportCounts {
    pub students: usize,
    pub score_records: usize,
    pub activity_records: usize,
    pub skipped: usize,
}

/// Replaces everything the workspace holds for `classroom_id` with `snapshot`.
/// Dimension tables are upserted; rows owned by another classroom are skipped.
pub fn import_snapshot(
    conn: &Connection,
    classroom_id: &str,
    snapshot: &Snapshot,
) -> anyhow::Result<ImportCounts> {
    let tx = conn.unchecked_transaction()?;
    let ctx = LookupContext::from_snapshot(snapshot);
    let mut counts = ImportCounts::default();

    for c in &snapshot.classrooms {
        tx.execute(
            "INSERT INTO classrooms(id, name) VALUES(?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            (&c.id, &c.name),
        )?;
    }
    for a in &snapshot.areas {
        tx.execute(
            "INSERT INTO areas(id, name, sort_order) VALUES(?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, sort_order = excluded.sort_order",
            (&a.id, &a.name, a.sort_order),
        )?;
    }
    for c in &snapshot.categories {
        tx.execute(
            "INSERT INTO categories(id, area_id, name) VALUES(?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET area_id = excluded.area_id, name = excluded.name",
            (&c.id, &c.area_id, &c.name),
        )?;
    }
    for s in &snapshot.skills {
        tx.execute(
            "INSERT INTO skills(id, name, area_id, category_id, template_id, sort_order)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               area_id = excluded.area_id,
               category_id = excluded.category_id,
               template_id = excluded.template_id,
               sort_order = excluded.sort_order",
            (
                &s.id,
                &s.name,
                &s.area_id,
                &s.category_id,
                &s.template_id,
                s.sort_order,
            ),
        )?;
    }

    tx.execute("DELETE FROM students WHERE classroom_id = ?", [classroom_id])?;
    tx.execute("DELETE FROM score_records WHERE classroom_id = ?", [classroom_id])?;
    tx.execute("DELETE FROM activity_records WHERE classroom_id = ?", [classroom_id])?;

    for s in &snapshot.students {
        if !owned_by(&s.classroom_id, classroom_id) {
            counts.skipped += 1;
            continue;
        }
        tx.execute(
            "INSERT INTO students(id, classroom_id, first_name, last_name, sort_order, active)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               classroom_id = excluded.classroom_id,
               first_name = excluded.first_name,
               last_name = excluded.last_name,
               sort_order = excluded.sort_order,
               active = excluded.active",
            (
                &s.id,
                classroom_id,
                &s.first_name,
                &s.last_name,
                s.sort_order,
                s.active as i64,
            ),
        )?;
        counts.students += 1;
    }

    for r in &snapshot.score_records {
        if !owned_by(&r.classroom_id, classroom_id) {
            counts.skipped += 1;
            continue;
        }
        let mut rec = r.clone();
        rec.classroom_id = classroom_id.to_string();
        insert_score_record(&tx, &rec)?;
        counts.score_records += 1;
    }

    for raw in &snapshot.activity_records {
        let rec = normalize_activity(raw, &ctx);
        if !owned_by(rec.classroom_id.as_deref().unwrap_or(""), classroom_id) {
            counts.skipped += 1;
            continue;
        }
        let id = if rec.id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            rec.id.clone()
        };
        tx.execute(
            "INSERT INTO activity_records(
               id, classroom_id, student_id, area_id, area_name, category_id, category_name,
               activity_name, sub_activity_label, status, planning_date)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               classroom_id = excluded.classroom_id,
               student_id = excluded.student_id,
               area_id = excluded.area_id,
               area_name = excluded.area_name,
               category_id = excluded.category_id,
               category_name = excluded.category_name,
               activity_name = excluded.activity_name,
               sub_activity_label = excluded.sub_activity_label,
               status = excluded.status,
               planning_date = excluded.planning_date",
            rusqlite::params![
                id,
                classroom_id,
                rec.student_id,
                rec.area_id,
                rec.area_name,
                rec.category_id,
                rec.category_name,
                rec.activity_name,
                rec.sub_activity_label,
                rec.status.as_str(),
                rec.planning_date.map(|d| d.to_string()),
            ],
        )?;
        counts.activity_records += 1;
    }

    tx.commit()?;
    tracing::debug!(
        classroom_id,
        students = counts.students,
        score_records = counts.score_records,
        activity_records = counts.activity_records,
        skipped = counts.skipped,
        "snapshot imported"
    );
    Ok(counts)
}

fn owned_by(row_classroom: &str, classroom_id: &str) -> bool {
    row_classroom.is_empty() || row_classroom == classroom_id
}

/// Writes one score row in sanitized form. Ids are generated when missing
/// and re-used ids replace the earlier row.
pub fn insert_score_record(conn: &Connection, rec: &ScoreRecord) -> anyhow::Result<String> {
    let id = if rec.id.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        rec.id.clone()
    };
    conn.execute(
        "INSERT OR REPLACE INTO score_records(
           id, classroom_id, assessment_id, template_id, student_id, skill_id,
           score, comment, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            rec.classroom_id,
            rec.assessment_id,
            rec.template_id,
            rec.student_id,
            rec.skill_id,
            sanitize_for_storage(&rec.raw_score),
            rec.comment,
            rec.created_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(id)
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

/// Reads back the classroom's rows in insertion order, which the latest-wins
/// selection relies on when timestamps tie.
pub fn load_snapshot(conn: &Connection, classroom_id: &str) -> anyhow::Result<Option<Snapshot>> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT id FROM classrooms WHERE id = ?",
            [classroom_id],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }

    let mut stmt = conn.prepare("SELECT id, name FROM classrooms ORDER BY name")?;
    let classrooms = stmt
        .query_map([], |r| {
            Ok(Classroom {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, classroom_id, first_name, last_name, sort_order, active
         FROM students
         WHERE classroom_id = ?
         ORDER BY sort_order",
    )?;
    let students = stmt
        .query_map([classroom_id], |r| {
            Ok(Student {
                id: r.get(0)?,
                classroom_id: r.get(1)?,
                first_name: r.get(2)?,
                last_name: r.get(3)?,
                sort_order: r.get(4)?,
                active: r.get::<_, i64>(5)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare("SELECT id, name, sort_order FROM areas ORDER BY sort_order")?;
    let areas = stmt
        .query_map([], |r| {
            Ok(Area {
                id: r.get(0)?,
                name: r.get(1)?,
                sort_order: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare("SELECT id, area_id, name FROM categories")?;
    let categories = stmt
        .query_map([], |r| {
            Ok(Category {
                id: r.get(0)?,
                area_id: r.get(1)?,
                name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, name, area_id, category_id, template_id, sort_order
         FROM skills
         ORDER BY sort_order",
    )?;
    let skills = stmt
        .query_map([], |r| {
            Ok(Skill {
                id: r.get(0)?,
                name: r.get(1)?,
                area_id: r.get(2)?,
                category_id: r.get(3)?,
                template_id: r.get(4)?,
                sort_order: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, assessment_id, template_id, classroom_id, student_id, skill_id,
                score, comment, created_at
         FROM score_records
         WHERE classroom_id = ?
         ORDER BY rowid",
    )?;
    let score_records = stmt
        .query_map([classroom_id], |r| {
            let score: Option<String> = r.get(6)?;
            let created_at: Option<String> = r.get(8)?;
            Ok(ScoreRecord {
                id: r.get(0)?,
                assessment_id: r.get(1)?,
                template_id: r.get(2)?,
                classroom_id: r.get(3)?,
                student_id: r.get(4)?,
                skill_id: r.get(5)?,
                raw_score: score.map(RawScore::Text).unwrap_or_default(),
                comment: r.get(7)?,
                created_at: parse_timestamp(created_at),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, classroom_id, student_id, area_id, area_name, category_id, category_name,
                activity_name, sub_activity_label, status, planning_date
         FROM activity_records
         WHERE classroom_id = ?
         ORDER BY rowid",
    )?;
    let activity_records = stmt
        .query_map([classroom_id], |r| {
            let planning_date: Option<String> = r.get(10)?;
            Ok(RawActivityRecord {
                id: r.get(0)?,
                classroom_id: r.get(1)?,
                student_id: r.get(2)?,
                area_id: r.get(3)?,
                area_name: r.get(4)?,
                category_id: r.get(5)?,
                category_name: r.get(6)?,
                activity: r.get(7)?,
                sub_activity_label: r.get(8)?,
                status: r.get(9)?,
                planning_date: parse_date(planning_date),
                ..Default::default()
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Snapshot {
        classrooms,
        students,
        areas,
        categories,
        skills,
        score_records,
        activity_records,
    }))
}
