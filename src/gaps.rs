use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::model::ScoreRecord;
use crate::normalize::{parse_score, select_effective, ParsedScore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GapSets {
    /// Nothing recorded at all, not even an `X`.
    pub ungraded: Vec<String>,
    /// Only `X` marks, no numeric score.
    pub not_performed: Vec<String>,
    pub graded: Vec<String>,
}

#[derive(Default)]
struct Observed {
    numeric: usize,
    not_performed: usize,
}

/// Splits students into ungraded / not-performed / graded. Any numeric score
/// makes a student graded, whatever else their other cells hold.
pub fn classify<'a>(
    student_ids: &[String],
    score_records: impl IntoIterator<Item = &'a ScoreRecord>,
) -> GapSets {
    let mut observed: HashMap<&str, Observed> = HashMap::new();
    for rec in select_effective(score_records) {
        let entry = observed.entry(rec.student_id.as_str()).or_default();
        match parse_score(&rec.raw_score) {
            ParsedScore::Numeric(_) => entry.numeric += 1,
            ParsedScore::NotPerformed => entry.not_performed += 1,
            ParsedScore::Blank => {}
        }
    }

    let mut out = GapSets::default();
    let mut seen: HashSet<&str> = HashSet::new();
    for id in student_ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        let (numeric, not_performed) = observed
            .get(id.as_str())
            .map(|o| (o.numeric, o.not_performed))
            .unwrap_or((0, 0));
        if numeric > 0 {
            out.graded.push(id.clone());
        } else if not_performed > 0 {
            out.not_performed.push(id.clone());
        } else {
            out.ungraded.push(id.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawScore;
    use proptest::prelude::*;

    fn rec(student: &str, assessment: &str, raw: RawScore) -> ScoreRecord {
        ScoreRecord {
            id: format!("{}-{}", student, assessment),
            assessment_id: format!("{}-{}", student, assessment),
            classroom_id: "c1".to_string(),
            student_id: student.to_string(),
            skill_id: "k1".to_string(),
            raw_score: raw,
            ..Default::default()
        }
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn blank_only_student_is_ungraded() {
        let records = vec![
            rec("s1", "a1", RawScore::from("")),
            rec("s1", "a2", RawScore::Blank),
        ];
        let gaps = classify(&ids(&["s1"]), &records);
        assert_eq!(gaps.ungraded, ids(&["s1"]));
        assert!(gaps.not_performed.is_empty());
    }

    #[test]
    fn partial_grading_is_not_a_miss() {
        let records = vec![
            rec("s1", "a1", RawScore::from("X")),
            rec("s1", "a2", RawScore::from("92")),
        ];
        let gaps = classify(&ids(&["s1"]), &records);
        assert!(gaps.ungraded.is_empty());
        assert!(gaps.not_performed.is_empty());
        assert_eq!(gaps.graded, ids(&["s1"]));
    }

    #[test]
    fn only_x_marks_is_not_performed() {
        let records = vec![
            rec("s1", "a1", RawScore::from("absent")),
            rec("s2", "a1", RawScore::from("55")),
        ];
        let gaps = classify(&ids(&["s3", "s1", "s2", "s1"]), &records);
        assert_eq!(gaps.ungraded, ids(&["s3"]));
        assert_eq!(gaps.not_performed, ids(&["s1"]));
        assert_eq!(gaps.graded, ids(&["s2"]));
    }

    proptest! {
        #[test]
        fn gap_sets_are_disjoint(cells in proptest::collection::vec((0u8..6, 0u8..4, 0u8..3), 0..40)) {
            let records: Vec<ScoreRecord> = cells
                .iter()
                .map(|(student, assessment, kind)| {
                    let raw = match kind {
                        0 => RawScore::Blank,
                        1 => RawScore::from("X"),
                        _ => RawScore::Number(f64::from(*assessment) * 10.0),
                    };
                    rec(&format!("s{}", student), &format!("a{}", assessment), raw)
                })
                .collect();
            let students: Vec<String> = (0..6).map(|i| format!("s{}", i)).collect();
            let gaps = classify(&students, &records);

            let u: HashSet<&String> = gaps.ungraded.iter().collect();
            let n: HashSet<&String> = gaps.not_performed.iter().collect();
            let g: HashSet<&String> = gaps.graded.iter().collect();
            prop_assert!(u.is_disjoint(&n));
            prop_assert!(u.is_disjoint(&g));
            prop_assert!(n.is_disjoint(&g));
            prop_assert_eq!(u.len() + n.len() + g.len(), students.len());
        }
    }
}
