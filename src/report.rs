use serde::{Deserialize, Serialize};

use crate::concept::{
    classify, classify_engagement, classify_openness, Concept, ConceptCategory,
};
use crate::grade::calculate_grade;
use crate::session::ClassSession;

/// Weights behind the "students in focus" risk ranking. Empirical and
/// tunable, so they live in settings rather than at the call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskWeights {
    pub low_grade_session: i64,
    pub unjustified_absence: i64,
    pub behavior_occurrence: i64,
    pub phone_confiscation: i64,
    pub low_average: i64,
}

impl Default for RiskWeights {
    fn default() -> RiskWeights {
        RiskWeights {
            low_grade_session: 2,
            unjustified_absence: 3,
            behavior_occurrence: 2,
            phone_confiscation: 5,
            low_average: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student_id: String,
    pub sessions_count: usize,
    pub mean_grade: f64,
    pub attendance_rate: f64,
    pub low_grade_sessions: usize,
    pub unjustified_absences: usize,
    pub phone_confiscations: usize,
    pub talk_total: i64,
    pub sleep_total: i64,
    pub bathroom_total: i64,
    pub risk_score: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub class_name: String,
    pub sessions_count: usize,
    pub mean_grade: f64,
    /// Presence ratio weighted by each session's merged block count, so
    /// missing a triple period weighs three times a single one.
    pub attendance_rate: f64,
    pub students: Vec<StudentSummary>,
}

/// Per-category line on the printable FOA sheet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoaLine {
    pub category: String,
    pub average: Option<f64>,
    pub concept: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoaSheet {
    pub student_id: String,
    pub sessions_count: usize,
    pub lines: Vec<FoaLine>,
}

fn records_for<'a>(
    sessions: &'a [ClassSession],
    student_id: &'a str,
) -> impl Iterator<Item = &'a crate::session::SessionRecord> {
    sessions
        .iter()
        .filter_map(move |s| s.records.iter().find(|r| r.student_id == student_id))
}

/// Folds every session a student appears in into one summary row. A
/// student missing from a session's records is simply not counted for it.
pub fn summarize_student(
    student_id: &str,
    sessions: &[ClassSession],
    weights: &RiskWeights,
) -> StudentSummary {
    let mut count = 0usize;
    let mut present = 0usize;
    let mut grade_sum = 0.0f64;
    let mut low_grade_sessions = 0usize;
    let mut unjustified_absences = 0usize;
    let mut phone_confiscations = 0usize;
    let mut talk_total = 0i64;
    let mut sleep_total = 0i64;
    let mut bathroom_total = 0i64;

    for r in records_for(sessions, student_id) {
        count += 1;
        let grade = calculate_grade(r);
        grade_sum += grade;
        if grade < 6.0 {
            low_grade_sessions += 1;
        }
        if r.present {
            present += 1;
            talk_total += r.counters.talk;
            sleep_total += r.counters.sleep;
            bathroom_total += r.counters.bathroom;
            if r.phone_confiscated {
                phone_confiscations += 1;
            }
        } else if !r.justified_absence {
            unjustified_absences += 1;
        }
    }

    let mean_grade = if count > 0 {
        grade_sum / count as f64
    } else {
        0.0
    };
    let attendance_rate = if count > 0 {
        present as f64 / count as f64
    } else {
        0.0
    };

    let mut risk = weights.low_grade_session * low_grade_sessions as i64
        + weights.unjustified_absence * unjustified_absences as i64
        + weights.behavior_occurrence * talk_total
        + weights.behavior_occurrence * sleep_total
        + weights.phone_confiscation * phone_confiscations as i64;
    if count > 0 && mean_grade < 6.0 {
        risk += weights.low_average;
    }

    StudentSummary {
        student_id: student_id.to_string(),
        sessions_count: count,
        mean_grade,
        attendance_rate,
        low_grade_sessions,
        unjustified_absences,
        phone_confiscations,
        talk_total,
        sleep_total,
        bathroom_total,
        risk_score: risk,
    }
}

/// Class-level rollup across many sessions. `student_ids` fixes the
/// population and the output order of the per-student rows.
pub fn summarize_class(
    class_name: &str,
    student_ids: &[String],
    sessions: &[ClassSession],
    weights: &RiskWeights,
) -> ClassSummary {
    let students: Vec<StudentSummary> = student_ids
        .iter()
        .map(|id| summarize_student(id, sessions, weights))
        .collect();

    let mut grade_sum = 0.0f64;
    let mut grade_count = 0usize;
    let mut weighted_present = 0i64;
    let mut weighted_total = 0i64;
    for s in sessions {
        let blocks = s.blocks_count.max(1);
        for r in &s.records {
            grade_sum += calculate_grade(r);
            grade_count += 1;
            weighted_total += blocks;
            if r.present {
                weighted_present += blocks;
            }
        }
    }

    ClassSummary {
        class_name: class_name.to_string(),
        sessions_count: sessions.len(),
        mean_grade: if grade_count > 0 {
            grade_sum / grade_count as f64
        } else {
            0.0
        },
        attendance_rate: if weighted_total > 0 {
            weighted_present as f64 / weighted_total as f64
        } else {
            0.0
        },
        students,
    }
}

/// Descending risk; equal scores keep the caller's order (stable sort).
pub fn rank_students_in_focus(mut summaries: Vec<StudentSummary>) -> Vec<StudentSummary> {
    summaries.sort_by_key(|s| std::cmp::Reverse(s.risk_score));
    summaries
}

/// Builds the FOA concept sheet for one student. Averages run over the
/// sessions the student attended; with no attended sessions every line
/// reads `-`.
pub fn foa_sheet(student_id: &str, sessions: &[ClassSession]) -> FoaSheet {
    let mut count = 0usize;
    let mut talk = 0i64;
    let mut bathroom = 0i64;
    let mut sleep = 0i64;
    let mut material = 0i64;
    let mut activity = 0i64;
    let mut homework = 0i64;
    let mut participation = 0i64;
    let mut phone = 0i64;

    for r in records_for(sessions, student_id) {
        if !r.present {
            continue;
        }
        count += 1;
        talk += r.counters.talk;
        bathroom += r.counters.bathroom;
        sleep += r.counters.sleep;
        material += r.counters.material;
        activity += r.counters.activity;
        homework += r.counters.homework;
        participation += r.counters.participation;
        if r.phone_confiscated {
            phone += 1;
        }
    }

    let avg = |sum: i64| -> f64 {
        if count > 0 {
            sum as f64 / count as f64
        } else {
            f64::NAN
        }
    };

    let avg_talk = avg(talk);
    let avg_sleep = avg(sleep);
    let avg_activity = avg(activity);
    let avg_participation = avg(participation);
    let behavior = (avg_talk + avg_sleep) / 2.0;

    let line = |category: &str, value: f64, concept: Concept| FoaLine {
        category: category.to_string(),
        average: if value.is_nan() { None } else { Some(value) },
        concept: concept.symbol(),
    };

    let lines = vec![
        line(
            "comportamento",
            behavior,
            classify(behavior, ConceptCategory::Comportamento),
        ),
        line(
            "atencao",
            avg(bathroom),
            classify(avg(bathroom), ConceptCategory::Atencao),
        ),
        line(
            "material",
            avg(material),
            classify(avg(material), ConceptCategory::Material),
        ),
        line(
            "tarefas",
            avg(homework),
            classify(avg(homework), ConceptCategory::Tarefas),
        ),
        line(
            "atividade",
            avg_activity,
            classify(avg_activity, ConceptCategory::Atividade),
        ),
        line(
            "participacao",
            avg_participation,
            classify(avg_participation, ConceptCategory::Participacao),
        ),
        line(
            "autogestao",
            avg(phone),
            classify(avg(phone), ConceptCategory::Autogestao),
        ),
        line(
            "engajamento",
            if count > 0 {
                (avg_activity + avg_participation * 3.0) / 2.0
            } else {
                f64::NAN
            },
            classify_engagement(avg_activity, avg_participation),
        ),
        line("abertura", avg_talk, classify_openness(avg_talk)),
    ];

    FoaSheet {
        student_id: student_id.to_string(),
        sessions_count: count,
        lines,
    }
}
