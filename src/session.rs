use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed morning schedule: eight 45-minute blocks with a break after the
/// fourth.
pub const MORNING_BLOCKS: [&str; 8] = [
    "07h00-07h45",
    "07h45-08h30",
    "08h30-09h15",
    "09h15-10h00",
    "10h20-11h05",
    "11h05-11h50",
    "11h50-12h35",
    "12h35-13h20",
];

/// Fixed afternoon schedule: seven blocks.
pub const AFTERNOON_BLOCKS: [&str; 7] = [
    "13h00-13h45",
    "13h45-14h30",
    "14h30-15h15",
    "15h35-16h20",
    "16h20-17h05",
    "17h05-17h50",
    "17h50-18h35",
];

const AFTERNOON_MARKERS: [&str; 4] = ["tarde", "vespertino", "noturno", "noite"];

pub const DEFAULT_SUBJECT: &str = "Geral";

/// Per-behavior tallies for one student in one session. Every field is
/// bounded; deltas outside the bound clamp, they never wrap or fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub talk: i64,
    pub bathroom: i64,
    pub sleep: i64,
    pub material: i64,
    pub activity: i64,
    pub homework: i64,
    pub participation: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    Talk,
    Bathroom,
    Sleep,
    Material,
    Activity,
    Homework,
    Participation,
}

impl CounterField {
    pub fn parse(name: &str) -> Option<CounterField> {
        match name {
            "talk" => Some(CounterField::Talk),
            "bathroom" => Some(CounterField::Bathroom),
            "sleep" => Some(CounterField::Sleep),
            "material" => Some(CounterField::Material),
            "activity" => Some(CounterField::Activity),
            "homework" => Some(CounterField::Homework),
            "participation" => Some(CounterField::Participation),
            _ => None,
        }
    }

    /// Inclusive (min, max) bound per field.
    pub fn bounds(self) -> (i64, i64) {
        match self {
            CounterField::Talk | CounterField::Bathroom | CounterField::Sleep => (0, 3),
            CounterField::Activity => (0, 3),
            CounterField::Material | CounterField::Homework | CounterField::Participation => (0, 1),
        }
    }
}

impl Counters {
    /// Fresh-record defaults: negative tallies at zero, material and
    /// homework assumed brought/done, activity at full credit,
    /// participation neutral.
    pub fn new() -> Counters {
        Counters {
            talk: 0,
            bathroom: 0,
            sleep: 0,
            material: 1,
            activity: 3,
            homework: 1,
            participation: 0,
        }
    }

    pub fn get(&self, field: CounterField) -> i64 {
        match field {
            CounterField::Talk => self.talk,
            CounterField::Bathroom => self.bathroom,
            CounterField::Sleep => self.sleep,
            CounterField::Material => self.material,
            CounterField::Activity => self.activity,
            CounterField::Homework => self.homework,
            CounterField::Participation => self.participation,
        }
    }

    fn set(&mut self, field: CounterField, value: i64) {
        match field {
            CounterField::Talk => self.talk = value,
            CounterField::Bathroom => self.bathroom = value,
            CounterField::Sleep => self.sleep = value,
            CounterField::Material => self.material = value,
            CounterField::Activity => self.activity = value,
            CounterField::Homework => self.homework = value,
            CounterField::Participation => self.participation = value,
        }
    }

    /// Applies a delta to one field, clamped to the field bound.
    pub fn apply_delta(&mut self, field: CounterField, delta: i64) -> i64 {
        let (lo, hi) = field.bounds();
        let next = self.get(field).saturating_add(delta).clamp(lo, hi);
        self.set(field, next);
        next
    }
}

impl Default for Counters {
    fn default() -> Counters {
        Counters::new()
    }
}

/// One student's row in a session sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub student_id: String,
    pub present: bool,
    pub justified_absence: bool,
    pub phone_confiscated: bool,
    pub counters: Counters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<String>,
}

impl SessionRecord {
    pub fn new(student_id: impl Into<String>) -> SessionRecord {
        SessionRecord {
            student_id: student_id.into(),
            present: true,
            justified_absence: false,
            phone_confiscated: false,
            counters: Counters::new(),
            notes: None,
            photos: Vec::new(),
        }
    }

    /// Justification only means anything while absent; marking a student
    /// present again drops it.
    pub fn set_present(&mut self, present: bool) {
        self.present = present;
        if present {
            self.justified_absence = false;
        }
    }

    pub fn set_justified_absence(&mut self, justified: bool) {
        if !self.present {
            self.justified_absence = justified;
        }
    }
}

/// One teacher's record of one class meeting on one date for one subject,
/// possibly spanning merged time blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSession {
    pub id: String,
    pub date: NaiveDate,
    pub teacher_id: String,
    pub subject: String,
    pub class_name: String,
    pub block: String,
    pub blocks_count: i64,
    pub records: Vec<SessionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homework: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub class_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRoom {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAssignment {
    pub class_id: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default)]
    pub assignments: Vec<TeacherAssignment>,
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub teacher_id: String,
    pub subject: String,
    pub class_name: String,
    pub date: NaiveDate,
    pub selected_blocks: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableOptions {
    pub classes: Vec<String>,
    pub subjects: Vec<String>,
    pub time_blocks: Vec<String>,
}

/// Single block keeps its label; a merged run is rendered as
/// `"<start of first> - <end of last>"`.
pub fn merged_block_label(blocks: &[String]) -> String {
    match blocks {
        [] => String::new(),
        [only] => only.clone(),
        [first, .., last] => {
            let start = first.split('-').next().unwrap_or(first).trim();
            let end = last.split('-').next_back().unwrap_or(last).trim();
            format!("{} - {}", start, end)
        }
    }
}

/// Builds a fresh session for a roster: one default record per student,
/// a unique id, the merged block label of the selection.
pub fn initialize_session(roster: &[Student], ctx: &SessionContext) -> ClassSession {
    let records = roster
        .iter()
        .map(|s| SessionRecord::new(s.id.clone()))
        .collect();
    ClassSession {
        id: Uuid::new_v4().to_string(),
        date: ctx.date,
        teacher_id: ctx.teacher_id.clone(),
        subject: ctx.subject.clone(),
        class_name: ctx.class_name.clone(),
        block: merged_block_label(&ctx.selected_blocks),
        blocks_count: ctx.selected_blocks.len().max(1) as i64,
        records,
        general_notes: None,
        homework: None,
        photos: Vec::new(),
    }
}

/// Exact match on calendar day + class + teacher + subject. More than one
/// match means upstream de-duplication failed; the first wins and the
/// caller may report the surplus.
pub fn find_existing_session<'a>(
    sessions: &'a [ClassSession],
    date: NaiveDate,
    class_name: &str,
    teacher_id: &str,
    subject: &str,
) -> Option<&'a ClassSession> {
    sessions.iter().find(|s| {
        s.date == date
            && s.class_name == class_name
            && s.teacher_id == teacher_id
            && s.subject == subject
    })
}

/// Morning schedule unless the class period names an afternoon or
/// evening shift.
pub fn time_blocks_for_period(period: Option<&str>) -> &'static [&'static str] {
    let Some(period) = period else {
        return &MORNING_BLOCKS;
    };
    let lowered = period.to_lowercase();
    if AFTERNOON_MARKERS.iter().any(|m| lowered.contains(m)) {
        &AFTERNOON_BLOCKS
    } else {
        &MORNING_BLOCKS
    }
}

/// Pure option derivation for the teacher -> class -> subject -> block
/// cascade. Recomputed in full after every selection change, so there is
/// no hidden ordering between the dropdowns.
pub fn derive_available_options(
    teacher: &Teacher,
    all_classes: &[ClassRoom],
    selected_class: Option<&ClassRoom>,
) -> AvailableOptions {
    let classes: Vec<String> = if teacher.assignments.is_empty() {
        all_classes.iter().map(|c| c.name.clone()).collect()
    } else {
        all_classes
            .iter()
            .filter(|c| teacher.assignments.iter().any(|a| a.class_id == c.name))
            .map(|c| c.name.clone())
            .collect()
    };

    let mut subjects: Vec<String> = Vec::new();
    if let Some(class) = selected_class {
        for a in &teacher.assignments {
            if a.class_id == class.name && !subjects.contains(&a.subject) {
                subjects.push(a.subject.clone());
            }
        }
    }
    if subjects.is_empty() {
        match teacher.subject.as_deref() {
            Some(s) if !s.trim().is_empty() => subjects.push(s.to_string()),
            _ => subjects.push(DEFAULT_SUBJECT.to_string()),
        }
    }

    let time_blocks = time_blocks_for_period(selected_class.and_then(|c| c.period.as_deref()))
        .iter()
        .map(|b| b.to_string())
        .collect();

    AvailableOptions {
        classes,
        subjects,
        time_blocks,
    }
}

/// Toggles one block in the selection. The selection always holds at
/// least one block (deselecting the last is a no-op) and stays sorted in
/// schedule order.
pub fn toggle_block(selection: &mut Vec<String>, block: &str, available: &[String]) {
    if let Some(pos) = selection.iter().position(|b| b == block) {
        if selection.len() > 1 {
            selection.remove(pos);
        }
        return;
    }
    if !available.iter().any(|b| b == block) {
        return;
    }
    selection.push(block.to_string());
    selection.sort_by_key(|b| {
        available
            .iter()
            .position(|a| a == b)
            .unwrap_or(usize::MAX)
    });
}
