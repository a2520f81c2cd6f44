use serde::Serialize;

/// Ordinal concept printed on the FOA observation sheet. `NoData` renders
/// as `-` and means the average had nothing behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Concept {
    #[serde(rename = "O")]
    Great,
    #[serde(rename = "B")]
    Good,
    #[serde(rename = "S")]
    Satisfactory,
    #[serde(rename = "I")]
    Insufficient,
    #[serde(rename = "-")]
    NoData,
}

impl Concept {
    pub fn symbol(self) -> &'static str {
        match self {
            Concept::Great => "O",
            Concept::Good => "B",
            Concept::Satisfactory => "S",
            Concept::Insufficient => "I",
            Concept::NoData => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConceptCategory {
    /// Averaged talk/sleep tallies; low is good.
    Comportamento,
    /// Bathroom average; low is good.
    Atencao,
    /// Material brought (0/1); high is good.
    Material,
    /// Homework done (0/1); high is good.
    Tarefas,
    /// Activity credit (0-3); high is good.
    Atividade,
    /// Participation (0/1); high is good.
    Participacao,
    /// Phone confiscation rate; low is good.
    Autogestao,
}

/// Maps an averaged counter value to a concept. Bands are tested in
/// order and the first match wins; the direction depends on whether high
/// values are good or bad for the category.
pub fn classify(avg: f64, category: ConceptCategory) -> Concept {
    if avg.is_nan() {
        return Concept::NoData;
    }
    match category {
        ConceptCategory::Comportamento => bands_low_good(avg, 0.5, 1.5, 2.5),
        ConceptCategory::Atencao => bands_low_good(avg, 0.3, 0.8, 1.5),
        ConceptCategory::Material => {
            if avg >= 1.0 {
                Concept::Great
            } else if avg >= 0.8 {
                Concept::Good
            } else if avg >= 0.5 {
                Concept::Satisfactory
            } else {
                Concept::Insufficient
            }
        }
        ConceptCategory::Tarefas => bands_high_good(avg, 0.9, 0.7, 0.5),
        ConceptCategory::Atividade => bands_high_good(avg, 2.8, 2.0, 1.0),
        ConceptCategory::Participacao => bands_high_good(avg, 0.8, 0.5, 0.2),
        ConceptCategory::Autogestao => bands_low_good(avg, 0.1, 0.3, 0.6),
    }
}

fn bands_low_good(avg: f64, o: f64, b: f64, s: f64) -> Concept {
    if avg <= o {
        Concept::Great
    } else if avg <= b {
        Concept::Good
    } else if avg <= s {
        Concept::Satisfactory
    } else {
        Concept::Insufficient
    }
}

fn bands_high_good(avg: f64, o: f64, b: f64, s: f64) -> Concept {
    if avg >= o {
        Concept::Great
    } else if avg >= b {
        Concept::Good
    } else if avg >= s {
        Concept::Satisfactory
    } else {
        Concept::Insufficient
    }
}

/// Engagement blends activity (0-3) with participation (0-1, scaled to
/// the same range) and reads the result against the activity bands.
pub fn classify_engagement(avg_activity: f64, avg_participation: f64) -> Concept {
    if avg_activity.is_nan() || avg_participation.is_nan() {
        return Concept::NoData;
    }
    let blended = (avg_activity + avg_participation * 3.0) / 2.0;
    classify(blended, ConceptCategory::Atividade)
}

/// Openness is a coarse binary read on talkativeness.
pub fn classify_openness(avg_talk: f64) -> Concept {
    if avg_talk.is_nan() {
        return Concept::NoData;
    }
    if avg_talk < 1.0 {
        Concept::Great
    } else {
        Concept::Good
    }
}
