use crate::session::SessionRecord;

/// Half-up 1-decimal rounding for the printable sheets:
/// `floor(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Derives the 0-10 behavior score for one session record. Pure and
/// total: every well-formed record has a defined score, and the result
/// is unrounded (display rounding is the caller's concern).
///
/// Absence short-circuits everything: a justified absence scores 5.0, an
/// unjustified one 0.0, regardless of the counters.
///
/// The homework counter deliberately never touches the grade; it feeds
/// the FOA "tarefas" concept only.
pub fn calculate_grade(record: &SessionRecord) -> f64 {
    if !record.present {
        return if record.justified_absence { 5.0 } else { 0.0 };
    }

    let c = &record.counters;
    let mut grade = 10.0;

    // Each deduction caps independently so off-scale tallies cannot
    // stack past their band.
    grade -= (c.talk as f64 * 1.0).min(3.0);
    grade -= (c.bathroom as f64 * 0.5).min(1.5);
    grade -= (c.sleep as f64 * 1.0).min(3.0);
    if c.material == 0 {
        grade -= 1.5;
    }
    let activity_lost = 3 - c.activity;
    if activity_lost > 0 {
        grade -= activity_lost as f64 * 1.0;
    }
    if record.phone_confiscated {
        grade -= 1.0;
    }

    if c.participation > 0 {
        grade += 0.5;
    }

    grade.clamp(0.0, 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Counters;

    fn record(counters: Counters) -> SessionRecord {
        let mut r = SessionRecord::new("s1");
        r.counters = counters;
        r
    }

    #[test]
    fn fresh_record_scores_a_clean_ten() {
        assert_eq!(calculate_grade(&SessionRecord::new("s1")), 10.0);
    }

    #[test]
    fn absence_short_circuits_counters() {
        let mut r = record(Counters {
            talk: 3,
            bathroom: 3,
            sleep: 3,
            material: 0,
            activity: 0,
            homework: 0,
            participation: 1,
        });
        r.phone_confiscated = true;
        r.set_present(false);
        assert_eq!(calculate_grade(&r), 0.0);
        r.set_justified_absence(true);
        assert_eq!(calculate_grade(&r), 5.0);
    }

    #[test]
    fn worked_example_scores_seven() {
        // 10 - 2 (talk) - 0.5 (bathroom) - 1 (activity) + 0.5 (participation)
        let r = record(Counters {
            talk: 2,
            bathroom: 1,
            sleep: 0,
            material: 1,
            activity: 2,
            homework: 0,
            participation: 1,
        });
        assert_eq!(calculate_grade(&r), 7.0);
    }

    #[test]
    fn deductions_cap_before_stacking() {
        let capped = record(Counters {
            talk: 99,
            ..Counters::new()
        });
        let at_bound = record(Counters {
            talk: 3,
            ..Counters::new()
        });
        assert_eq!(calculate_grade(&capped), calculate_grade(&at_bound));

        let bathroom_over = record(Counters {
            bathroom: 50,
            ..Counters::new()
        });
        assert_eq!(calculate_grade(&bathroom_over), 8.5);
    }

    #[test]
    fn homework_counter_never_moves_the_grade() {
        for talk in 0..=3 {
            for participation in 0..=1 {
                let with = record(Counters {
                    talk,
                    participation,
                    homework: 1,
                    ..Counters::new()
                });
                let without = record(Counters {
                    talk,
                    participation,
                    homework: 0,
                    ..Counters::new()
                });
                assert_eq!(calculate_grade(&with), calculate_grade(&without));
            }
        }
    }

    #[test]
    fn grade_stays_in_range_over_the_whole_counter_space() {
        // The counter space is small enough to sweep exhaustively.
        for talk in 0..=3 {
            for bathroom in 0..=3 {
                for sleep in 0..=3 {
                    for material in 0..=1 {
                        for activity in 0..=3 {
                            for participation in 0..=1 {
                                for phone in [false, true] {
                                    let mut r = record(Counters {
                                        talk,
                                        bathroom,
                                        sleep,
                                        material,
                                        activity,
                                        homework: 1,
                                        participation,
                                    });
                                    r.phone_confiscated = phone;
                                    let g = calculate_grade(&r);
                                    assert!((0.0..=10.0).contains(&g), "out of range: {}", g);
                                    // Pure: same input, same output.
                                    assert_eq!(g, calculate_grade(&r));
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn floor_clamps_at_zero() {
        let mut r = record(Counters {
            talk: 3,
            bathroom: 3,
            sleep: 3,
            material: 0,
            activity: 0,
            homework: 1,
            participation: 0,
        });
        r.phone_confiscated = true;
        // Raw sum would be 10 - 3 - 1.5 - 3 - 1.5 - 3 - 1 = -3.0.
        assert_eq!(calculate_grade(&r), 0.0);
    }

    #[test]
    fn round_off_is_half_up_to_one_decimal() {
        assert_eq!(round_off_1_decimal(0.0), 0.0);
        assert_eq!(round_off_1_decimal(7.04), 7.0);
        assert_eq!(round_off_1_decimal(7.05), 7.1);
        assert_eq!(round_off_1_decimal(9.9999), 10.0);
    }
}
