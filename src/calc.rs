use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Weight of the continuous-assessment component in the final grade.
pub const CONDITIONAL_WEIGHT: f64 = 0.4;
/// Weight of the final exam in the final grade.
pub const FINAL_EXAM_WEIGHT: f64 = 0.6;
/// A periodic test counts this many times a 15-minute quiz.
pub const PERIODIC_TEST_FACTOR: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExamType {
    Quiz15,
    PeriodicTest,
    FinalExam,
    Other(String),
}

impl ExamType {
    /// Accepts both the grade source codes (`15P`, `1T`, `Thi`) and the
    /// display labels. Anything else is kept verbatim as `Other`.
    pub fn parse(s: &str) -> Self {
        let t = s.trim();
        match t {
            "15P" => return Self::Quiz15,
            "1T" => return Self::PeriodicTest,
            "Thi" => return Self::FinalExam,
            _ => {}
        }
        match t.to_ascii_lowercase().as_str() {
            "15-minute quiz" => Self::Quiz15,
            "periodic test" => Self::PeriodicTest,
            "final exam" => Self::FinalExam,
            _ => Self::Other(t.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Quiz15 => "15-minute quiz",
            Self::PeriodicTest => "periodic test",
            Self::FinalExam => "final exam",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for ExamType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for ExamType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentKind {
    Quiz,
    #[serde(alias = "assign")]
    Assignment,
}

impl AssessmentKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiz" => Some(Self::Quiz),
            "assign" | "assignment" => Some(Self::Assignment),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quiz => "quiz",
            Self::Assignment => "assignment",
        }
    }

    /// `component` argument of the grade update call.
    pub fn component(self) -> &'static str {
        match self {
            Self::Quiz => "mod_quiz",
            Self::Assignment => "mod_assign",
        }
    }

    /// `source` argument of the grade update call.
    pub fn source(self) -> &'static str {
        match self {
            Self::Quiz => "mod/quiz",
            Self::Assignment => "mod/assign",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub module_id: i64,
    pub module_name: String,
    pub exam_type: ExamType,
    pub grade: f64,
    pub item_number: i64,
    #[serde(rename = "type")]
    pub kind: AssessmentKind,
}

/// One student's grades in one course, keyed by module name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StudentGradeSet {
    entries: BTreeMap<String, GradeEntry>,
}

impl StudentGradeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A later report for the same module name replaces the earlier one.
    pub fn insert(&mut self, entry: GradeEntry) -> Option<GradeEntry> {
        self.entries.insert(entry.module_name.clone(), entry)
    }

    pub fn get(&self, module_name: &str) -> Option<&GradeEntry> {
        self.entries.get(module_name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &GradeEntry> {
        self.entries.values()
    }

    fn grades_of(&self, exam_type: &ExamType) -> Vec<f64> {
        self.entries
            .values()
            .filter(|e| e.exam_type == *exam_type)
            .map(|e| e.grade)
            .collect()
    }
}

impl FromIterator<GradeEntry> for StudentGradeSet {
    fn from_iter<T: IntoIterator<Item = GradeEntry>>(iter: T) -> Self {
        let mut set = Self::new();
        for entry in iter {
            set.insert(entry);
        }
        set
    }
}

/// Arithmetic mean; `None` for an empty sequence.
pub fn average_of(grades: &[f64]) -> Option<f64> {
    if grades.is_empty() {
        return None;
    }
    Some(grades.iter().sum::<f64>() / grades.len() as f64)
}

fn group_average(set: &StudentGradeSet, exam_type: &ExamType) -> f64 {
    average_of(&set.grades_of(exam_type))
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Continuous-assessment component: `(avg15 + 2 * avgPeriodic) / 3`.
pub fn conditional_grade(set: &StudentGradeSet) -> f64 {
    if set.is_empty() {
        return 0.0;
    }
    let quiz15 = group_average(set, &ExamType::Quiz15);
    let periodic = group_average(set, &ExamType::PeriodicTest);
    (quiz15 + periodic * PERIODIC_TEST_FACTOR) / (1.0 + PERIODIC_TEST_FACTOR)
}

/// Weighted final grade. Entries whose exam type is not one of the three
/// recognized kinds do not contribute. No clamping and no rounding.
pub fn final_grade(set: &StudentGradeSet) -> f64 {
    if set.is_empty() {
        return 0.0;
    }
    let final_exam = group_average(set, &ExamType::FinalExam);
    conditional_grade(set) * CONDITIONAL_WEIGHT + final_exam * FINAL_EXAM_WEIGHT
}

/// Unweighted mean over every raw value, rounded half-up to an integer.
pub fn category_average(values: &[f64]) -> f64 {
    match average_of(values).filter(|v| v.is_finite()) {
        Some(avg) => (avg + 0.5).floor(),
        None => 0.0,
    }
}

/// Half-up rounding for display; never used inside the aggregation.
pub fn round_to(x: f64, decimals: u32) -> f64 {
    let scale = 10_f64.powi(decimals as i32);
    ((x * scale) + 0.5).floor() / scale
}

pub fn format_grade(x: f64, decimals: u32) -> String {
    format!("{:.*}", decimals as usize, round_to(x, decimals))
}

/// Achievement band of a final grade on the ten-point scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    #[serde(rename = "XS")]
    Excellent,
    #[serde(rename = "G")]
    Good,
    #[serde(rename = "Khá")]
    Fair,
    #[serde(rename = "TB")]
    Average,
    #[serde(rename = "Yếu")]
    Weak,
}

/// Bands are lower-inclusive: 9, 8, 7 and 5. Applied to the unrounded
/// final grade; non-finite values fall through to `Weak`.
pub fn classify(final_grade: f64) -> Classification {
    if final_grade >= 9.0 {
        Classification::Excellent
    } else if final_grade >= 8.0 {
        Classification::Good
    } else if final_grade >= 7.0 {
        Classification::Fair
    } else if final_grade >= 5.0 {
        Classification::Average
    } else {
        Classification::Weak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, exam_type: &str, grade: f64) -> GradeEntry {
        GradeEntry {
            module_id: name.len() as i64,
            module_name: name.to_string(),
            exam_type: ExamType::parse(exam_type),
            grade,
            item_number: 0,
            kind: AssessmentKind::Quiz,
        }
    }

    #[test]
    fn average_of_empty_is_undefined() {
        assert_eq!(average_of(&[]), None);
        assert_eq!(average_of(&[4.0, 6.0]), Some(5.0));
    }

    #[test]
    fn empty_set_final_grade_is_zero() {
        assert_eq!(final_grade(&StudentGradeSet::new()), 0.0);
    }

    #[test]
    fn weighting_matches_forty_sixty_split() {
        let set: StudentGradeSet = vec![
            entry("Q1", "15-minute quiz", 8.0),
            entry("T1", "periodic test", 6.0),
            entry("F", "final exam", 9.0),
        ]
        .into_iter()
        .collect();
        let conditional = (8.0 + 6.0 * 2.0) / 3.0;
        assert!((conditional_grade(&set) - conditional).abs() < 1e-9);
        assert!((final_grade(&set) - 8.066_666_7).abs() < 1e-6);
    }

    #[test]
    fn unrecognized_exam_type_does_not_contribute() {
        let base: StudentGradeSet = vec![
            entry("Q1", "15P", 7.0),
            entry("F", "Thi", 8.0),
        ]
        .into_iter()
        .collect();
        let mut with_bonus = base.clone();
        with_bonus.insert(entry("Bonus", "bonus", 100.0));
        assert_eq!(final_grade(&base), final_grade(&with_bonus));
        assert_eq!(with_bonus.entries().count(), 3);
    }

    #[test]
    fn only_unrecognized_entries_yield_finite_zero() {
        let set: StudentGradeSet = vec![entry("X", "bonus", 9.0)].into_iter().collect();
        let g = final_grade(&set);
        assert!(g.is_finite());
        assert_eq!(g, 0.0);
    }

    #[test]
    fn missing_periodic_test_counts_as_zero() {
        let set: StudentGradeSet = vec![
            entry("Quiz1", "15-minute quiz", 7.0),
            entry("Final", "final exam", 8.0),
        ]
        .into_iter()
        .collect();
        assert!((final_grade(&set) - (7.0 / 3.0 * 0.4 + 8.0 * 0.6)).abs() < 1e-9);
    }

    #[test]
    fn later_report_replaces_same_module_name() {
        let mut set = StudentGradeSet::new();
        set.insert(entry("Quiz1", "15P", 3.0));
        let prev = set.insert(entry("Quiz1", "15P", 9.0));
        assert_eq!(prev.map(|e| e.grade), Some(3.0));
        assert_eq!(set.entries().count(), 1);
        assert_eq!(set.get("Quiz1").map(|e| e.grade), Some(9.0));
    }

    #[test]
    fn out_of_scale_grades_are_not_clamped() {
        let set: StudentGradeSet = vec![entry("F", "final exam", 50.0)].into_iter().collect();
        assert!((final_grade(&set) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn final_grade_is_repeatable() {
        let set: StudentGradeSet = vec![
            entry("Q1", "15P", 6.5),
            entry("T1", "1T", 7.25),
            entry("F", "Thi", 5.0),
        ]
        .into_iter()
        .collect();
        assert_eq!(final_grade(&set).to_bits(), final_grade(&set).to_bits());
    }

    #[test]
    fn category_average_rounds_half_up() {
        assert_eq!(category_average(&[]), 0.0);
        assert_eq!(category_average(&[7.0, 8.0]), 8.0);
        assert_eq!(category_average(&[7.0, 7.0, 8.0]), 7.0);
    }

    #[test]
    fn exam_type_parses_codes_and_labels() {
        assert_eq!(ExamType::parse("15P"), ExamType::Quiz15);
        assert_eq!(ExamType::parse("Periodic Test"), ExamType::PeriodicTest);
        assert_eq!(ExamType::parse("Thi"), ExamType::FinalExam);
        assert_eq!(ExamType::parse("bonus"), ExamType::Other("bonus".into()));
    }

    #[test]
    fn display_rounding() {
        assert_eq!(format_grade(8.066_666, 2), "8.07");
        assert_eq!(format_grade(5.733_333, 2), "5.73");
        assert_eq!(format_grade(6.0, 2), "6.00");
    }

    #[test]
    fn classification_bands_are_lower_inclusive() {
        assert_eq!(classify(10.0), Classification::Excellent);
        assert_eq!(classify(9.0), Classification::Excellent);
        assert_eq!(classify(8.999_999), Classification::Good);
        assert_eq!(classify(8.0), Classification::Good);
        assert_eq!(classify(7.999_999), Classification::Fair);
        assert_eq!(classify(7.0), Classification::Fair);
        assert_eq!(classify(6.999_999), Classification::Average);
        assert_eq!(classify(5.0), Classification::Average);
        assert_eq!(classify(4.999_999), Classification::Weak);
        assert_eq!(classify(0.0), Classification::Weak);
        assert_eq!(classify(f64::NAN), Classification::Weak);
    }

    #[test]
    fn classification_uses_unrounded_grade() {
        // 8.996 displays as "9.00" but is still below the band.
        assert_eq!(format_grade(8.996, 2), "9.00");
        assert_eq!(classify(8.996), Classification::Good);
        assert_eq!(
            serde_json::to_value(Classification::Fair).expect("serialize"),
            serde_json::json!("Khá")
        );
        assert_eq!(
            serde_json::to_value(Classification::Weak).expect("serialize"),
            serde_json::json!("Yếu")
        );
    }
}
