//! Dropout scoring used by the `predict_dropouts` binary.
//!
//! Attendance of a school is laid out as a present/absent sheet over its
//! valid days, three features are derived per student and a logistic
//! regression trained from labelled rows turns them into a dropout risk.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2};
use serde::Deserialize;
use thiserror::Error;

use crate::database::Database;
use crate::models::{Attendance, ScoreUpdate};

/// An absence streak counts as long from this many consecutive days.
pub const LONG_STREAK_DAYS: u32 = 8;
const FEATURE_COUNT: usize = 3;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("failed to read training data: {0}")]
    TrainingData(#[from] csv::Error),

    #[error("training data has no rows")]
    EmptyTrainingData,

    #[error("training data needs both dropout and retained students")]
    SingleClass,

    #[error("invalid feature matrix: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("model training failed: {0}")]
    Train(String),

    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

/// Present/absent grid of one school. Columns are the days on which at
/// least one student was present; other days are treated as holidays.
#[derive(Debug, Clone, Default)]
pub struct AttendanceSheet {
    pub days: Vec<chrono::NaiveDate>,
    pub rows: BTreeMap<i64, Vec<bool>>,
}

impl AttendanceSheet {
    pub fn build(records: &[Attendance]) -> Self {
        let days: Vec<_> = records
            .iter()
            .filter(|a| a.is_present())
            .map(|a| a.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let column: BTreeMap<_, _> = days.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut rows: BTreeMap<i64, Vec<bool>> = BTreeMap::new();
        for record in records {
            let row = rows
                .entry(record.student_id)
                .or_insert_with(|| vec![false; days.len()]);
            if record.is_present() {
                if let Some(&i) = column.get(&record.date) {
                    row[i] = true;
                }
            }
        }

        Self { days, rows }
    }

    pub fn features(&self) -> Vec<StudentFeatures> {
        if self.days.is_empty() {
            return Vec::new();
        }
        self.rows
            .iter()
            .map(|(&student_id, row)| StudentFeatures::from_row(student_id, row))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentFeatures {
    pub student_id: i64,
    /// Fraction of valid days present, `0.0..=1.0`.
    pub attendance_pct: f64,
    pub max_consec_absences: u32,
    /// Incremented on every absent day once the running streak reaches [`LONG_STREAK_DAYS`].
    pub num_long_streaks: u32,
}

impl StudentFeatures {
    pub fn from_row(student_id: i64, row: &[bool]) -> Self {
        let present = row.iter().filter(|p| **p).count();
        let mut streak = 0;
        let mut max_streak = 0;
        let mut long_streaks = 0;
        for &was_present in row {
            if was_present {
                streak = 0;
                continue;
            }
            streak += 1;
            max_streak = max_streak.max(streak);
            if streak >= LONG_STREAK_DAYS {
                long_streaks += 1;
            }
        }

        Self {
            student_id,
            attendance_pct: if row.is_empty() { 0.0 } else { present as f64 / row.len() as f64 },
            max_consec_absences: max_streak,
            num_long_streaks: long_streaks,
        }
    }

    fn to_row(&self) -> [f64; FEATURE_COUNT] {
        [
            self.attendance_pct,
            f64::from(self.max_consec_absences),
            f64::from(self.num_long_streaks),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct TrainingRow {
    attendance_pct: f64,
    max_consec_absences: f64,
    num_long_streaks: f64,
    dropout: u8,
}

pub struct DropoutModel {
    model: FittedLogisticRegression<f64, bool>,
    accuracy: f64,
}

impl DropoutModel {
    pub fn train_from_csv(path: &Path) -> Result<Self, ScoringError> {
        let reader = csv::Reader::from_path(path)?;
        Self::train_from_reader(reader)
    }

    pub fn train_from_reader<R: Read>(mut reader: csv::Reader<R>) -> Result<Self, ScoringError> {
        let mut data = Vec::new();
        let mut targets = Vec::new();
        for row in reader.deserialize() {
            let row: TrainingRow = row?;
            data.extend([row.attendance_pct, row.max_consec_absences, row.num_long_streaks]);
            targets.push(row.dropout > 0);
        }

        if targets.is_empty() {
            return Err(ScoringError::EmptyTrainingData);
        }
        let dropouts = targets.iter().filter(|t| **t).count();
        if dropouts == 0 || dropouts == targets.len() {
            return Err(ScoringError::SingleClass);
        }
        tracing::info!(
            rows = targets.len(),
            dropouts,
            retained = targets.len() - dropouts,
            "loaded training data"
        );

        let features = Array2::from_shape_vec((targets.len(), FEATURE_COUNT), data)?;
        Self::train(features, Array1::from_vec(targets))
    }

    pub fn train(features: Array2<f64>, targets: Array1<bool>) -> Result<Self, ScoringError> {
        let dataset = Dataset::new(features.clone(), targets.clone());
        let model = LogisticRegression::default()
            .max_iterations(100)
            .fit(&dataset)
            .map_err(|e| ScoringError::Train(e.to_string()))?;

        let predictions = model.predict(&features);
        let correct = predictions
            .iter()
            .zip(targets.iter())
            .filter(|(pred, actual)| pred == actual)
            .count();
        let accuracy = correct as f64 / targets.len() as f64;
        tracing::info!(accuracy = %format!("{:.2}%", accuracy * 100.0), "dropout model trained");

        Ok(Self { model, accuracy })
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn score(&self, school_id: i64, features: &[StudentFeatures]) -> Result<Vec<ScoreUpdate>, ScoringError> {
        if features.is_empty() {
            return Ok(Vec::new());
        }
        let flat: Vec<f64> = features.iter().flat_map(StudentFeatures::to_row).collect();
        let matrix = Array2::from_shape_vec((features.len(), FEATURE_COUNT), flat)?;

        let predictions = self.model.predict(&matrix);
        let probabilities = self.model.predict_probabilities(&matrix);

        Ok(features
            .iter()
            .zip(predictions.iter().zip(probabilities.iter()))
            .map(|(f, (&dropout, &p))| {
                // `p` is the probability of the model's positive class; orient it to "dropout".
                let risk = if dropout == (p >= 0.5) { p } else { 1.0 - p };
                ScoreUpdate {
                    student_id: f.student_id,
                    school_id,
                    attendance_percentage: f.attendance_pct * 100.0,
                    max_consec_absences: i64::from(f.max_consec_absences),
                    num_long_streaks: i64::from(f.num_long_streaks),
                    dropout_risk: risk.clamp(0.0, 1.0),
                    dropout_pred: i64::from(dropout),
                }
            })
            .collect())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScoringSummary {
    pub schools: usize,
    pub students_updated: u64,
}

/// Scores one school and writes the results in one transaction.
pub async fn score_school(db: &Database, model: &DropoutModel, school_id: i64) -> Result<u64, ScoringError> {
    let records = db.attendance_for_school(school_id).await?;
    let sheet = AttendanceSheet::build(&records);
    tracing::info!(
        school_id,
        records = records.len(),
        valid_days = sheet.days.len(),
        students = sheet.rows.len(),
        "scoring school"
    );

    let features = sheet.features();
    if features.is_empty() {
        tracing::warn!(school_id, "no features generated, skipping");
        return Ok(0);
    }

    let updates = model.score(school_id, &features)?;
    let updated = db.apply_scores(&updates).await?;
    tracing::info!(school_id, updated, "updated students with predictions");
    Ok(updated)
}

pub async fn score_all(db: &Database, model: &DropoutModel) -> Result<ScoringSummary, ScoringError> {
    let schools = db.schools_with_attendance().await?;
    tracing::info!(schools = schools.len(), "found schools with attendance");

    let mut summary = ScoringSummary::default();
    for school_id in schools {
        summary.students_updated += score_school(db, model, school_id).await?;
        summary.schools += 1;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendanceMethod, AttendanceStatus};
    use chrono::{NaiveDate, Utc};

    const TRAINING_CSV: &str = include_str!("../data/dropout_training.csv");

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn record(student_id: i64, date: NaiveDate, status: AttendanceStatus) -> Attendance {
        Attendance {
            id: 0,
            student_id,
            school_id: 1,
            date,
            status,
            method: AttendanceMethod::Manual,
            marked_by: None,
            time_in: None,
            remarks: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn bundled_model() -> DropoutModel {
        DropoutModel::train_from_reader(csv::Reader::from_reader(TRAINING_CSV.as_bytes())).unwrap()
    }

    #[test]
    fn days_nobody_attended_are_holidays() {
        use AttendanceStatus::*;
        let records = vec![
            record(1, day(1), Present),
            record(2, day(1), Absent),
            record(1, day(2), Absent),
            record(2, day(2), Absent),
            record(1, day(3), Late),
            record(2, day(3), Present),
        ];
        let sheet = AttendanceSheet::build(&records);
        assert_eq!(sheet.days, vec![day(1), day(3)]);
        assert_eq!(sheet.rows[&1], vec![true, false]);
        assert_eq!(sheet.rows[&2], vec![false, true]);
    }

    #[test]
    fn long_streak_counter_grows_with_every_day_past_the_limit() {
        let mut row = vec![true];
        row.extend(std::iter::repeat(false).take(9));
        let features = StudentFeatures::from_row(7, &row);
        assert_eq!(features.max_consec_absences, 9);
        assert_eq!(features.num_long_streaks, 2);
        assert!((features.attendance_pct - 0.1).abs() < 1e-9);

        let short = StudentFeatures::from_row(8, &[false, false, true, false]);
        assert_eq!(short.max_consec_absences, 2);
        assert_eq!(short.num_long_streaks, 0);
    }

    #[test]
    fn school_without_presence_yields_no_features() {
        let records = vec![record(1, day(1), AttendanceStatus::Absent)];
        assert!(AttendanceSheet::build(&records).features().is_empty());
    }

    #[test]
    fn bundled_training_data_separates_students() {
        let model = bundled_model();
        assert!(model.accuracy() > 0.8);

        let regular = StudentFeatures {
            student_id: 1,
            attendance_pct: 0.97,
            max_consec_absences: 1,
            num_long_streaks: 0,
        };
        let absent = StudentFeatures {
            student_id: 2,
            attendance_pct: 0.2,
            max_consec_absences: 25,
            num_long_streaks: 18,
        };
        let scores = model.score(3, &[regular, absent]).unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(&s.dropout_risk)));
        assert!(scores[1].dropout_risk > scores[0].dropout_risk);
        assert_eq!(scores[1].dropout_pred, 1);
        assert_eq!(scores[0].dropout_pred, 0);
        assert!((scores[0].attendance_percentage - 97.0).abs() < 1e-9);
        assert_eq!(scores[1].school_id, 3);
    }

    #[test]
    fn training_needs_both_classes() {
        let csv = "attendance_pct,max_consec_absences,num_long_streaks,dropout\n0.9,1,0,0\n0.8,2,0,0\n";
        let err = DropoutModel::train_from_reader(csv::Reader::from_reader(csv.as_bytes()));
        assert!(matches!(err, Err(ScoringError::SingleClass)));

        let empty = "attendance_pct,max_consec_absences,num_long_streaks,dropout\n";
        let err = DropoutModel::train_from_reader(csv::Reader::from_reader(empty.as_bytes()));
        assert!(matches!(err, Err(ScoringError::EmptyTrainingData)));
    }
}
