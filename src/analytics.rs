//! Dashboard and report aggregations.
//!
//! Handlers fetch records from the store and fold them here. Every
//! percentage is clamped to `0..=100` and a zero denominator yields 0.

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{Attendance, School, Student};

/// A day whose attendance rate falls below this is a "low" day; a student
/// below it over the last 30 days is at risk.
pub const LOW_ATTENDANCE_RATE: f64 = 75.0;
/// Schools below this rate today need attention.
pub const SCHOOL_ATTENTION_RATE: f64 = 80.0;
pub const TOP_PERFORMER_RATE: f64 = 95.0;
pub const TREND_DAYS: u64 = 30;
pub const PERIOD_DAYS: u64 = 7;
const IMPROVEMENT_WINDOW: usize = 10;

pub fn percentage(part: usize, whole: usize) -> f64 {
    percentage_f(part as f64, whole as f64)
}

pub fn percentage_f(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    (part / whole * 100.0).clamp(0.0, 100.0)
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Rate with one decimal ("70.0"), or "0" when there is nothing to divide by.
pub fn format_rate(part: usize, whole: usize) -> String {
    if whole == 0 {
        "0".to_string()
    } else {
        format!("{:.1}", percentage(part, whole))
    }
}

fn format_mean(sum: f64, count: usize) -> String {
    if count == 0 {
        "0".to_string()
    } else {
        format!("{:.1}", sum / count as f64)
    }
}

pub fn days_before(day: NaiveDate, days: u64) -> NaiveDate {
    day.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

pub fn days_after(day: NaiveDate, days: u64) -> NaiveDate {
    day.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

/// First and last day of the calendar month containing `day`.
pub fn month_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = day.with_day(1).unwrap_or(day);
    let next_month = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next_month.and_then(|d| d.pred_opt()).unwrap_or(day);
    (first, last)
}

fn present_count<'a>(records: impl IntoIterator<Item = &'a Attendance>) -> usize {
    records.into_iter().filter(|a| a.is_present()).count()
}

fn group_by_day<'a>(
    records: impl IntoIterator<Item = &'a Attendance>,
) -> BTreeMap<NaiveDate, Vec<&'a Attendance>> {
    let mut by_day: BTreeMap<NaiveDate, Vec<&Attendance>> = BTreeMap::new();
    for record in records {
        by_day.entry(record.date).or_default().push(record);
    }
    by_day
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyStats {
    pub total_students: usize,
    pub present_count: usize,
    pub absent_count: usize,
    pub attendance_percentage: String,
}

impl DailyStats {
    pub fn new(total_students: usize, present_count: usize) -> Self {
        let present_count = present_count.min(total_students);
        Self {
            total_students,
            present_count,
            absent_count: total_students - present_count,
            attendance_percentage: format_rate(present_count, total_students),
        }
    }

    pub fn from_records(total_students: usize, records: &[Attendance]) -> Self {
        Self::new(total_students, present_count(records))
    }
}

/// Last-30-day attendance of one student.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileStats {
    pub attended: usize,
    pub total: usize,
    pub percentage: String,
}

impl ProfileStats {
    pub fn from_records(records: &[Attendance]) -> Self {
        let attended = present_count(records);
        Self {
            attended,
            total: records.len(),
            percentage: format_rate(attended, records.len()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlySummary {
    pub school_days: usize,
    pub average_rate: String,
    pub perfect_days: usize,
    pub low_days: usize,
}

impl MonthlySummary {
    pub fn build(month_records: &[Attendance], total_students: usize) -> Self {
        let by_day = group_by_day(month_records);
        let mut total_rate = 0.0;
        let mut perfect_days = 0;
        let mut low_days = 0;

        for records in by_day.values() {
            let rate = percentage(present_count(records.iter().copied()), total_students);
            total_rate += rate;
            if rate >= 100.0 {
                perfect_days += 1;
            }
            if rate < LOW_ATTENDANCE_RATE {
                low_days += 1;
            }
        }

        Self {
            school_days: by_day.len(),
            average_rate: format_mean(total_rate, by_day.len()),
            perfect_days,
            low_days,
        }
    }
}

/// Students of one class.
#[derive(Debug, Clone)]
pub struct ClassRoster {
    pub name: String,
    pub student_ids: HashSet<i64>,
}

impl ClassRoster {
    /// Groups students by class; students without a class are left out.
    pub fn from_students(students: &[Student]) -> Vec<ClassRoster> {
        let mut classes: BTreeMap<&str, HashSet<i64>> = BTreeMap::new();
        for student in students {
            if let Some(class) = student.class.as_deref().filter(|c| !c.is_empty()) {
                classes.entry(class).or_default().insert(student.id);
            }
        }
        classes
            .into_iter()
            .map(|(name, student_ids)| ClassRoster {
                name: name.to_string(),
                student_ids,
            })
            .collect()
    }

    fn daily_rates(&self, records: &[Attendance]) -> BTreeMap<NaiveDate, f64> {
        let by_day = group_by_day(records.iter().filter(|a| self.student_ids.contains(&a.student_id)));
        by_day
            .into_iter()
            .map(|(day, records)| {
                (day, percentage(present_count(records), self.student_ids.len()))
            })
            .collect()
    }

    /// Mean daily rate over the days this class has records.
    pub fn average_rate(&self, records: &[Attendance]) -> f64 {
        let rates = self.daily_rates(records);
        if rates.is_empty() {
            return 0.0;
        }
        rates.values().sum::<f64>() / rates.len() as f64
    }

    /// Mean of the last ten recorded days minus mean of the first ten.
    pub fn improvement(&self, records: &[Attendance]) -> f64 {
        let rates: Vec<f64> = self.daily_rates(records).into_values().collect();
        let mean = |slice: &[f64]| {
            if slice.is_empty() {
                0.0
            } else {
                slice.iter().sum::<f64>() / slice.len() as f64
            }
        };
        let first = &rates[..rates.len().min(IMPROVEMENT_WINDOW)];
        let last = &rates[rates.len().saturating_sub(IMPROVEMENT_WINDOW)..];
        mean(last) - mean(first)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassComparison {
    pub best: Option<String>,
    pub needs_attention: Option<String>,
    pub most_improved: Option<String>,
    pub avg_difference: String,
}

impl ClassComparison {
    pub fn build(classes: &[ClassRoster], month_records: &[Attendance]) -> Self {
        let mut best: Option<(&str, f64)> = None;
        let mut worst: Option<(&str, f64)> = None;
        let mut most_improved: Option<(&str, f64)> = None;

        for class in classes {
            let rate = class.average_rate(month_records);
            if best.map_or(true, |(_, r)| rate > r) {
                best = Some((class.name.as_str(), rate));
            }
            if worst.map_or(true, |(_, r)| rate < r) {
                worst = Some((class.name.as_str(), rate));
            }
            let improvement = class.improvement(month_records);
            if most_improved.map_or(true, |(_, d)| improvement > d) {
                most_improved = Some((class.name.as_str(), improvement));
            }
        }

        let avg_difference = match (best, worst) {
            (Some((_, high)), Some((_, low))) if classes.len() > 1 => format!("{:.1}", high - low),
            _ => "0".to_string(),
        };

        Self {
            best: best.map(|(name, _)| name.to_string()),
            needs_attention: worst.map(|(name, _)| name.to_string()),
            most_improved: most_improved.map(|(name, _)| name.to_string()),
            avg_difference,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub rate: f64,
}

/// One point per day from `start` for `days` days, including days without records.
pub fn daily_trend(
    records: &[Attendance],
    total_students: usize,
    start: NaiveDate,
    days: u64,
) -> Vec<TrendPoint> {
    let by_day = group_by_day(records);
    (0..days)
        .map(|offset| {
            let date = days_after(start, offset);
            let present = by_day
                .get(&date)
                .map_or(0, |records| present_count(records.iter().copied()));
            TrendPoint {
                date,
                rate: round1(percentage(present, total_students)),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassPerformance {
    pub class: String,
    pub avg_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentRate {
    pub student_id: i64,
    pub name: String,
    pub class: Option<String>,
    pub percentage: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportAnalytics {
    pub total_students: usize,
    pub avg_attendance: String,
    pub risk_students: usize,
    pub perfect_attendance: usize,
}

pub struct ReportInput<'a> {
    pub today: NaiveDate,
    pub students: &'a [Student],
    pub today_records: &'a [Attendance],
    pub month_records: &'a [Attendance],
    /// Records from `today - 29` through today.
    pub trend_records: &'a [Attendance],
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherReport {
    pub daily: DailyStats,
    pub monthly: MonthlySummary,
    pub classes: ClassComparison,
    pub trends: Vec<TrendPoint>,
    pub class_performance: Vec<ClassPerformance>,
    pub analytics: ReportAnalytics,
    pub top_performers: Vec<StudentRate>,
    pub at_risk: Vec<StudentRate>,
}

impl TeacherReport {
    pub fn build(input: ReportInput<'_>) -> Self {
        let total_students = input.students.len();
        let classes = ClassRoster::from_students(input.students);

        let trends = daily_trend(
            input.trend_records,
            total_students,
            days_before(input.today, TREND_DAYS - 1),
            TREND_DAYS,
        );

        let class_performance = classes
            .iter()
            .map(|class| ClassPerformance {
                class: class.name.clone(),
                avg_rate: round1(class.average_rate(input.trend_records)),
            })
            .collect();

        let mut per_student: HashMap<i64, (usize, usize)> = HashMap::new();
        for record in input.trend_records {
            let entry = per_student.entry(record.student_id).or_default();
            entry.1 += 1;
            if record.is_present() {
                entry.0 += 1;
            }
        }

        let mut at_risk = Vec::new();
        let mut top_performers = Vec::new();
        let mut perfect_attendance = 0;
        for student in input.students {
            let (present, recorded) = per_student.get(&student.id).copied().unwrap_or_default();
            let rate = percentage(present, recorded);
            let summary = || StudentRate {
                student_id: student.id,
                name: student.name.clone(),
                class: student.class.clone(),
                percentage: format!("{rate:.1}"),
            };
            if rate < LOW_ATTENDANCE_RATE {
                at_risk.push(summary());
            }
            if recorded > 0 && present == recorded {
                perfect_attendance += 1;
            }
            if rate > TOP_PERFORMER_RATE {
                top_performers.push(summary());
            }
        }

        let trend_sum: f64 = trends.iter().map(|t| t.rate).sum();
        let analytics = ReportAnalytics {
            total_students,
            avg_attendance: format_mean(trend_sum, trends.len()),
            risk_students: at_risk.len(),
            perfect_attendance,
        };

        Self {
            daily: DailyStats::from_records(total_students, input.today_records),
            monthly: MonthlySummary::build(input.month_records, total_students),
            classes: ClassComparison::build(&classes, input.month_records),
            trends,
            class_performance,
            analytics,
            top_performers,
            at_risk,
        }
    }
}

/// Per-school counts gathered for government views.
#[derive(Debug, Clone)]
pub struct SchoolSnapshot {
    pub school: School,
    pub total_students: usize,
    pub present_today: usize,
    pub high_risk_students: usize,
}

impl SchoolSnapshot {
    pub fn attendance_rate(&self) -> f64 {
        percentage(self.present_today, self.total_students)
    }

    pub fn dropout_risk(&self) -> f64 {
        percentage(self.high_risk_students, self.total_students)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolStats {
    #[serde(flatten)]
    pub school: School,
    pub total_students: usize,
    pub high_risk_students: usize,
    pub attendance_rate: String,
    pub dropout_risk: String,
}

impl From<SchoolSnapshot> for SchoolStats {
    fn from(snapshot: SchoolSnapshot) -> Self {
        Self {
            attendance_rate: format!("{:.1}", snapshot.attendance_rate()),
            dropout_risk: format!("{:.1}", snapshot.dropout_risk()),
            total_students: snapshot.total_students,
            high_risk_students: snapshot.high_risk_students,
            school: snapshot.school,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallStats {
    pub total_schools: usize,
    pub total_students: usize,
    pub avg_attendance: String,
    pub avg_dropout_risk: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GovernmentOverview {
    pub schools: Vec<SchoolStats>,
    pub overall: OverallStats,
}

impl GovernmentOverview {
    pub fn build(snapshots: Vec<SchoolSnapshot>) -> Self {
        let total_schools = snapshots.len();
        let total_students = snapshots.iter().map(|s| s.total_students).sum();
        let attendance_sum: f64 = snapshots.iter().map(|s| round1(s.attendance_rate())).sum();
        let risk_sum: f64 = snapshots.iter().map(|s| round1(s.dropout_risk())).sum();

        let schools = snapshots.into_iter().map(SchoolStats::from).collect();

        Self {
            schools,
            overall: OverallStats {
                total_schools,
                total_students,
                avg_attendance: format_mean(attendance_sum, total_schools),
                avg_dropout_risk: format_mean(risk_sum, total_schools),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAttendance {
    pub date: NaiveDate,
    pub present: usize,
    pub percentage: String,
}

pub fn day_attendance(daily_present: &[(NaiveDate, usize)], total_students: usize) -> Vec<DayAttendance> {
    daily_present
        .iter()
        .map(|&(date, present)| DayAttendance {
            date,
            present,
            percentage: format_rate(present, total_students),
        })
        .collect()
}

/// Rate over a multi-day window: present marks / (students x days).
pub fn period_rate(present: usize, total_students: usize, days: u64) -> f64 {
    percentage_f(present as f64, (total_students as u64 * days) as f64)
}

#[derive(Debug, Clone)]
pub struct DistrictSchoolInput {
    pub snapshot: SchoolSnapshot,
    pub present_in_period: usize,
}

pub struct DistrictInput {
    pub schools: Vec<DistrictSchoolInput>,
    pub total_students: usize,
    pub current_period_present: usize,
    pub previous_period_present: usize,
    pub daily_present: Vec<(NaiveDate, usize)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistrictStats {
    pub district: String,
    pub schools: usize,
    pub total_students: usize,
    pub avg_attendance: String,
    pub avg_dropout_risk: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BestSchool {
    pub name: String,
    pub rate: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistrictAnalytics {
    pub districts: Vec<DistrictStats>,
    pub district_average: String,
    pub district_trend: String,
    pub best_performing: Option<BestSchool>,
    pub needs_attention: usize,
    pub total_students: usize,
    pub trend_labels: Vec<String>,
    pub trend_data: Vec<f64>,
    pub school_labels: Vec<String>,
    pub school_data: Vec<f64>,
}

impl DistrictAnalytics {
    pub fn build(input: DistrictInput) -> Self {
        #[derive(Default)]
        struct Acc {
            schools: usize,
            students: usize,
            attendance_sum: f64,
            risk_sum: f64,
        }

        let mut districts: BTreeMap<String, Acc> = BTreeMap::new();
        let mut best: Option<(&str, f64)> = None;
        let mut needs_attention = 0;
        let mut attendance_sum = 0.0;

        for school in &input.schools {
            let snapshot = &school.snapshot;
            let rate = snapshot.attendance_rate();
            if rate > best.map_or(0.0, |(_, r)| r) {
                best = Some((snapshot.school.name.as_str(), rate));
            }
            if rate < SCHOOL_ATTENTION_RATE {
                needs_attention += 1;
            }
            attendance_sum += rate;

            let acc = districts.entry(snapshot.school.district.clone()).or_default();
            acc.schools += 1;
            acc.students += snapshot.total_students;
            acc.attendance_sum += rate;
            acc.risk_sum += snapshot.dropout_risk();
        }

        let districts = districts
            .into_iter()
            .map(|(district, acc)| DistrictStats {
                district,
                schools: acc.schools,
                total_students: acc.students,
                avg_attendance: format_mean(acc.attendance_sum, acc.schools),
                avg_dropout_risk: format_mean(acc.risk_sum, acc.schools),
            })
            .collect();

        let current = period_rate(input.current_period_present, input.total_students, PERIOD_DAYS);
        let previous = period_rate(input.previous_period_present, input.total_students, PERIOD_DAYS);

        let (trend_labels, trend_data) = input
            .daily_present
            .iter()
            .map(|&(date, present)| {
                (date.format("%Y-%m-%d").to_string(), round1(percentage(present, input.total_students)))
            })
            .unzip();

        let (school_labels, school_data) = input
            .schools
            .iter()
            .map(|s| {
                (
                    s.snapshot.school.name.clone(),
                    round1(period_rate(s.present_in_period, s.snapshot.total_students, PERIOD_DAYS)),
                )
            })
            .unzip();

        Self {
            districts,
            district_average: format_mean(attendance_sum, input.schools.len()),
            district_trend: format!("{:.1}", current - previous),
            best_performing: best.map(|(name, rate)| BestSchool {
                name: name.to_string(),
                rate: format!("{rate:.1}"),
            }),
            needs_attention,
            total_students: input.schools.iter().map(|s| s.snapshot.total_students).sum(),
            trend_labels,
            trend_data,
            school_labels,
            school_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendanceMethod, AttendanceStatus};
    use chrono::Utc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
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

    fn student(id: i64, class: &str) -> Student {
        Student {
            id,
            school_id: 1,
            name: format!("Student {id}"),
            roll_number: Some(format!("R{id:03}")),
            rfid_tag_id: None,
            class: Some(class.to_string()),
            section: None,
            parent_contact: None,
            parent_email: None,
            face_descriptor: None,
            attendance_percentage: None,
            max_consec_absences: None,
            num_long_streaks: None,
            dropout_risk: None,
            dropout_pred: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn school(id: i64, name: &str, district: &str) -> School {
        School {
            id,
            name: name.to_string(),
            code: format!("S{id}"),
            address: None,
            district: district.to_string(),
            state: None,
            latitude: None,
            longitude: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn seven_of_ten_present_renders_seventy() {
        let stats = DailyStats::new(10, 7);
        assert_eq!(stats.attendance_percentage, "70.0");
        assert_eq!(stats.absent_count, 3);
    }

    #[test]
    fn empty_school_renders_zero() {
        let stats = DailyStats::new(0, 0);
        assert_eq!(stats.attendance_percentage, "0");
        assert_eq!(stats.absent_count, 0);
    }

    #[test]
    fn percentages_stay_in_range() {
        for (part, whole) in [(0, 0), (5, 0), (0, 3), (3, 3), (9, 3), (1, 3)] {
            let p = percentage(part, whole);
            assert!((0.0..=100.0).contains(&p), "{part}/{whole} gave {p}");
        }
        assert_eq!(percentage(5, 0), 0.0);
        assert_eq!(period_rate(10, 0, 7), 0.0);
    }

    #[test]
    fn more_present_than_enrolled_is_capped() {
        let stats = DailyStats::new(2, 5);
        assert_eq!(stats.attendance_percentage, "100.0");
        assert_eq!(stats.absent_count, 0);
    }

    #[test]
    fn month_bounds_handle_december_and_leap_years() {
        let (first, last) = month_bounds(NaiveDate::from_ymd_opt(2024, 12, 15).unwrap());
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());

        let (_, last) = month_bounds(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn monthly_summary_counts_perfect_and_low_days() {
        use AttendanceStatus::*;
        let records = vec![
            record(1, day(3), Present),
            record(2, day(3), Present),
            record(1, day(4), Present),
            record(2, day(4), Absent),
            record(1, day(5), Absent),
            record(2, day(5), Absent),
        ];
        let summary = MonthlySummary::build(&records, 2);
        assert_eq!(summary.school_days, 3);
        assert_eq!(summary.perfect_days, 1);
        assert_eq!(summary.low_days, 2);
        assert_eq!(summary.average_rate, "50.0");

        let empty = MonthlySummary::build(&[], 0);
        assert_eq!(empty.average_rate, "0");
    }

    #[test]
    fn class_comparison_picks_best_worst_and_most_improved() {
        use AttendanceStatus::*;
        let students = vec![student(1, "5A"), student(2, "5A"), student(3, "6B")];
        let classes = ClassRoster::from_students(&students);

        let mut records = Vec::new();
        for d in 1..=12 {
            // 5A is always fully present; 6B is absent for the first six days.
            records.push(record(1, day(d), Present));
            records.push(record(2, day(d), Present));
            records.push(record(3, day(d), if d <= 6 { Absent } else { Present }));
        }

        let comparison = ClassComparison::build(&classes, &records);
        assert_eq!(comparison.best.as_deref(), Some("5A"));
        assert_eq!(comparison.needs_attention.as_deref(), Some("6B"));
        assert_eq!(comparison.most_improved.as_deref(), Some("6B"));
        assert_eq!(comparison.avg_difference, "50.0");
    }

    #[test]
    fn single_class_has_no_spread() {
        let students = vec![student(1, "5A")];
        let classes = ClassRoster::from_students(&students);
        let comparison = ClassComparison::build(&classes, &[]);
        assert_eq!(comparison.best.as_deref(), Some("5A"));
        assert_eq!(comparison.avg_difference, "0");
    }

    #[test]
    fn trend_has_a_point_for_every_day() {
        let records = vec![record(1, day(2), AttendanceStatus::Present)];
        let trend = daily_trend(&records, 3, day(1), 5);
        assert_eq!(trend.len(), 5);
        assert_eq!(trend[0].rate, 0.0);
        assert_eq!(trend[1].rate, 33.3);
        assert_eq!(trend[4].date, day(5));
    }

    #[test]
    fn report_flags_at_risk_and_top_students() {
        use AttendanceStatus::*;
        let students = vec![student(1, "5A"), student(2, "5A"), student(3, "5A")];
        let today = day(20);
        let mut trend_records = Vec::new();
        for d in 10..=20 {
            trend_records.push(record(1, day(d), Present));
            trend_records.push(record(2, day(d), if d % 2 == 0 { Absent } else { Present }));
        }
        let today_records: Vec<Attendance> = trend_records
            .iter()
            .filter(|r| r.date == today)
            .cloned()
            .collect();

        let report = TeacherReport::build(ReportInput {
            today,
            students: &students,
            today_records: &today_records,
            month_records: &trend_records,
            trend_records: &trend_records,
        });

        assert_eq!(report.daily.attendance_percentage, "33.3");
        assert_eq!(report.trends.len(), 30);
        assert_eq!(report.analytics.perfect_attendance, 1);
        assert_eq!(report.top_performers.len(), 1);
        assert_eq!(report.top_performers[0].student_id, 1);
        // Student 2 attends under half the days; student 3 has no records at all.
        let at_risk: Vec<i64> = report.at_risk.iter().map(|s| s.student_id).collect();
        assert_eq!(at_risk, vec![2, 3]);
        for point in &report.trends {
            assert!((0.0..=100.0).contains(&point.rate));
        }
    }

    #[test]
    fn government_overview_averages_schools() {
        let overview = GovernmentOverview::build(vec![
            SchoolSnapshot {
                school: school(1, "North", "A"),
                total_students: 10,
                present_today: 7,
                high_risk_students: 1,
            },
            SchoolSnapshot {
                school: school(2, "Empty", "A"),
                total_students: 0,
                present_today: 0,
                high_risk_students: 0,
            },
        ]);
        assert_eq!(overview.schools[0].attendance_rate, "70.0");
        assert_eq!(overview.schools[0].dropout_risk, "10.0");
        assert_eq!(overview.schools[1].attendance_rate, "0.0");
        assert_eq!(overview.overall.total_students, 10);
        assert_eq!(overview.overall.avg_attendance, "35.0");

        let none = GovernmentOverview::build(Vec::new());
        assert_eq!(none.overall.avg_attendance, "0");
    }

    #[test]
    fn district_analytics_groups_and_compares_periods() {
        let input = DistrictInput {
            schools: vec![
                DistrictSchoolInput {
                    snapshot: SchoolSnapshot {
                        school: school(1, "North", "Hill"),
                        total_students: 10,
                        present_today: 9,
                        high_risk_students: 2,
                    },
                    present_in_period: 63,
                },
                DistrictSchoolInput {
                    snapshot: SchoolSnapshot {
                        school: school(2, "South", "Valley"),
                        total_students: 10,
                        present_today: 5,
                        high_risk_students: 0,
                    },
                    present_in_period: 35,
                },
            ],
            total_students: 20,
            current_period_present: 98,
            previous_period_present: 84,
            daily_present: vec![(day(1), 10), (day(2), 20)],
        };

        let analytics = DistrictAnalytics::build(input);
        assert_eq!(analytics.districts.len(), 2);
        assert_eq!(analytics.districts[0].district, "Hill");
        assert_eq!(analytics.districts[0].avg_attendance, "90.0");
        assert_eq!(analytics.district_average, "70.0");
        assert_eq!(analytics.best_performing.as_ref().unwrap().name, "North");
        assert_eq!(analytics.needs_attention, 1);
        assert_eq!(analytics.district_trend, "10.0");
        assert_eq!(analytics.trend_data, vec![50.0, 100.0]);
        assert_eq!(analytics.school_data, vec![90.0, 50.0]);
    }

    #[test]
    fn profile_stats_with_no_records_is_zero() {
        let stats = ProfileStats::from_records(&[]);
        assert_eq!(stats.percentage, "0");
        assert_eq!(stats.total, 0);
    }
}
