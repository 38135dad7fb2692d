use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{ForecastError, ForecastResult},
    features::{derive, CalendarInput, FeatureVector},
    schema::{FeatureSchema, Meal},
};

/// Day used when the export carries neither a date nor a day-of-month column.
pub const MID_MONTH_DAY: u32 = 15;

const DATE_FORMATS: [&str; 2] = ["%d/%m/%Y", "%Y-%m-%d"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Weekday,
    Month,
    Year,
    Holiday,
    Weekend,
    Breakfast,
    Lunch,
    Dinner,
    Total,
    Date,
    Day,
}

impl Column {
    const REQUIRED: [Self; 9] = [
        Self::Weekday,
        Self::Month,
        Self::Year,
        Self::Holiday,
        Self::Weekend,
        Self::Breakfast,
        Self::Lunch,
        Self::Dinner,
        Self::Total,
    ];
    const ALL: [Self; 11] = [
        Self::Weekday,
        Self::Month,
        Self::Year,
        Self::Holiday,
        Self::Weekend,
        Self::Breakfast,
        Self::Lunch,
        Self::Dinner,
        Self::Total,
        Self::Date,
        Self::Day,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::Weekday => "weekday",
            Self::Month => "month",
            Self::Year => "year",
            Self::Holiday => "holiday",
            Self::Weekend => "weekend",
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Total => "total",
            Self::Date => "date",
            Self::Day => "day",
        }
    }

    /// Lower-cased header spellings found in restaurant exports.
    const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Weekday => &[
                "jour_semaine",
                "jours de la semane",
                "jours de la semaine",
                "day_of_week",
            ],
            Self::Month => &["mois"],
            Self::Year => &["annee", "année"],
            Self::Holiday => &["jour_ferie", "jour de ferié", "jour férié", "jour ferie"],
            Self::Weekend => &["week-end", "week_end"],
            Self::Breakfast => &[
                "petit_dejeuner",
                "les étudiants arrivent au petit déjeuner",
            ],
            Self::Lunch => &["dejeuner", "les étudiants arrivent au déjeuner"],
            Self::Dinner => &["diner", "dîner", "les étudiants arrivent au dinner"],
            Self::Total => &[],
            Self::Date => &[],
            Self::Day => &["jour", "day_of_month"],
        }
    }

    fn matches(self, header: &str) -> bool {
        let header = header.trim().to_lowercase();
        header == self.name() || self.aliases().contains(&header.as_str())
    }
}

/// Positions of the canonical columns inside the raw header row.
#[derive(Debug, Default)]
struct ColumnMap {
    slots: [Option<usize>; 11],
}

impl ColumnMap {
    fn resolve(headers: &csv::StringRecord) -> ForecastResult<Self> {
        let mut map = Self::default();
        for (position, header) in headers.iter().enumerate() {
            if let Some(idx) = Column::ALL.iter().position(|col| col.matches(header)) {
                // first occurrence wins
                map.slots[idx].get_or_insert(position);
            }
        }
        let missing: Vec<String> = Column::REQUIRED
            .iter()
            .filter(|col| map.position(**col).is_none())
            .map(|col| col.name().to_string())
            .collect();
        if missing.is_empty() {
            Ok(map)
        } else {
            Err(ForecastError::Schema { missing })
        }
    }

    fn position(&self, column: Column) -> Option<usize> {
        let idx = Column::ALL.iter().position(|col| *col == column)?;
        self.slots[idx]
    }
}

/// One historical day kept for training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRecord {
    /// ISO weekday, 1..=7.
    pub weekday: u32,
    /// Calendar date of the service day.
    pub date: NaiveDate,
    /// Holiday flag.
    pub holiday: bool,
    /// Weekend flag.
    pub weekend: bool,
    /// Breakfast attendance.
    pub breakfast: u32,
    /// Lunch attendance.
    pub lunch: u32,
    /// Dinner attendance.
    pub dinner: u32,
    /// Recorded daily total.
    pub total: i64,
}

impl CalendarRecord {
    /// Observed attendance for one meal.
    #[must_use]
    pub const fn count(&self, meal: Meal) -> u32 {
        match meal {
            Meal::Breakfast => self.breakfast,
            Meal::Lunch => self.lunch,
            Meal::Dinner => self.dinner,
        }
    }

    /// Sum of the three meal counts.
    #[must_use]
    pub fn meal_sum(&self) -> i64 {
        i64::from(self.breakfast) + i64::from(self.lunch) + i64::from(self.dinner)
    }

    /// Day category used for reporting; holidays take precedence over weekends.
    #[must_use]
    pub const fn day_type(&self) -> DayType {
        if self.holiday {
            DayType::Holiday
        } else if self.weekend {
            DayType::Weekend
        } else {
            DayType::Weekday
        }
    }

    fn calendar_input(&self) -> CalendarInput {
        CalendarInput::from_date(self.weekday, self.date, self.weekend, self.holiday)
    }
}

/// Coarse day category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayType {
    /// Regular teaching day.
    Weekday,
    /// Saturday or Sunday.
    Weekend,
    /// Public holiday.
    Holiday,
}

/// Attendance statistics for one day category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayTypeStats {
    /// Category.
    pub day_type: DayType,
    /// Number of kept rows in the category.
    pub days: usize,
    /// Mean recorded total.
    pub mean_total: f64,
}

/// Outcome of dataset preparation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Data rows in the file.
    pub rows_read: usize,
    /// Rows with a positive total.
    pub rows_kept: usize,
    /// Rows dropped because their total was not positive.
    pub rows_dropped: usize,
    /// Kept rows whose total differs from the sum of the meal counts.
    pub total_mismatches: usize,
    /// Whether dates came from a date column.
    pub has_date_column: bool,
    /// Whether a day-of-month column was available.
    pub has_day_column: bool,
    /// Per-category statistics over kept rows.
    pub by_day_type: Vec<DayTypeStats>,
}

/// Cleaned records with their derived features.
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    records: Vec<CalendarRecord>,
    features: Vec<FeatureVector>,
    summary: DatasetSummary,
}

impl PreparedDataset {
    /// Kept records.
    #[must_use]
    pub fn records(&self) -> &[CalendarRecord] {
        &self.records
    }

    /// Feature vectors aligned with [`Self::records`].
    #[must_use]
    pub fn features(&self) -> &[FeatureVector] {
        &self.features
    }

    /// Preparation statistics.
    #[must_use]
    pub const fn summary(&self) -> &DatasetSummary {
        &self.summary
    }

    /// Number of kept rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no row survived filtering.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Regressor rows projected through `schema`.
    pub fn rows(&self, schema: &FeatureSchema) -> ForecastResult<Vec<Vec<f64>>> {
        self.features
            .iter()
            .map(|features| schema.project(features))
            .collect()
    }

    /// Target column for one meal.
    #[must_use]
    pub fn targets(&self, meal: Meal) -> Vec<f64> {
        self.records
            .iter()
            .map(|record| f64::from(record.count(meal)))
            .collect()
    }
}

/// Loads historical attendance exports and turns them into training data.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatasetPreparer;

impl DatasetPreparer {
    /// Reads and prepares a CSV file.
    pub fn load(&self, path: &Path) -> ForecastResult<PreparedDataset> {
        let file = File::open(path).map_err(|err| ForecastError::data_load(path, err.to_string()))?;
        self.prepare_from_reader(file, path)
    }

    /// Prepares CSV content from any reader; `origin` only labels errors.
    pub fn prepare_from_reader<R: Read>(
        &self,
        reader: R,
        origin: &Path,
    ) -> ForecastResult<PreparedDataset> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv_reader
            .headers()
            .map_err(|err| ForecastError::data_load(origin, err.to_string()))?
            .clone();
        let columns = ColumnMap::resolve(&headers)?;
        let parser = RowParser {
            origin: origin.to_path_buf(),
            columns,
        };

        let mut records = Vec::new();
        let mut features = Vec::new();
        let mut rows_read = 0;
        for (idx, row) in csv_reader.records().enumerate() {
            // header is line 1
            let line = idx + 2;
            let row = row.map_err(|err| ForecastError::data_load(origin, err.to_string()))?;
            rows_read += 1;
            if let Some(record) = parser.parse(&row, line)? {
                let vector = derive(&record.calendar_input())
                    .map_err(|err| parser.malformed(line, err.to_string()))?;
                records.push(record);
                features.push(vector);
            }
        }

        let summary = DatasetSummary {
            rows_read,
            rows_kept: records.len(),
            rows_dropped: rows_read - records.len(),
            total_mismatches: records
                .iter()
                .filter(|record| record.total != record.meal_sum())
                .count(),
            has_date_column: parser.columns.position(Column::Date).is_some(),
            has_day_column: parser.columns.position(Column::Day).is_some(),
            by_day_type: day_type_stats(&records),
        };
        Ok(PreparedDataset {
            records,
            features,
            summary,
        })
    }
}

struct RowParser {
    origin: PathBuf,
    columns: ColumnMap,
}

impl RowParser {
    /// Returns `None` for rows whose total is not positive.
    fn parse(&self, row: &csv::StringRecord, line: usize) -> ForecastResult<Option<CalendarRecord>> {
        let total = match self.cell(row, Column::Total) {
            Some("") | None => 0,
            Some(raw) => self.integer(raw, Column::Total, line)?,
        };
        if total <= 0 {
            return Ok(None);
        }

        let weekday = self.unsigned(row, Column::Weekday, line)?;
        let month = self.unsigned(row, Column::Month, line)?;
        let year = i32::try_from(self.required_integer(row, Column::Year, line)?)
            .map_err(|_| self.malformed(line, "year does not fit a calendar year"))?;
        let date = self.date(row, year, month, line)?;

        Ok(Some(CalendarRecord {
            weekday,
            date,
            holiday: self.flag(row, Column::Holiday, line)?,
            weekend: self.flag(row, Column::Weekend, line)?,
            breakfast: self.unsigned(row, Column::Breakfast, line)?,
            lunch: self.unsigned(row, Column::Lunch, line)?,
            dinner: self.unsigned(row, Column::Dinner, line)?,
            total,
        }))
    }

    fn date(
        &self,
        row: &csv::StringRecord,
        year: i32,
        month: u32,
        line: usize,
    ) -> ForecastResult<NaiveDate> {
        if let Some(raw) = self.cell(row, Column::Date).filter(|raw| !raw.is_empty()) {
            let date = DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
                .ok_or_else(|| self.malformed(line, format!("unparseable date `{raw}`")))?;
            if date.year() != year || date.month() != month {
                return Err(self.malformed(
                    line,
                    format!("date `{raw}` disagrees with month {month} / year {year}"),
                ));
            }
            return Ok(date);
        }
        let day = if self.columns.position(Column::Day).is_some() {
            self.unsigned(row, Column::Day, line)?
        } else {
            MID_MONTH_DAY
        };
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            self.malformed(
                line,
                format!("{year:04}-{month:02}-{day:02} is not a calendar date"),
            )
        })
    }

    fn cell<'r>(&self, row: &'r csv::StringRecord, column: Column) -> Option<&'r str> {
        self.columns
            .position(column)
            .and_then(|position| row.get(position))
    }

    fn required_integer(
        &self,
        row: &csv::StringRecord,
        column: Column,
        line: usize,
    ) -> ForecastResult<i64> {
        match self.cell(row, column) {
            Some(raw) if !raw.is_empty() => self.integer(raw, column, line),
            _ => Err(self.malformed(line, format!("empty `{}` cell", column.name()))),
        }
    }

    fn unsigned(&self, row: &csv::StringRecord, column: Column, line: usize) -> ForecastResult<u32> {
        let value = self.required_integer(row, column, line)?;
        u32::try_from(value).map_err(|_| {
            self.malformed(
                line,
                format!("`{}` must be a non-negative integer, got {value}", column.name()),
            )
        })
    }

    fn integer(&self, raw: &str, column: Column, line: usize) -> ForecastResult<i64> {
        if let Ok(value) = raw.parse::<i64>() {
            return Ok(value);
        }
        match raw.parse::<f64>() {
            #[allow(clippy::cast_possible_truncation)]
            Ok(value) if value.is_finite() && value.fract() == 0.0 => Ok(value as i64),
            _ => Err(self.malformed(
                line,
                format!("`{}` holds non-integer value `{raw}`", column.name()),
            )),
        }
    }

    fn flag(&self, row: &csv::StringRecord, column: Column, line: usize) -> ForecastResult<bool> {
        let raw = self.cell(row, column).unwrap_or_default().to_lowercase();
        match raw.as_str() {
            "1" | "1.0" | "true" | "yes" | "oui" => Ok(true),
            "0" | "0.0" | "false" | "no" | "non" => Ok(false),
            _ => Err(self.malformed(
                line,
                format!("`{}` flag must be 0 or 1, got `{raw}`", column.name()),
            )),
        }
    }

    fn malformed(&self, line: usize, reason: impl std::fmt::Display) -> ForecastError {
        ForecastError::data_load(&self.origin, format!("line {line}: {reason}"))
    }
}

fn day_type_stats(records: &[CalendarRecord]) -> Vec<DayTypeStats> {
    [DayType::Weekday, DayType::Weekend, DayType::Holiday]
        .into_iter()
        .filter_map(|day_type| {
            let totals: Vec<i64> = records
                .iter()
                .filter(|record| record.day_type() == day_type)
                .map(|record| record.total)
                .collect();
            if totals.is_empty() {
                return None;
            }
            #[allow(clippy::cast_precision_loss)]
            let mean_total = totals.iter().sum::<i64>() as f64 / totals.len() as f64;
            Some(DayTypeStats {
                day_type,
                days: totals.len(),
                mean_total,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prepare(csv: &str) -> ForecastResult<PreparedDataset> {
        DatasetPreparer.prepare_from_reader(Cursor::new(csv.to_string()), Path::new("fixture.csv"))
    }

    const LEGACY_EXPORT: &str = "\
 Jours de la semane ,Mois,Année,jour de Ferié,Weekend,les étudiants arrivent au Petit Déjeuner,les étudiants arrivent au Déjeuner,les étudiants arrivent au dinner,Total,Date
1,2,2025,0,0,120,300,180,600,10/02/2025
2,2,2025,0,0,110,310,170,590,11/02/2025
6,2,2025,0,1,0,0,0,0,15/02/2025
7,2,2025,0,1,20,60,40,-5,16/02/2025
3,2,2025,1,0,40,90,50,180,12/02/2025
";

    #[test]
    fn keeps_exactly_the_positive_totals() {
        let dataset = prepare(LEGACY_EXPORT).unwrap();
        let summary = dataset.summary();
        assert_eq!(summary.rows_read, 5);
        assert_eq!(summary.rows_kept, 3);
        assert_eq!(summary.rows_dropped, 2);
        assert!(dataset.records().iter().all(|record| record.total > 0));
        assert_eq!(dataset.features().len(), dataset.len());
        assert!(summary.has_date_column);
    }

    #[test]
    fn derives_features_from_the_date_column() {
        let dataset = prepare(LEGACY_EXPORT).unwrap();
        let first = dataset.features()[0];
        assert_eq!(first.day_of_year, 41);
        assert_eq!(first.week_of_year, 7);
        assert_eq!(dataset.targets(Meal::Lunch), vec![300.0, 310.0, 90.0]);
    }

    #[test]
    fn falls_back_to_mid_month_without_dates() {
        let csv = "weekday,month,year,holiday,weekend,breakfast,lunch,dinner,total\n\
                   4,3,2025,0,0,100,200,100,400\n";
        let dataset = prepare(csv).unwrap();
        assert_eq!(
            dataset.records()[0].date,
            NaiveDate::from_ymd_opt(2025, 3, MID_MONTH_DAY).unwrap()
        );
        assert!(!dataset.summary().has_date_column);
    }

    #[test]
    fn uses_day_column_when_present() {
        let csv = "weekday,day,month,year,holiday,weekend,breakfast,lunch,dinner,total\n\
                   1,10,2,2025,0,0,100,200,100,400\n";
        let dataset = prepare(csv).unwrap();
        assert_eq!(dataset.features()[0].day_of_year, 41);
    }

    #[test]
    fn enumerates_missing_columns() {
        let csv = "weekday,month,year,breakfast,lunch,dinner\n1,2,2025,1,1,1\n";
        match prepare(csv).unwrap_err() {
            ForecastError::Schema { missing } => {
                assert_eq!(missing, vec!["holiday", "weekend", "total"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_cells_abort_with_the_line_number() {
        let csv = "weekday,month,year,holiday,weekend,breakfast,lunch,dinner,total\n\
                   1,2,2025,0,0,100,abc,100,400\n";
        let err = prepare(csv).unwrap_err();
        assert!(matches!(err, ForecastError::DataLoad { .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn counts_total_mismatches_and_day_types() {
        let csv = "weekday,month,year,holiday,weekend,breakfast,lunch,dinner,total\n\
                   1,2,2025,0,0,100,200,100,400\n\
                   6,2,2025,0,1,10,20,10,50\n\
                   3,5,2025,1,0,5,5,5,15\n";
        let dataset = prepare(csv).unwrap();
        let summary = dataset.summary();
        assert_eq!(summary.total_mismatches, 1);
        assert_eq!(summary.by_day_type.len(), 3);
        assert_eq!(summary.by_day_type[0].day_type, DayType::Weekday);
        assert!((summary.by_day_type[0].mean_total - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = DatasetPreparer
            .load(Path::new("/definitely/not/here.csv"))
            .unwrap_err();
        assert!(matches!(err, ForecastError::DataLoad { .. }));
    }
}
