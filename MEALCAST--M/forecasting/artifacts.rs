use std::{
    ffi::OsString,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::{
    errors::{ForecastError, ForecastResult},
    regression::{forest::MealRegressor, reporter::TrainingReport},
    schema::{FeatureSchema, Meal},
};

/// Comma-joined feature names.
pub const SCHEMA_FILE: &str = "features_list.txt";
/// `meal,mae_test,r2_test,cv_mae` table.
pub const METRICS_FILE: &str = "metrics.csv";
/// Full JSON training report.
pub const REPORT_FILE: &str = "training_report.json";

const STAGING_PREFIX: &str = ".staging-";
const BACKUP_PREFIX: &str = ".previous-";

/// Directory of trained artifacts. The directory is owned by the trainer and
/// holds nothing but artifact files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of one meal's model.
    #[must_use]
    pub fn model_path(&self, meal: Meal) -> PathBuf {
        self.dir.join(meal.model_file_name())
    }

    /// Location of the feature schema.
    #[must_use]
    pub fn schema_path(&self) -> PathBuf {
        self.dir.join(SCHEMA_FILE)
    }

    /// Location of the metrics table.
    #[must_use]
    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(METRICS_FILE)
    }

    /// Location of the JSON report.
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.dir.join(REPORT_FILE)
    }

    /// Writes every artifact into a staging directory, then moves the files in
    /// place of the current set. On error the previous artifacts stay untouched.
    ///
    /// The directory may only hold artifacts: anything else in it makes
    /// publication fail before a single file is moved.
    pub fn publish(
        &self,
        schema: &FeatureSchema,
        models: &[MealRegressor],
        report: &TrainingReport,
    ) -> ForecastResult<()> {
        fs::create_dir_all(&self.dir).map_err(ForecastError::persist(&self.dir))?;
        let dir = fs::canonicalize(&self.dir).map_err(ForecastError::persist(&self.dir))?;
        let previous = artifact_entries(&dir)?;

        let run = Uuid::new_v4().simple().to_string();
        let staging = Self::new(dir.join(format!("{STAGING_PREFIX}{run}")));
        let backup = dir.join(format!("{BACKUP_PREFIX}{run}"));
        let result = staging
            .write_all(schema, models, report)
            .and_then(|()| swap_in(staging.dir(), &dir, &backup, &previous));
        let _ = fs::remove_dir_all(staging.dir());
        if result.is_ok() {
            let _ = fs::remove_dir_all(&backup);
        } else {
            // only succeeds when the rollback emptied it
            let _ = fs::remove_dir(&backup);
        }
        result
    }

    /// True when `path` exists and lives somewhere under this store's directory.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        match (fs::canonicalize(&self.dir), fs::canonicalize(path)) {
            (Ok(dir), Ok(path)) => path.starts_with(dir),
            _ => false,
        }
    }

    fn write_all(
        &self,
        schema: &FeatureSchema,
        models: &[MealRegressor],
        report: &TrainingReport,
    ) -> ForecastResult<()> {
        fs::create_dir_all(&self.dir).map_err(ForecastError::persist(&self.dir))?;
        for model in models {
            write_json(&self.model_path(model.meal()), model)?;
        }
        let schema_path = self.schema_path();
        fs::write(&schema_path, schema.to_line()).map_err(ForecastError::persist(&schema_path))?;
        let metrics_path = self.metrics_path();
        let metrics = report
            .metrics_csv()
            .map_err(|err| ForecastError::persist(&metrics_path)(std::io::Error::other(err)))?;
        fs::write(&metrics_path, metrics).map_err(ForecastError::persist(&metrics_path))?;
        write_json(&self.report_path(), report)
    }

    /// Loads the feature schema.
    pub fn load_schema(&self) -> ForecastResult<FeatureSchema> {
        FeatureSchema::load(&self.schema_path())
    }

    /// Loads one meal's model and checks it against `schema`.
    pub fn load_model(&self, meal: Meal, schema: &FeatureSchema) -> ForecastResult<MealRegressor> {
        let path = self.model_path(meal);
        let model: MealRegressor = read_json(&path)?;
        if model.meal() != meal {
            return Err(ForecastError::corrupt(
                &path,
                format!("file holds the {} model", model.meal()),
            ));
        }
        if model.feature_names() != schema.names() {
            return Err(ForecastError::corrupt(
                &path,
                format!(
                    "model was fitted on [{}] but the schema lists [{}]",
                    model.feature_names().join(","),
                    schema.to_line()
                ),
            ));
        }
        Ok(model)
    }

    /// Loads the JSON training report.
    pub fn load_report(&self) -> ForecastResult<TrainingReport> {
        read_json(&self.report_path())
    }

    /// Raw metrics table.
    pub fn read_metrics(&self) -> ForecastResult<String> {
        let path = self.metrics_path();
        if !path.exists() {
            return Err(ForecastError::ArtifactMissing { path });
        }
        fs::read_to_string(&path).map_err(|err| ForecastError::corrupt(&path, err))
    }
}

fn is_artifact_name(name: &str) -> bool {
    let model = name.starts_with("model_")
        && Path::new(name).extension().is_some_and(|ext| ext == "json");
    model || matches!(name, SCHEMA_FILE | METRICS_FILE | REPORT_FILE)
}

/// Artifact files currently in `dir`. Leftover staging or backup directories of
/// an interrupted run are skipped; any other entry is refused.
fn artifact_entries(dir: &Path) -> ForecastResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(ForecastError::persist(dir))? {
        let entry = entry.map_err(ForecastError::persist(dir))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_file = entry.file_type().map_err(ForecastError::persist(dir))?.is_file();
        let leftover = name.starts_with(STAGING_PREFIX) || name.starts_with(BACKUP_PREFIX);
        match (is_file, leftover) {
            (true, _) if is_artifact_name(&name) => names.push(name),
            (false, true) => {}
            _ => {
                return Err(ForecastError::Persist {
                    path: dir.join(&name),
                    source: io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        "not an artifact; the artifact directory must hold artifacts only",
                    ),
                })
            }
        }
    }
    Ok(names)
}

/// Moves the `previous` artifacts of `dir` into `backup`, then every staged file
/// into `dir`. Any failure puts the previous set back.
fn swap_in(staging: &Path, dir: &Path, backup: &Path, previous: &[String]) -> ForecastResult<()> {
    let staged = fs::read_dir(staging)
        .and_then(|entries| {
            entries
                .map(|entry| entry.map(|e| e.file_name()))
                .collect::<io::Result<Vec<_>>>()
        })
        .map_err(ForecastError::persist(staging))?;
    fs::create_dir(backup).map_err(ForecastError::persist(backup))?;

    let previous: Vec<OsString> = previous.iter().map(OsString::from).collect();
    let mut moved_out = Vec::with_capacity(previous.len());
    let mut moved_in = Vec::with_capacity(staged.len());
    let outcome = move_files(&previous, dir, backup, &mut moved_out)
        .and_then(|()| move_files(&staged, staging, dir, &mut moved_in));

    if let Err(err) = outcome {
        for name in &moved_in {
            let _ = fs::remove_file(dir.join(name));
        }
        for name in &moved_out {
            let _ = fs::rename(backup.join(name), dir.join(name));
        }
        return Err(ForecastError::persist(dir)(err));
    }
    Ok(())
}

/// Renames `names` from `from` into `to`, recording each completed move.
fn move_files(
    names: &[OsString],
    from: &Path,
    to: &Path,
    done: &mut Vec<OsString>,
) -> io::Result<()> {
    for name in names {
        fs::rename(from.join(name), to.join(name))?;
        done.push(name.clone());
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> ForecastResult<()> {
    let file = File::create(path).map_err(ForecastError::persist(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .map_err(|err| ForecastError::persist(path)(err.into()))?;
    writer.flush().map_err(ForecastError::persist(path))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> ForecastResult<T> {
    if !path.exists() {
        return Err(ForecastError::ArtifactMissing {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(|err| ForecastError::corrupt(path, err))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| ForecastError::corrupt(path, err))
}
