use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::{
    LANGUAGES_DIR, MAX_MEMORY_MB, MAX_TIME_SECONDS, RUNNER_CONFIG_FILE, TESTCASES_FILE,
};
use crate::core::domain::{CommandTemplate, Limits, Manifest, RunConfig, TestCase};
use crate::core::errors::SetupError;

#[derive(Debug, Deserialize)]
struct RawRunConfig {
    solution_file: PathBuf,
    #[serde(default)]
    setup_command: Option<String>,
    #[serde(default)]
    test_command: Option<String>,
    #[serde(default)]
    single_test_command: Option<String>,
    junit_xml_glob: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    #[serde(default)]
    limits: RawLimits,
    #[serde(default)]
    tests: Vec<TestCase>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLimits {
    time_seconds: Option<u64>,
    memory_mb: Option<u64>,
}

/// A harness directory together with its parsed descriptor.
#[derive(Clone, Debug)]
pub struct Harness {
    pub dir: PathBuf,
    pub config: RunConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    pub name: String,
    pub solution_file: PathBuf,
    pub stub: Option<String>,
}

pub fn harness_dir(problems_dir: &Path, problem: &str, language: &str) -> PathBuf {
    problems_dir.join(problem).join(LANGUAGES_DIR).join(language)
}

#[tracing::instrument]
pub async fn load_harness(
    problems_dir: &Path,
    problem: &str,
    language: &str,
) -> Result<Harness, SetupError> {
    check_identifier("problem", problem)?;
    check_identifier("language", language)?;
    let dir = harness_dir(problems_dir, problem, language);
    if !is_dir(&dir).await {
        return Err(SetupError::HarnessNotFound(dir));
    }

    let config_path = dir.join(RUNNER_CONFIG_FILE);
    let text = match fs::read_to_string(&config_path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(SetupError::ConfigNotFound(dir)),
        Err(e) => return Err(e.into()),
    };
    let config = parse_run_config(&config_path, &text)?;
    tracing::debug!(?config, "Loaded harness config");

    Ok(Harness { dir, config })
}

/// A missing manifest is not an error: the run gets no test cases and default limits.
#[tracing::instrument]
pub async fn load_manifest(problems_dir: &Path, problem: &str) -> Result<Manifest, SetupError> {
    check_identifier("problem", problem)?;
    let path = problems_dir.join(problem).join(TESTCASES_FILE);
    let text = match fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("No manifest at {}, using defaults", path.display());
            return Ok(Manifest::default());
        }
        Err(e) => return Err(e.into()),
    };
    parse_manifest(&path, &text)
}

pub fn parse_run_config(path: &Path, text: &str) -> Result<RunConfig, SetupError> {
    let raw: RawRunConfig = serde_json::from_str(text).map_err(|e| SetupError::Malformed {
        path: path.to_path_buf(),
        msg: e.to_string(),
    })?;
    let invalid = |msg: String| SetupError::Invalid {
        path: path.to_path_buf(),
        msg,
    };

    if !is_contained(&raw.solution_file) {
        return Err(invalid(format!(
            "solution_file must be a relative path inside the harness: {}",
            raw.solution_file.display()
        )));
    }
    if raw.junit_xml_glob.trim().is_empty() {
        return Err(invalid("junit_xml_glob is empty".to_string()));
    }

    let setup_command = non_blank(raw.setup_command);
    let test_command = non_blank(raw.test_command);
    let single_test_command = non_blank(raw.single_test_command)
        .map(|raw| CommandTemplate::parse(&raw))
        .transpose()
        .map_err(|e| invalid(e.to_string()))?;

    if test_command.is_none() && single_test_command.is_none() {
        return Err(invalid(
            "one of test_command or single_test_command is required".to_string(),
        ));
    }
    if let Some(template) = &single_test_command {
        if !template.has_placeholder() {
            tracing::warn!(
                "single_test_command in {} has no {{test_id}} placeholder",
                path.display()
            );
        }
    }

    Ok(RunConfig {
        solution_file: raw.solution_file,
        setup_command,
        test_command,
        single_test_command,
        report_glob: raw.junit_xml_glob,
    })
}

pub fn parse_manifest(path: &Path, text: &str) -> Result<Manifest, SetupError> {
    let raw: RawManifest = serde_json::from_str(text).map_err(|e| SetupError::Malformed {
        path: path.to_path_buf(),
        msg: e.to_string(),
    })?;
    let defaults = Limits::default();
    let limits = Limits {
        time_seconds: raw.limits.time_seconds.unwrap_or(defaults.time_seconds),
        memory_mb: raw.limits.memory_mb.unwrap_or(defaults.memory_mb),
    };

    let invalid = |msg: String| SetupError::Invalid {
        path: path.to_path_buf(),
        msg,
    };
    if limits.time_seconds > MAX_TIME_SECONDS {
        return Err(invalid(format!(
            "time_seconds must be at most {}, got {}",
            MAX_TIME_SECONDS, limits.time_seconds
        )));
    }
    if limits.memory_mb > MAX_MEMORY_MB {
        return Err(invalid(format!(
            "memory_mb must be at most {}, got {}",
            MAX_MEMORY_MB, limits.memory_mb
        )));
    }

    Ok(Manifest {
        limits,
        tests: raw.tests,
    })
}

/// Lists the languages a problem ships a harness for, sorted by name.
/// Directories without a `runner.json` are skipped.
pub async fn discover_languages(
    problems_dir: &Path,
    problem: &str,
) -> Result<Vec<LanguageInfo>, SetupError> {
    check_identifier("problem", problem)?;
    let languages_dir = problems_dir.join(problem).join(LANGUAGES_DIR);
    if !is_dir(&languages_dir).await {
        return Err(SetupError::HarnessNotFound(languages_dir));
    }

    let mut languages = Vec::new();
    let mut entries = fs::read_dir(&languages_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let config_path = entry.path().join(RUNNER_CONFIG_FILE);
        let Ok(text) = fs::read_to_string(&config_path).await else {
            continue;
        };
        let config = parse_run_config(&config_path, &text)?;
        let stub = fs::read_to_string(entry.path().join(&config.solution_file))
            .await
            .ok();

        languages.push(LanguageInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            solution_file: config.solution_file,
            stub,
        });
    }
    languages.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(languages)
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

/// Problem and language names become path components; keep them to one.
fn check_identifier(kind: &'static str, value: &str) -> Result<(), SetupError> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !value.contains('/') => Ok(()),
        _ => Err(SetupError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        }),
    }
}

fn is_contained(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
