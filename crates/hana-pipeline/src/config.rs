//! Project configuration loaded from `hana_config.json`.
//!
//! The configuration is read once at start and never mutated. Loading also
//! checks that every declared input file exists, fills in setting defaults,
//! and derives the `#` project attributes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use hana_tools::ToolLocator;
use hana_types::{HanaError, OperationPath, Result, Status};
use hana_vars::Environment;

use crate::operation::path_resolves;

pub const CONFIG_FILE: &str = "hana_config.json";

/// Default mapping quality threshold.
pub const DEFAULT_MAPQ: i64 = 40;

/// External tools whose locations are recorded in the initial status as `<tool>_path`.
pub const SEEDED_TOOLS: [&str; 3] = ["bwa", "chromap", "samtools"];

/// Entries of `files` that must name a single existing file.
const SINGLE_FILE_KEYS: [&str; 2] = ["contigs", "allele"];
/// Entries of `files` that must list existing files.
const FILE_LIST_KEYS: [&str; 3] = ["bams", "pairs", "mappings"];

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Absolute project directory. External tools run here.
    pub project_path: PathBuf,
    pub files: Map<String, Value>,
    pub settings: Map<String, Value>,
    pub attributes: Map<String, Value>,
    pub paths: ToolPaths,
    pub ops: Vec<Value>,
}

/// The `paths` section: extra search directories and explicit tool paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolPaths {
    pub dirs: Vec<PathBuf>,
    pub tools: BTreeMap<String, PathBuf>,
}

fn config_error(message: impl Into<String>) -> HanaError {
    HanaError::Config(message.into())
}

impl ProjectConfig {
    /// Read and validate `<project_dir>/hana_config.json`.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILE);
        let text = std::fs::read_to_string(&path).map_err(|e| {
            config_error(format!("cannot read {}: {e}", path.display()))
        })?;
        let raw: Value = serde_json::from_str(&text)
            .map_err(|e| config_error(format!("{} is not valid JSON: {e}", path.display())))?;
        Self::from_value(project_dir, raw)
    }

    /// Validate an already-parsed configuration for `project_dir`.
    pub fn from_value(project_dir: &Path, raw: Value) -> Result<Self> {
        let project_path = std::fs::canonicalize(project_dir).map_err(|e| {
            config_error(format!(
                "project directory {} is not accessible: {e}",
                project_dir.display()
            ))
        })?;
        let Value::Object(mut raw) = raw else {
            return Err(config_error("configuration must be a JSON object"));
        };

        let files = match raw.remove("files") {
            None => Map::new(),
            Some(Value::Object(files)) => files,
            Some(_) => return Err(config_error("'files' must be an object")),
        };
        let files = check_files(&project_path, files)?;

        let settings = match raw.remove("global") {
            None => Map::new(),
            Some(Value::Object(global)) => global,
            Some(_) => return Err(config_error("'global' must be an object")),
        };
        let settings = apply_setting_defaults(settings)?;

        let paths = match raw.remove("paths") {
            None => ToolPaths::default(),
            Some(Value::Object(paths)) => parse_tool_paths(&project_path, paths)?,
            Some(_) => return Err(config_error("'paths' must be an object")),
        };

        let ops = match raw.remove("ops") {
            None => Vec::new(),
            Some(Value::Array(ops)) => ops,
            Some(_) => return Err(config_error("'ops' must be a list of operations")),
        };

        let mut attributes = Map::new();
        attributes.insert(
            "project_path".into(),
            Value::String(project_path.display().to_string()),
        );
        let project_dir_name = project_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| project_path.display().to_string());
        attributes.insert("project_dir".into(), Value::String(project_dir_name));

        Ok(Self {
            project_path,
            files,
            settings,
            attributes,
            paths,
            ops,
        })
    }

    /// Final component of the project directory; the default output prefix.
    pub fn project_name(&self) -> &str {
        self.attributes
            .get("project_dir")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Resolve a path relative to the project directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_path.join(path)
        }
    }

    pub fn environment<'a>(&'a self, status: &'a Status) -> Environment<'a> {
        Environment {
            files: &self.files,
            settings: &self.settings,
            attributes: &self.attributes,
            status: status.as_map(),
        }
    }

    /// Layer the configured search directories and tool paths over `base`.
    pub fn tool_locator(&self, base: ToolLocator) -> ToolLocator {
        let mut locator = base.with_search_dirs(self.paths.dirs.clone());
        for (tool, path) in &self.paths.tools {
            locator = locator.with_override(tool.clone(), path.clone());
        }
        locator
    }

    /// The status a fresh run starts from: discovered tool locations.
    pub fn initial_status(&self, tools: &ToolLocator) -> Status {
        let mut status = Status::new();
        for tool in SEEDED_TOOLS {
            let found = tools
                .find(tool)
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            if found.is_empty() {
                tracing::debug!(tool, "Tool not found on search path");
            }
            status.set(format!("{tool}_path"), Value::String(found));
        }
        status
    }

    /// Whether a stored resume position fits the configured operations.
    pub fn is_resumable(&self, path: &OperationPath) -> bool {
        path_resolves(&self.ops, path)
    }
}

fn check_file(project: &Path, key: &str, value: &Value) -> Result<()> {
    let Some(file) = value.as_str() else {
        return Err(config_error(format!("files.{key} must be a path string")));
    };
    let resolved = if Path::new(file).is_absolute() {
        PathBuf::from(file)
    } else {
        project.join(file)
    };
    if !resolved.is_file() {
        return Err(config_error(format!(
            "files.{key}: file not found: {}",
            resolved.display()
        )));
    }
    Ok(())
}

fn check_file_list(project: &Path, key: &str, value: &Value) -> Result<()> {
    let Some(items) = value.as_array() else {
        return Err(config_error(format!("files.{key} must be a list of paths")));
    };
    for item in items {
        check_file(project, key, item)?;
    }
    Ok(())
}

fn check_files(project: &Path, mut files: Map<String, Value>) -> Result<Map<String, Value>> {
    for key in SINGLE_FILE_KEYS {
        if let Some(value) = files.get(key) {
            check_file(project, key, value)?;
        }
    }
    for key in FILE_LIST_KEYS {
        if let Some(value) = files.get(key) {
            check_file_list(project, key, value)?;
        }
    }
    if !files.contains_key("mappings") {
        let mut mappings = Vec::new();
        for key in ["bams", "pairs"] {
            if let Some(Value::Array(items)) = files.get(key) {
                mappings.extend(items.iter().cloned());
            }
        }
        files.insert("mappings".into(), Value::Array(mappings));
    }
    if let Some(reads) = files.get("reads") {
        let pairs = reads
            .as_array()
            .ok_or_else(|| config_error("files.reads must be a list of [forward, reverse] pairs"))?;
        for pair in pairs {
            match pair.as_array() {
                Some(ends) if ends.len() == 2 => {
                    for end in ends {
                        check_file(project, "reads", end)?;
                    }
                }
                _ => {
                    return Err(config_error(
                        "files.reads must be a list of [forward, reverse] pairs",
                    ))
                }
            }
        }
    }
    Ok(files)
}

fn apply_setting_defaults(global: Map<String, Value>) -> Result<Map<String, Value>> {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let mut settings = Map::new();
    settings.insert("threads".into(), Value::from(cpus));
    settings.insert("mapq".into(), Value::from(DEFAULT_MAPQ));
    settings.extend(global);

    match settings.get("threads") {
        Some(Value::Number(n)) if n.as_i64().is_some_and(|t| t > 0) => {}
        _ => return Err(config_error("global.threads must be a positive integer")),
    }
    Ok(settings)
}

fn parse_tool_paths(project: &Path, paths: Map<String, Value>) -> Result<ToolPaths> {
    let mut parsed = ToolPaths::default();
    for (key, value) in paths {
        if key == "dirs" {
            let dirs = value
                .as_array()
                .ok_or_else(|| config_error("paths.dirs must be a list of directories"))?;
            for dir in dirs {
                let dir = dir
                    .as_str()
                    .ok_or_else(|| config_error("paths.dirs must be a list of directories"))?;
                let resolved = project.join(dir);
                if !resolved.is_dir() {
                    tracing::warn!(dir = %resolved.display(), "Search directory does not exist");
                }
                parsed.dirs.push(resolved);
            }
        } else {
            let tool_path = value
                .as_str()
                .ok_or_else(|| config_error(format!("paths.{key} must be a path string")))?;
            parsed.tools.insert(key, project.join(tool_path));
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project_with(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for f in files {
            std::fs::write(dir.path().join(f), ">c\nACGT\n").unwrap();
        }
        dir
    }

    #[test]
    fn loads_from_disk() {
        let dir = project_with(&["c.fa"]);
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"files": {"contigs": "c.fa"}, "global": {"threads": 4}, "ops": []}"#,
        )
        .unwrap();
        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.files.get("contigs"), Some(&json!("c.fa")));
        assert_eq!(config.settings.get("threads"), Some(&json!(4)));
        assert_eq!(config.settings.get("mapq"), Some(&json!(40)));
        assert!(config.ops.is_empty());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProjectConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, HanaError::Config(_)));
    }

    #[test]
    fn attributes_describe_project_dir() {
        let dir = project_with(&[]);
        let config = ProjectConfig::from_value(dir.path(), json!({})).unwrap();
        let canonical = std::fs::canonicalize(dir.path()).unwrap();
        let name = canonical.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(config.project_name(), name);
        assert_eq!(
            config.attributes.get("project_path"),
            Some(&json!(canonical.display().to_string()))
        );
    }

    #[test]
    fn mappings_default_to_bams_then_pairs() {
        let dir = project_with(&["a.bam", "b.pairs"]);
        let config = ProjectConfig::from_value(
            dir.path(),
            json!({"files": {"bams": ["a.bam"], "pairs": ["b.pairs"]}}),
        )
        .unwrap();
        assert_eq!(
            config.files.get("mappings"),
            Some(&json!(["a.bam", "b.pairs"]))
        );

        let config = ProjectConfig::from_value(dir.path(), json!({})).unwrap();
        assert_eq!(config.files.get("mappings"), Some(&json!([])));
    }

    #[test]
    fn missing_input_file_is_rejected() {
        let dir = project_with(&[]);
        let err =
            ProjectConfig::from_value(dir.path(), json!({"files": {"contigs": "c.fa"}}))
                .unwrap_err();
        assert!(err.to_string().contains("files.contigs"));
    }

    #[test]
    fn reads_must_be_pairs() {
        let dir = project_with(&["r1.fq", "r2.fq"]);
        assert!(ProjectConfig::from_value(
            dir.path(),
            json!({"files": {"reads": [["r1.fq", "r2.fq"]]}})
        )
        .is_ok());
        assert!(ProjectConfig::from_value(
            dir.path(),
            json!({"files": {"reads": [["r1.fq"]]}})
        )
        .is_err());
    }

    #[test]
    fn threads_must_be_an_integer() {
        let dir = project_with(&[]);
        let err = ProjectConfig::from_value(dir.path(), json!({"global": {"threads": "8"}}))
            .unwrap_err();
        assert!(err.to_string().contains("global.threads"));
    }

    #[test]
    fn global_overrides_defaults_and_adds_keys() {
        let dir = project_with(&[]);
        let config = ProjectConfig::from_value(
            dir.path(),
            json!({"global": {"mapq": 10, "groups": 12}}),
        )
        .unwrap();
        assert_eq!(config.settings.get("mapq"), Some(&json!(10)));
        assert_eq!(config.settings.get("groups"), Some(&json!(12)));
        assert!(config.settings.get("threads").unwrap().as_i64().unwrap() >= 1);
    }

    #[test]
    fn tool_paths_are_resolved_against_project() {
        let dir = project_with(&[]);
        std::fs::create_dir(dir.path().join("bin")).unwrap();
        let config = ProjectConfig::from_value(
            dir.path(),
            json!({"paths": {"dirs": ["bin"], "bwa": "/opt/bwa/bwa"}}),
        )
        .unwrap();
        assert_eq!(config.paths.dirs, vec![config.project_path.join("bin")]);
        assert_eq!(
            config.paths.tools.get("bwa"),
            Some(&PathBuf::from("/opt/bwa/bwa"))
        );
    }

    #[test]
    fn initial_status_seeds_tool_paths() {
        let dir = project_with(&[]);
        let config = ProjectConfig::from_value(dir.path(), json!({})).unwrap();
        let status = config.initial_status(&ToolLocator::new());
        assert_eq!(status.get_str("bwa_path"), Some(""));
        assert_eq!(status.get_str("chromap_path"), Some(""));
        assert_eq!(status.get_str("samtools_path"), Some(""));
    }

    #[test]
    fn ops_must_be_a_list() {
        let dir = project_with(&[]);
        assert!(ProjectConfig::from_value(dir.path(), json!({"ops": {}})).is_err());
    }
}
