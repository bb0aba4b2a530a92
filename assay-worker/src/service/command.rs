//! Model runner command line
//!
//! Translates a job record into the argument list understood by the model
//! runner. Optional flags are only emitted when the job, or the worker
//! configuration as a fallback, provides a value.

use assay_core::domain::job::Job;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;

use crate::config::Config;

/// Fully resolved invocation of the model runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl RunnerCommand {
    /// Builds the invocation for `job`
    ///
    /// # Arguments
    /// * `job` - The job being executed
    /// * `config` - Supplies the runner location and model defaults
    /// * `progress_file` - Where the runner should write its percentage
    pub fn for_job(job: &Job, config: &Config, progress_file: &Path) -> Self {
        let mut args: Vec<OsString> = Vec::new();

        let program = match &config.interpreter {
            Some(interpreter) => {
                args.push(config.model_runner.clone().into_os_string());
                OsString::from(interpreter)
            }
            None => config.model_runner.clone().into_os_string(),
        };

        let mut flag = |name: &str, value: &OsStr| {
            args.push(OsString::from(name));
            args.push(value.to_os_string());
        };

        flag("--input", job.input_dir.as_os_str());
        flag("--output", job.output_dir.as_os_str());
        flag("--project", OsStr::new(job.project.as_deref().unwrap_or_default()));
        flag("--user", OsStr::new(job.user_id.as_deref().unwrap_or_default()));
        flag("--progress-file", progress_file.as_os_str());

        if let Some(weights) = pick(&job.weights_path, &config.default_weights) {
            flag("--weights", OsStr::new(weights));
        }
        if let Some(backbone) = pick(&job.backbone, &config.default_backbone) {
            flag("--backbone", OsStr::new(backbone));
        }
        if let Some(classes) = pick(&job.classes, &config.default_classes) {
            flag("--classes", OsStr::new(classes));
        }
        if job.is_folder_mode() {
            flag(
                "--batch-size",
                OsStr::new(&config.folder_batch_size.to_string()),
            );
        }
        if let Some(targets) = job.targets_path.as_deref().filter(|v| !v.is_empty()) {
            flag("--targets", OsStr::new(targets));
        }

        Self { program, args }
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Creates a process builder for this invocation
    pub fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for RunnerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in self.args() {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Job value if set and non-empty, otherwise the configured default
fn pick<'a>(job_value: &'a Option<String>, default: &'a Option<String>) -> Option<&'a str> {
    job_value
        .as_deref()
        .filter(|v| !v.is_empty())
        .or_else(|| default.as_deref().filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job(extra: serde_json::Value) -> Job {
        let mut record = serde_json::json!({
            "id": "j1",
            "status": "queued",
            "project": "biopsy",
            "userId": "u1",
            "inputDir": "/data/upload/u1/biopsy",
            "outputDir": "/data/results/u1/biopsy",
        });
        if let (Some(base), Some(extra)) = (record.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(record).unwrap()
    }

    fn config() -> Config {
        Config::new("w".to_string(), PathBuf::from("data/jobs"))
    }

    fn rendered(command: &RunnerCommand) -> Vec<String> {
        command
            .args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_minimal_job() {
        let command = RunnerCommand::for_job(
            &job(serde_json::json!({"mode": "single"})),
            &config(),
            Path::new("/data/results/u1/biopsy/progress.txt"),
        );

        assert_eq!(command.program(), "python3");
        assert_eq!(
            rendered(&command),
            vec![
                "scripts/model_runner.py",
                "--input",
                "/data/upload/u1/biopsy",
                "--output",
                "/data/results/u1/biopsy",
                "--project",
                "biopsy",
                "--user",
                "u1",
                "--progress-file",
                "/data/results/u1/biopsy/progress.txt",
            ]
        );
    }

    #[test]
    fn test_folder_job_with_all_options() {
        let command = RunnerCommand::for_job(
            &job(serde_json::json!({
                "mode": "folder",
                "weightsPath": "/w/model.pth",
                "backbone": "swin_t",
                "classes": "Linear Pattern,Peri-vascular Pattern",
                "targetsPath": "/data/upload/u1/biopsy/targets.csv",
            })),
            &config(),
            Path::new("p.txt"),
        );

        let args = rendered(&command);
        let tail = &args[11..];
        assert_eq!(
            tail,
            &[
                "--weights",
                "/w/model.pth",
                "--backbone",
                "swin_t",
                "--classes",
                "Linear Pattern,Peri-vascular Pattern",
                "--batch-size",
                "4",
                "--targets",
                "/data/upload/u1/biopsy/targets.csv",
            ]
        );
    }

    #[test]
    fn test_defaults_fill_missing_job_values() {
        let mut config = config();
        config.default_weights = Some("/w/default.pth".to_string());
        config.default_backbone = Some("resnet18".to_string());
        config.default_classes = Some("A,B".to_string());

        let command = RunnerCommand::for_job(
            &job(serde_json::json!({"backbone": "vit_b_16", "weightsPath": ""})),
            &config,
            Path::new("p.txt"),
        );

        let args = rendered(&command);
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("--weights") + 1], "/w/default.pth");
        assert_eq!(args[pos("--backbone") + 1], "vit_b_16");
        assert_eq!(args[pos("--classes") + 1], "A,B");
        assert!(!args.iter().any(|a| a == "--batch-size"));
        assert!(!args.iter().any(|a| a == "--targets"));
    }

    #[test]
    fn test_without_interpreter_runs_script_directly() {
        let mut config = config();
        config.interpreter = None;
        config.model_runner = PathBuf::from("/opt/runner/bin/run");

        let command = RunnerCommand::for_job(&job(serde_json::json!({})), &config, Path::new("p"));
        assert_eq!(command.program(), "/opt/runner/bin/run");
        assert_eq!(rendered(&command)[0], "--input");
        assert!(command.to_string().starts_with("/opt/runner/bin/run --input /data/upload"));
    }
}
