//! Parameters every launched child receives on its command line

use crate::argv::{self, ArgValue};
use crate::error::{CorralError, Result};
use std::path::PathBuf;

/// Bootstrap parameters: where to run, which environment, which service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapParams {
    /// Working directory of the child
    pub working_dir: PathBuf,

    /// Effective environment name (`production`, `development`, ...)
    pub environment: String,

    /// Name of the hosted service to run
    pub service: String,

    /// Pass-through arguments for the hosted service
    pub extra_args: Vec<String>,
}

impl BootstrapParams {
    /// Create parameters without pass-through arguments
    pub fn new(
        working_dir: impl Into<PathBuf>,
        environment: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            environment: environment.into(),
            service: service.into(),
            extra_args: Vec::new(),
        }
    }

    /// Append pass-through arguments
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.extra_args.extend(args);
        self
    }

    /// Command-line form: `--cwd=.. --env=.. --script=..` then pass-through args
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--cwd={}", self.working_dir.display()),
            format!("--env={}", self.environment),
            format!("--script={}", self.service),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Decode the command-line form produced by [`BootstrapParams::to_args`]
    pub fn from_args(args: &[String]) -> Result<Self> {
        let parsed = argv::parse(args);
        let value = |key: &'static str| -> Result<String> {
            parsed
                .get(key)
                .and_then(ArgValue::as_str)
                .map(str::to_string)
                .ok_or(CorralError::MissingParameter(key))
        };

        let working_dir = PathBuf::from(value("cwd")?);
        let environment = value("env")?;
        let service = value("script")?;
        let extra_args = args
            .iter()
            .filter(|arg| {
                !(arg.starts_with("--cwd=") || arg.starts_with("--env=") || arg.starts_with("--script="))
            })
            .cloned()
            .collect();

        Ok(Self {
            working_dir,
            environment,
            service,
            extra_args,
        })
    }

    /// Parsed view of the pass-through arguments
    pub fn options(&self) -> std::collections::BTreeMap<String, ArgValue> {
        argv::parse(&self.extra_args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_form() {
        let params = BootstrapParams::new("/srv/app", "production", "gateway")
            .with_args(vec!["--port=7000".to_string()]);
        assert_eq!(
            params.to_args(),
            vec!["--cwd=/srv/app", "--env=production", "--script=gateway", "--port=7000"]
        );
    }

    #[test]
    fn test_decode_keeps_pass_through_args() {
        let args: Vec<String> = ["--script=probe", "--cwd=/tmp", "--verbose", "--env=dev"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let params = BootstrapParams::from_args(&args).unwrap();
        assert_eq!(params.service, "probe");
        assert_eq!(params.environment, "dev");
        assert_eq!(params.working_dir, PathBuf::from("/tmp"));
        assert_eq!(params.extra_args, vec!["--verbose".to_string()]);
        assert_eq!(params.options().get("verbose"), Some(&ArgValue::Flag));
    }

    #[test]
    fn test_missing_script_is_reported() {
        let args = vec!["--cwd=/tmp".to_string(), "--env=dev".to_string()];
        let err = BootstrapParams::from_args(&args).unwrap_err();
        assert!(matches!(err, CorralError::MissingParameter("script")));
    }
}
