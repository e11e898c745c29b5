//! Runs an external command once per matched file

use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::adapters::toml_config::TomlConfig;
use crate::adapters::tracing_log::TracingLogAdapter;
use crate::domain::model::{MatchedFile, Setting};
use crate::engine::{CancelToken, FileRunner};
use crate::error::{BfpuError, BfpuResult};
use crate::ports::{Action, OutputLogLevel};
use crate::utils::path::PathUtils;

pub const NAME: &str = "command-line";

const SOURCE_PLACEHOLDER: &str = "%source%";
const TARGET_PLACEHOLDER: &str = "%target%";

/// How often a running child is checked for exit or cancellation
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// `[command-line]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CommandLineProperties {
    /// Command template with `%source%` and `%target%` placeholders
    pub command: Option<String>,
    /// Level for the child's combined output; `off` discards it
    pub output_log_level: OutputLogLevel,
    pub ignore_exit_code: bool,
}

#[derive(Debug)]
pub struct CommandLineAction {
    template: Vec<String>,
    output: TracingLogAdapter,
    ignore_exit_code: bool,
}

impl CommandLineAction {
    pub fn new(properties: CommandLineProperties) -> BfpuResult<Self> {
        let template: Vec<String> = properties
            .command
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if template.is_empty() {
            return Err(BfpuError::property(NAME, "command", "not specified"));
        }

        Ok(Self {
            template,
            output: TracingLogAdapter::new(properties.output_log_level),
            ignore_exit_code: properties.ignore_exit_code,
        })
    }

    pub fn from_config(config: &TomlConfig) -> BfpuResult<Self> {
        Self::new(config.section(NAME)?)
    }

    /// Program and arguments for one file. The template is split on
    /// whitespace before substitution so paths with spaces stay one argument.
    pub fn command_for(&self, source: &Path, target: &Path) -> Vec<String> {
        let source = source.to_string_lossy();
        let target = target.to_string_lossy();
        self.template
            .iter()
            .map(|token| substitute(token, &source, &target))
            .collect()
    }

    fn execute(&self, matched: &MatchedFile, cancel: &CancelToken) -> BfpuResult<()> {
        let source = PathUtils::absolute(&matched.source);
        let target = PathUtils::absolute(&matched.target);
        let arguments = self.command_for(&source, &target);
        let display = arguments.join(" ");
        let (program, rest) = arguments
            .split_first()
            .ok_or_else(|| BfpuError::property(NAME, "command", "not specified"))?;

        let started = Instant::now();
        let mut command = Command::new(program);
        command.args(rest).stdin(Stdio::null());
        if self.output.is_enabled() {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        debug!("Running {}", display);
        let mut child = command.spawn().map_err(|e| BfpuError::CommandSpawn {
            command: display.clone(),
            source: e,
        })?;

        let origin = source.display().to_string();
        let mut forwarders = Vec::new();
        if let Some(stream) = child.stdout.take() {
            forwarders.push(self.forward(&origin, stream));
        }
        if let Some(stream) = child.stderr.take() {
            forwarders.push(self.forward(&origin, stream));
        }

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if cancel.is_cancelled() => {
                    // Forwarders are left to drain on their own
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!("Killed {}", display);
                    return Err(BfpuError::Cancelled);
                }
                Ok(None) => thread::sleep(WAIT_POLL_INTERVAL),
                Err(e) => {
                    return Err(BfpuError::CommandSpawn {
                        command: display,
                        source: e,
                    })
                }
            }
        };
        for handle in forwarders {
            let _ = handle.join();
        }
        let elapsed = started.elapsed().as_millis();

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            if !self.ignore_exit_code {
                return Err(BfpuError::CommandExit {
                    command: display,
                    code,
                });
            }
            warn!("Ignoring exit code {} of {}", code, display);
        }
        info!("Command for {} took {} ms", source.display(), elapsed);
        Ok(())
    }

    /// Log every line of one child stream on its own thread
    fn forward(&self, origin: &str, stream: impl Read + Send + 'static) -> JoinHandle<()> {
        let output = self.output;
        let origin = origin.to_string();
        thread::spawn(move || {
            for line in BufReader::new(stream).lines() {
                match line {
                    Ok(line) => output.emit(&origin, &line),
                    Err(_) => break,
                }
            }
        })
    }
}

impl Action for CommandLineAction {
    fn name(&self) -> &str {
        NAME
    }

    fn run(&self, setting: &Setting) -> BfpuResult<()> {
        FileRunner::new(NAME, setting)
            .for_each_match(|matched, cancel| self.execute(matched, cancel))?;
        Ok(())
    }
}

/// Replace placeholders in one token without rescanning substituted text
fn substitute(token: &str, source: &str, target: &str) -> String {
    token
        .split(SOURCE_PLACEHOLDER)
        .map(|part| part.replace(TARGET_PLACEHOLDER, target))
        .collect::<Vec<_>>()
        .join(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(command: &str) -> CommandLineAction {
        CommandLineAction::new(CommandLineProperties {
            command: Some(command.to_string()),
            ..CommandLineProperties::default()
        })
        .unwrap()
    }

    #[test]
    fn test_missing_command_is_a_property_error() {
        let err = CommandLineAction::new(CommandLineProperties::default()).unwrap_err();
        assert!(matches!(err, BfpuError::ActionProperty { ref property, .. } if property == "command"));

        let blank = CommandLineProperties {
            command: Some("   ".to_string()),
            ..CommandLineProperties::default()
        };
        assert!(CommandLineAction::new(blank).is_err());
    }

    #[test]
    fn test_placeholders_are_substituted_per_token() {
        let action = action("convert %source% -resize 50% out=%target%");
        let arguments = action.command_for(
            Path::new("/in/my clip.png"),
            Path::new("/out/my clip.png"),
        );
        assert_eq!(
            arguments,
            vec![
                "convert",
                "/in/my clip.png",
                "-resize",
                "50%",
                "out=/out/my clip.png"
            ]
        );
    }

    #[test]
    fn test_substitution_does_not_rescan_paths() {
        assert_eq!(
            substitute("%source%:%target%", "/a/%target%", "/b"),
            "/a/%target%:/b"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_cancelled_child_is_killed() {
        let matched = MatchedFile {
            source: "/in/a.txt".into(),
            relative: "a.txt".into(),
            target: "/out/a.txt".into(),
        };
        let cancel = CancelToken::new();
        let started = Instant::now();

        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(100));
                cancel.cancel();
            });
            let err = action("sleep 5").execute(&matched, &cancel).unwrap_err();
            assert!(matches!(err, BfpuError::Cancelled));
        });
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_properties_from_config() {
        let config = TomlConfig::from_toml_str(
            r#"
            [command-line]
            command = "cp %source% %target%"
            output-log-level = "debug"
            ignore-exit-code = true
            "#,
        )
        .unwrap();
        let properties: CommandLineProperties = config.section(NAME).unwrap();
        assert_eq!(properties.output_log_level, OutputLogLevel::Debug);
        assert!(properties.ignore_exit_code);
        assert!(CommandLineAction::from_config(&config).is_ok());
    }
}
