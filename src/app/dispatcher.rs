//! Session dispatch: validate, build actions, run them in order

use std::time::Instant;
use tracing::info;

use crate::actions;
use crate::adapters::toml_config::TomlConfig;
use crate::app::registry::ActionRegistry;
use crate::domain::model::{SessionProperties, Setting};
use crate::engine::CancelToken;
use crate::error::{BfpuError, BfpuResult};
use crate::ports::Action;
use crate::utils::Utils;

pub struct Dispatcher<'a> {
    registry: &'a ActionRegistry,
    interrupt: CancelToken,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a ActionRegistry) -> Self {
        Self {
            registry,
            interrupt: CancelToken::new(),
        }
    }

    /// Token that stops the session when cancelled, typically from a signal handler
    pub fn with_interrupt(mut self, interrupt: CancelToken) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Run every requested action once, in the configured order.
    ///
    /// Names are checked and every action is constructed before the setting
    /// is built, so an unknown action or a bad action property fails before
    /// the destination is created. The first failing action stops the
    /// session and its error is returned unchanged.
    pub fn run_session(
        &self,
        config: &TomlConfig,
        properties: SessionProperties,
    ) -> BfpuResult<Setting> {
        let names: Vec<String> = properties
            .actions
            .iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        self.registry
            .ensure_registered(names.iter().map(String::as_str))?;

        let built = names
            .iter()
            .map(|name| self.registry.resolve(name, config))
            .collect::<BfpuResult<Vec<Box<dyn Action>>>>()?;

        let help_only = !names.is_empty() && names.iter().all(|name| name == actions::HELP);
        let setting =
            Setting::from_properties(properties, help_only)?.with_interrupt(self.interrupt.clone());
        info!("Setting: {}", setting);

        for action in &built {
            if self.interrupt.is_cancelled() {
                return Err(BfpuError::Interrupted {
                    action: action.name().to_string(),
                });
            }
            let started = Instant::now();
            info!("Running action \"{}\"", action.name());
            action.run(&setting)?;
            let elapsed = started.elapsed();
            info!(
                "Action \"{}\" finished in {} ({} ms)",
                action.name(),
                Utils::format_duration(elapsed),
                elapsed.as_millis()
            );
        }
        Ok(setting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl Action for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn run(&self, _setting: &Setting) -> BfpuResult<()> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(BfpuError::ActionRun {
                    action: self.name.to_string(),
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn registry(log: &Arc<Mutex<Vec<&'static str>>>) -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        for (name, fail) in [("first", false), ("broken", true), ("last", false)] {
            let log = Arc::clone(log);
            registry.register(name, move |_| {
                Ok(Box::new(Recording {
                    name,
                    log: Arc::clone(&log),
                    fail,
                }))
            });
        }
        registry
    }

    fn properties(dir: &std::path::Path, actions: &[&str]) -> SessionProperties {
        SessionProperties {
            actions: actions.iter().map(|a| a.to_string()).collect(),
            source: Some(dir.to_path_buf()),
            destination: Some(dir.join("out")),
            ..SessionProperties::default()
        }
    }

    #[test]
    fn test_actions_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&log);

        Dispatcher::new(&registry)
            .run_session(&TomlConfig::new(), properties(dir.path(), &["last", "first"]))
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["last", "first"]);
    }

    #[test]
    fn test_failing_action_stops_session() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&log);

        let err = Dispatcher::new(&registry)
            .run_session(
                &TomlConfig::new(),
                properties(dir.path(), &["first", "broken", "last"]),
            )
            .unwrap_err();
        assert!(matches!(err, BfpuError::ActionRun { ref action, .. } if action == "broken"));
        assert_eq!(*log.lock().unwrap(), vec!["first", "broken"]);
    }

    #[test]
    fn test_unknown_action_fails_before_destination_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&log);

        let err = Dispatcher::new(&registry)
            .run_session(&TomlConfig::new(), properties(dir.path(), &["first", "nope"]))
            .unwrap_err();
        assert!(matches!(err, BfpuError::ActionNotFound { ref action } if action == "nope"));
        assert!(!dir.path().join("out").exists());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_action_construction_fails_before_destination_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ActionRegistry::with_builtin_actions();

        let err = Dispatcher::new(&registry)
            .run_session(&TomlConfig::new(), properties(dir.path(), &["command-line"]))
            .unwrap_err();
        assert!(matches!(err, BfpuError::ActionProperty { ref property, .. } if property == "command"));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_interrupted_session_runs_no_further_actions() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&log);
        let interrupt = CancelToken::new();
        interrupt.cancel();

        let err = Dispatcher::new(&registry)
            .with_interrupt(interrupt)
            .run_session(&TomlConfig::new(), properties(dir.path(), &["first", "last"]))
            .unwrap_err();
        assert!(matches!(err, BfpuError::Interrupted { ref action } if action == "first"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_help_only_session_accepts_blank_source() {
        let registry = ActionRegistry::with_builtin_actions();
        let properties = SessionProperties {
            actions: vec!["help".to_string()],
            destination: Some(std::env::current_dir().unwrap()),
            ..SessionProperties::default()
        };
        assert!(Dispatcher::new(&registry)
            .run_session(&TomlConfig::new(), properties)
            .is_ok());
    }

    #[test]
    fn test_blank_source_is_error_for_real_actions() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ActionRegistry::with_builtin_actions();
        let properties = SessionProperties {
            actions: vec!["deduplicate-by-size".to_string()],
            destination: Some(dir.path().to_path_buf()),
            ..SessionProperties::default()
        };
        let err = Dispatcher::new(&registry)
            .run_session(&TomlConfig::new(), properties)
            .unwrap_err();
        assert!(matches!(err, BfpuError::Setting { ref name, .. } if name == "source"));
    }
}
