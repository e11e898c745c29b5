//! Name to action factory table

use std::collections::BTreeMap;

use crate::actions::{
    self, command_line, ffmpeg_converter, CommandLineAction, FfmpegConverterAction,
    UnimplementedAction,
};
use crate::adapters::toml_config::TomlConfig;
use crate::error::{BfpuError, BfpuResult};
use crate::ports::Action;

/// Builds an action from its configuration section
pub type ActionFactory = Box<dyn Fn(&TomlConfig) -> BfpuResult<Box<dyn Action>> + Send + Sync>;

/// Actions are looked up by exact name. A factory is only called for
/// actions a session requests, so unrelated sections are never read.
#[derive(Default)]
pub struct ActionRegistry {
    factories: BTreeMap<String, ActionFactory>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_actions() -> Self {
        let mut registry = Self::new();
        registry.register(command_line::NAME, |config| {
            Ok(Box::new(CommandLineAction::from_config(config)?))
        });
        registry.register(ffmpeg_converter::NAME, |config| {
            Ok(Box::new(FfmpegConverterAction::from_config(config)?))
        });
        registry.register(actions::DEDUPLICATE_BY_SIZE, |_| {
            Ok(Box::new(UnimplementedAction::new(actions::DEDUPLICATE_BY_SIZE)))
        });
        registry.register(actions::HELP, |_| {
            Ok(Box::new(UnimplementedAction::new(actions::HELP)))
        });
        registry
    }

    /// Register or replace a factory
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&TomlConfig) -> BfpuResult<Box<dyn Action>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Fail on the first name without a factory
    pub fn ensure_registered<'a, I>(&self, names: I) -> BfpuResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            if !self.contains(name) {
                return Err(BfpuError::ActionNotFound {
                    action: name.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn resolve(&self, name: &str, config: &TomlConfig) -> BfpuResult<Box<dyn Action>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| BfpuError::ActionNotFound {
                action: name.to_string(),
            })?;
        factory(config)
    }
}
