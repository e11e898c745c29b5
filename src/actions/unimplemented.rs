//! Placeholder actions that accept any setting and do nothing

use tracing::warn;

use crate::domain::model::Setting;
use crate::error::BfpuResult;
use crate::ports::Action;

pub struct UnimplementedAction {
    name: &'static str,
}

impl UnimplementedAction {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl Action for UnimplementedAction {
    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, _setting: &Setting) -> BfpuResult<()> {
        warn!(action = self.name, "ACTION IS NOT IMPLEMENTED YET");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SessionProperties;

    #[test]
    fn test_stub_succeeds_without_touching_files() {
        let dir = tempfile::tempdir().unwrap();
        let setting = Setting::from_properties(
            SessionProperties {
                actions: vec!["help".to_string()],
                source: Some(dir.path().to_path_buf()),
                destination: Some(dir.path().to_path_buf()),
                ..SessionProperties::default()
            },
            true,
        )
        .unwrap();

        let action = UnimplementedAction::new("help");
        assert_eq!(action.name(), "help");
        assert!(action.run(&setting).is_ok());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
