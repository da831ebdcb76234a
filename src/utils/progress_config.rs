// src/utils/progress_config.rs

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::env;

/// Configuration for progress tracking throughout the pipeline
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Whether to show progress bars at all
    pub enabled: bool,
    /// Whether to show the per-batch embedding bar
    pub detailed: bool,
    /// Whether to append memory usage to phase messages
    pub show_memory: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed: true,
            show_memory: true,
        }
    }
}

impl ProgressConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str, default: bool| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        Self {
            enabled: flag("PROGRESS_ENABLED", true),
            detailed: flag("PROGRESS_DETAILED", true),
            show_memory: flag("PROGRESS_SHOW_MEMORY", true),
        }
    }

    /// A MultiProgress when progress is enabled, None otherwise
    pub fn create_multi_progress(&self) -> Option<MultiProgress> {
        if self.enabled {
            Some(MultiProgress::new())
        } else {
            None
        }
    }

    /// The MultiProgress handed to the embedding stage, if any.
    pub fn detailed_multi_progress(&self, mp: &Option<MultiProgress>) -> Option<MultiProgress> {
        if self.should_show_detailed() {
            mp.clone()
        } else {
            None
        }
    }

    pub fn should_show_detailed(&self) -> bool {
        self.enabled && self.detailed
    }

    pub fn should_show_memory(&self) -> bool {
        self.enabled && self.show_memory
    }
}

/// Top-level bar that advances once per pipeline phase.
pub fn phase_progress_bar(mp: &MultiProgress, phases: u64) -> ProgressBar {
    let pb = mp.add(ProgressBar::new(phases));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ProgressConfig::default();
        assert!(config.enabled);
        assert!(config.detailed);
        assert!(config.show_memory);
    }

    #[test]
    fn test_config_from_variables() {
        let config = ProgressConfig::from_lookup(lookup(&[
            ("PROGRESS_ENABLED", "false"),
            ("PROGRESS_DETAILED", "false"),
            ("PROGRESS_SHOW_MEMORY", "false"),
        ]));
        assert!(!config.enabled);
        assert!(!config.detailed);
        assert!(!config.show_memory);
    }

    #[test]
    fn test_garbage_values_fall_back_to_defaults() {
        let config = ProgressConfig::from_lookup(lookup(&[("PROGRESS_ENABLED", "maybe")]));
        assert!(config.enabled);
    }

    #[test]
    fn test_multi_progress_creation() {
        let mut config = ProgressConfig::default();
        assert!(config.create_multi_progress().is_some());
        config.enabled = false;
        assert!(config.create_multi_progress().is_none());
    }

    #[test]
    fn test_detailed_requires_enabled() {
        let mut config = ProgressConfig::default();
        let mp = Some(MultiProgress::new());
        assert!(config.detailed_multi_progress(&mp).is_some());

        config.enabled = false;
        assert!(!config.should_show_detailed());
        assert!(!config.should_show_memory());
        assert!(config.detailed_multi_progress(&mp).is_none());
    }
}
