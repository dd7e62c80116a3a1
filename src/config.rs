use crate::models::GenerationParams;
use crate::services::discussion::FailedTurnPolicy;
use std::num::NonZeroUsize;

/// Project workspaces kept in memory before the least recently used is dropped.
const DEFAULT_MAX_PROJECTS: NonZeroUsize = match NonZeroUsize::new(256) {
    Some(limit) => limit,
    None => NonZeroUsize::MIN,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the writing-assistant API.
    pub backend_url: String,
    pub bind_addr: String,
    /// Defaults for discussion turns that do not specify their own.
    pub generation: GenerationParams,
    pub failed_turn: FailedTurnPolicy,
    pub max_projects: NonZeroUsize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = GenerationParams::default();

        let temperature = match lookup("PEREK_DEFAULT_TEMPERATURE") {
            Some(raw) => raw.trim().parse::<f32>().unwrap_or_else(|e| {
                tracing::warn!("Ignoring PEREK_DEFAULT_TEMPERATURE={raw:?}: {e}");
                defaults.temperature
            }),
            None => defaults.temperature,
        };

        let failed_turn = match lookup("PEREK_FAILED_TURN") {
            Some(raw) => FailedTurnPolicy::from_name(&raw).unwrap_or_else(|| {
                tracing::warn!("Ignoring PEREK_FAILED_TURN={raw:?}: expected `keep` or `rollback`");
                FailedTurnPolicy::KeepUnanswered
            }),
            None => FailedTurnPolicy::KeepUnanswered,
        };

        let max_projects = match lookup("PEREK_MAX_PROJECTS") {
            Some(raw) => raw.trim().parse::<NonZeroUsize>().unwrap_or_else(|e| {
                tracing::warn!("Ignoring PEREK_MAX_PROJECTS={raw:?}: {e}");
                DEFAULT_MAX_PROJECTS
            }),
            None => DEFAULT_MAX_PROJECTS,
        };

        Config {
            backend_url: lookup("PEREK_BACKEND_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            bind_addr: lookup("PEREK_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            generation: GenerationParams {
                temperature,
                persona: lookup("PEREK_DEFAULT_PERSONA").unwrap_or(defaults.persona),
            },
            failed_turn,
            max_projects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.backend_url, "http://localhost:8000");
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.generation, GenerationParams::default());
        assert_eq!(config.failed_turn, FailedTurnPolicy::KeepUnanswered);
        assert_eq!(config.max_projects.get(), 256);
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup_in(&[
            ("PEREK_BACKEND_URL", "http://backend:9000"),
            ("PEREK_DEFAULT_TEMPERATURE", "0.2"),
            ("PEREK_DEFAULT_PERSONA", "critic"),
            ("PEREK_FAILED_TURN", "Rollback"),
            ("PEREK_MAX_PROJECTS", "8"),
        ]));
        assert_eq!(config.backend_url, "http://backend:9000");
        assert_eq!(config.generation.temperature, 0.2);
        assert_eq!(config.generation.persona, "critic");
        assert_eq!(config.failed_turn, FailedTurnPolicy::RollBack);
        assert_eq!(config.max_projects.get(), 8);
    }

    #[test]
    fn bad_temperature_falls_back() {
        let config = Config::from_lookup(lookup_in(&[
            ("PEREK_DEFAULT_TEMPERATURE", "hot"),
            ("PEREK_FAILED_TURN", "sometimes"),
            ("PEREK_MAX_PROJECTS", "0"),
        ]));
        assert_eq!(config.generation.temperature, 0.7);
        assert_eq!(config.failed_turn, FailedTurnPolicy::KeepUnanswered);
        assert_eq!(config.max_projects.get(), 256);
    }
}
