//! Named simulation scenarios.

use serde::Serialize;
use thiserror::Error;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// SIM-001: three-node Chandy-Lamport snapshot with a deterministic race
    Snapshot,

    /// SIM-002: three nodes greet each other and poll until stopped
    Greeting,

    /// SIM-003: snapshot over a bidirectional ring of arbitrary size
    Ring,
}

/// Returned when a scenario name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown scenario: {0}")]
pub struct UnknownScenario(pub String);

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![ScenarioId::Snapshot, ScenarioId::Greeting, ScenarioId::Ring]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Snapshot => "snapshot",
            ScenarioId::Greeting => "greeting",
            ScenarioId::Ring => "ring",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Snapshot => "p -> q -> r, p <-> r; m2 must be caught in transit to r",
            ScenarioId::Greeting => "p greets q and r, r greets p; every greeting arrives once",
            ScenarioId::Ring => "ring snapshot; every relay message is conserved exactly once",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "snapshot" | "chandy_lamport" | "sim-001" => Ok(ScenarioId::Snapshot),
            "greeting" | "hello" | "sim-002" => Ok(ScenarioId::Greeting),
            "ring" | "sim-003" => Ok(ScenarioId::Ring),
            _ => Err(UnknownScenario(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!("snapshot".parse(), Ok(ScenarioId::Snapshot));
        assert_eq!("SIM-002".parse(), Ok(ScenarioId::Greeting));
        assert_eq!("Ring".parse(), Ok(ScenarioId::Ring));
        assert_eq!(
            "split_brain".parse::<ScenarioId>(),
            Err(UnknownScenario("split_brain".to_string()))
        );
    }

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse(), Ok(id));
        }
    }
}
