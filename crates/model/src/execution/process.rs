use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Which side of a process a driver serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessDirection {
    /// Reads from the resource.
    Source,
    /// Writes into the resource.
    Drain,
}

impl fmt::Display for ProcessDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessDirection::Source => write!(f, "source"),
            ProcessDirection::Drain => write!(f, "drain"),
        }
    }
}

/// One side of a process: the resource it targets and its flat key/value
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverScript {
    pub resource_name: String,
    #[serde(default)]
    pub configuration: BTreeMap<String, String>,
}

impl DriverScript {
    pub fn new(resource_name: &str) -> Self {
        DriverScript {
            resource_name: resource_name.to_string(),
            configuration: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.configuration.insert(key.to_string(), value.to_string());
        self
    }

    pub fn without(mut self, key: &str) -> Self {
        self.configuration.remove(key);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).map(String::as_str)
    }
}

/// A named transfer between a source and a drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessScript {
    pub name: String,
    pub source: DriverScript,
    pub drain: DriverScript,
}

impl ProcessScript {
    pub fn new(name: &str, source: DriverScript, drain: DriverScript) -> Self {
        ProcessScript {
            name: name.to_string(),
            source,
            drain,
        }
    }

    pub fn script(&self, direction: ProcessDirection) -> &DriverScript {
        match direction {
            ProcessDirection::Source => &self.source,
            ProcessDirection::Drain => &self.drain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_script_by_direction() {
        let process = ProcessScript::new(
            "load",
            DriverScript::new("jdbc").with("table", "src"),
            DriverScript::new("staging"),
        );

        assert_eq!(process.script(ProcessDirection::Source).get("table"), Some("src"));
        assert_eq!(process.script(ProcessDirection::Drain).resource_name, "staging");
        assert_eq!(ProcessDirection::Drain.to_string(), "drain");
        assert_eq!(
            DriverScript::new("r").with("k", "v").without("k"),
            DriverScript::new("r")
        );
    }
}
