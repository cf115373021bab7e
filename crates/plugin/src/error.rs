//! Plugin error types

/// Failure to read a declaration table
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Invalid plugin declarations (json): {0}")]
    Json(String),

    #[error("Invalid plugin declarations (yaml): {0}")]
    Yaml(String),
}

/// A hard dependency that is absent or cannot be enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    /// Name of the missing plugin
    pub name: String,

    /// Plugins whose `dependencies` list it
    pub required_by: Vec<String>,
}

/// Plugin ordering failed because of missing or cyclic dependencies
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", self.describe())]
pub struct SequencifyError {
    /// Every missing hard dependency with its requirers
    pub missing: Vec<MissingDependency>,

    /// Every detected cycle, first member repeated at the end
    pub cycles: Vec<Vec<String>>,
}

impl SequencifyError {
    pub fn missing_names(&self) -> Vec<&str> {
        self.missing.iter().map(|m| m.name.as_str()).collect()
    }

    fn describe(&self) -> String {
        let cycles: Vec<String> = self
            .cycles
            .iter()
            .map(|cycle| format!("[{}]", cycle.join(",")))
            .collect();
        let mut message = format!(
            "Sequencify plugins has problem, missing: [{}], recursive: [{}]",
            self.missing_names().join(","),
            cycles.join(",")
        );
        for missing in &self.missing {
            message.push_str(&format!(
                "\n\t>> Plugin [{}] is disabled or missed, but is required by [{}]",
                missing.name,
                missing.required_by.join(",")
            ));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequencify_message() {
        let err = SequencifyError {
            missing: vec![MissingDependency {
                name: "a1".to_string(),
                required_by: vec!["c".to_string()],
            }],
            cycles: vec![vec!["a".into(), "b".into(), "a".into()]],
        };
        let message = err.to_string();
        assert!(message.contains("missing: [a1]"));
        assert!(message.contains("recursive: [[a,b,a]]"));
        assert!(message.contains("Plugin [a1] is disabled or missed, but is required by [c]"));
    }

    #[test]
    fn test_sequencify_error_is_std_error() {
        let err = SequencifyError {
            missing: Vec::new(),
            cycles: vec![vec!["a".into(), "a".into()]],
        };
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err.clone());
        assert_eq!(boxed.to_string(), "Sequencify plugins has problem, missing: [], recursive: [[a,a]]");
        assert_eq!(boxed.downcast_ref::<SequencifyError>(), Some(&err));
    }
}
