//! Ticket templates
//!
//! Named presets of default field values, read from a JSON file the operator
//! maintains by hand. A template is chosen once per run and never mutated.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A named bag of default field values for ticket creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub work_type: Option<String>,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub summary_prefix: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stakeholder: Option<String>,
    #[serde(default)]
    pub story_points: Option<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub category_reason: Option<String>,
    #[serde(default)]
    pub request_type: Option<String>,
    #[serde(default)]
    pub task_classification: Option<String>,
}

impl Template {
    /// An empty template; every field falls through to the operator prompt
    pub fn blank() -> Self {
        Self {
            name: "blank".to_string(),
            work_type: None,
            components: Vec::new(),
            summary_prefix: None,
            description: None,
            stakeholder: None,
            story_points: None,
            risk_level: None,
            category_reason: None,
            request_type: None,
            task_classification: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TemplateFileContents {
    #[serde(default)]
    templates: Vec<Template>,
}

/// Read-only collection of templates loaded from disk
pub struct TemplateFile {
    templates: Vec<Template>,
}

impl TemplateFile {
    /// Load templates from an explicit path.
    ///
    /// A missing or broken file leaves the collection empty; the operator
    /// can still fill every field interactively.
    pub fn load(path: PathBuf) -> Self {
        let templates = if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<TemplateFileContents>(&content) {
                    Ok(contents) => {
                        info!("Loaded {} templates from {:?}", contents.templates.len(), path);
                        contents.templates
                    }
                    Err(e) => {
                        warn!("Failed to parse template file: {}", e);
                        Vec::new()
                    }
                },
                Err(e) => {
                    warn!("Failed to read template file: {}", e);
                    Vec::new()
                }
            }
        } else {
            info!("No template file at {:?}", path);
            Vec::new()
        };

        Self { templates }
    }

    /// Load from the default location in the state directory
    pub fn load_default() -> Self {
        match crate::state_dir() {
            Some(dir) => Self::load(dir.join("templates.json")),
            None => Self {
                templates: Vec::new(),
            },
        }
    }

    /// Names of all available templates, in file order
    pub fn names(&self) -> Vec<String> {
        self.templates.iter().map(|t| t.name.clone()).collect()
    }

    /// Look up a template by name
    pub fn find(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "templates": [
            {
                "name": "bugfix",
                "workType": "Bug",
                "components": ["Platform"],
                "summaryPrefix": "[PLAT]",
                "riskLevel": "Low"
            },
            {
                "name": "feature",
                "workType": "Story",
                "storyPoints": "3"
            }
        ]
    }"#;

    #[test]
    fn test_load_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let file = TemplateFile::load(path);
        assert_eq!(file.names(), ["bugfix", "feature"]);

        let bugfix = file.find("bugfix").unwrap();
        assert_eq!(bugfix.work_type.as_deref(), Some("Bug"));
        assert_eq!(bugfix.components, ["Platform"]);
        assert_eq!(bugfix.summary_prefix.as_deref(), Some("[PLAT]"));
        assert!(bugfix.story_points.is_none());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = TemplateFile::load(dir.path().join("nope.json"));
        assert!(file.is_empty());
        assert!(file.find("bugfix").is_none());
    }

    #[test]
    fn test_blank_template_has_no_defaults() {
        let t = Template::blank();
        assert!(t.work_type.is_none());
        assert!(t.components.is_empty());
    }
}
