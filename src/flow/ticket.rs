//! Ticket creation flow
//!
//! A fixed sequence of field-filling steps against the tracker's creation
//! dialog. Every step follows the same policy: locate the field through its
//! candidate selectors, skip with a warning when it never shows up, and pick
//! values template-first, operator-prompt second. Dropdown contents come
//! from the option cache when present, otherwise they are scraped live and
//! cached for the next run.

use std::time::Duration;

use tracing::{info, warn};

use crate::browser::{first_visible, BrowserError, BrowserSession, Candidates};
use crate::prompt;
use crate::store::OptionCacheStore;
use crate::template::Template;

/// Ticket form selectors
mod selectors {
    /// Opens the creation dialog from the dashboard
    pub const CREATE_BUTTONS: &[&str] = &[
        "[data-testid='global-create-button']",
        "#create-ticket-button",
        "button[aria-label='Create']",
    ];

    /// The creation dialog itself
    pub const FORM_DIALOGS: &[&str] = &[
        "[role='dialog'] form",
        "#ticket-create-form",
    ];

    /// Final submit inside the dialog
    pub const SUBMIT_BUTTONS: &[&str] = &[
        "[data-testid='create-submit']",
        "#ticket-create-submit",
        "[role='dialog'] button[type='submit']",
    ];

    /// Visible entries of whichever dropdown is currently open
    pub const DROPDOWN_OPTIONS: &[&str] = &[
        "[role='listbox'] [role='option']",
        ".select-menu .select-option",
        "ul.dropdown-options li",
    ];
}

/// How a field is filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    /// Plain text input
    Text,
    /// Dropdown with a fixed option list
    Choice,
    /// Dropdown accepting several selections
    MultiChoice,
}

/// One form field: cache key, log label, kind and candidate selectors
struct FieldSpec {
    key: &'static str,
    label: &'static str,
    kind: FieldKind,
    selectors: &'static [&'static str],
}

/// The creation form, in fill order. Fields missing from the current form
/// version are skipped individually.
const FIELDS: &[FieldSpec] = &[
    FieldSpec {
        key: "workType",
        label: "work type",
        kind: FieldKind::Choice,
        selectors: &[
            "#work-type-select",
            "[data-testid='work-type-field']",
        ],
    },
    FieldSpec {
        key: "summary",
        label: "summary",
        kind: FieldKind::Text,
        selectors: &["input[name='summary']", "#summary-field"],
    },
    FieldSpec {
        key: "description",
        label: "description",
        kind: FieldKind::Text,
        selectors: &[
            "textarea[name='description']",
            "#description-field",
            "[role='textbox'][aria-label='Description']",
        ],
    },
    FieldSpec {
        key: "component",
        label: "components",
        kind: FieldKind::MultiChoice,
        selectors: &[
            "#components-select",
            "[data-testid='components-field']",
        ],
    },
    FieldSpec {
        key: "categoryReason",
        label: "category reason",
        kind: FieldKind::Choice,
        selectors: &[
            "#category-reason-select",
            "[data-testid='category-reason-field']",
        ],
    },
    FieldSpec {
        key: "riskLevel",
        label: "risk level",
        kind: FieldKind::Choice,
        selectors: &[
            "#risk-level-select",
            "[data-testid='risk-level-field']",
        ],
    },
    FieldSpec {
        key: "storyPointScale",
        label: "story points",
        kind: FieldKind::Choice,
        selectors: &[
            "#story-points-select",
            "[data-testid='story-points-field']",
        ],
    },
    FieldSpec {
        key: "requestType",
        label: "request type",
        kind: FieldKind::Choice,
        selectors: &[
            "#request-type-select",
            "[data-testid='request-type-field']",
        ],
    },
    FieldSpec {
        key: "taskClassification",
        label: "task classification",
        kind: FieldKind::Choice,
        selectors: &[
            "#task-classification-select",
            "[data-testid='task-classification-field']",
        ],
    },
    FieldSpec {
        key: "stakeholder",
        label: "stakeholder",
        kind: FieldKind::Text,
        selectors: &["input[name='stakeholder']", "#stakeholder-field"],
    },
];

/// Outcome of matching a template value against a dropdown's options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChoiceDecision {
    /// The template value is in the list; no prompt needed
    Pick(usize),
    /// No template value, or it is not among the options
    NeedsPrompt,
}

/// Case-insensitive position of `wanted` among the option strings
fn find_option_index(options: &[String], wanted: &str) -> Option<usize> {
    let wanted = wanted.trim().to_lowercase();
    options
        .iter()
        .position(|option| option.trim().to_lowercase() == wanted)
}

fn decide_choice(template_value: Option<&str>, options: &[String]) -> ChoiceDecision {
    match template_value.and_then(|value| find_option_index(options, value)) {
        Some(index) => ChoiceDecision::Pick(index),
        None => ChoiceDecision::NeedsPrompt,
    }
}

/// Template default for a text field
fn template_text_value(template: &Template, key: &str) -> Option<String> {
    match key {
        "description" => template.description.clone(),
        "stakeholder" => template.stakeholder.clone(),
        _ => None,
    }
}

/// Template default for a choice field
fn template_choice_value(template: &Template, key: &str) -> Option<String> {
    match key {
        "workType" => template.work_type.clone(),
        "categoryReason" => template.category_reason.clone(),
        "riskLevel" => template.risk_level.clone(),
        "storyPointScale" => template.story_points.clone(),
        "requestType" => template.request_type.clone(),
        "taskClassification" => template.task_classification.clone(),
        _ => None,
    }
}

fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_default()
}

/// Ticket creation flow over one authenticated browser session
pub struct TicketFlow<'a> {
    session: &'a BrowserSession,
    cache: &'a mut OptionCacheStore,
    template: &'a Template,
    element_wait: Duration,
}

impl<'a> TicketFlow<'a> {
    pub fn new(
        session: &'a BrowserSession,
        cache: &'a mut OptionCacheStore,
        template: &'a Template,
        element_wait_secs: u64,
    ) -> Self {
        Self {
            session,
            cache,
            template,
            element_wait: Duration::from_secs(element_wait_secs),
        }
    }

    /// Fill the creation form and optionally submit it.
    ///
    /// Returns `true` when the ticket was actually submitted. Individual
    /// missing fields never fail the run; navigation and timeout errors end
    /// it with a screenshot artifact.
    pub async fn run(&mut self) -> Result<bool, BrowserError> {
        info!("Creating ticket with template '{}'", self.template.name);

        if let Err(e) = self.open_form().await {
            let _ = self.session.capture_screenshot("ticket-form-open-failed").await;
            return Err(e);
        }

        for spec in FIELDS {
            match self.fill_field(spec).await {
                Ok(()) => {}
                Err(
                    e @ (BrowserError::NavigationFailed(_)
                    | BrowserError::Timeout(_)
                    | BrowserError::ConnectionLost(_)),
                ) => {
                    let _ = self.session.capture_screenshot("ticket-flow-error").await;
                    return Err(e);
                }
                Err(e) => warn!("Skipping {}: {}", spec.label, e),
            }
        }

        if !prompt::confirm("Create the ticket?").unwrap_or(false) {
            info!("Ticket left unsubmitted");
            return Ok(false);
        }

        if let Err(e) = self.submit().await {
            let _ = self.session.capture_screenshot("ticket-submit-failed").await;
            return Err(e);
        }

        Ok(true)
    }

    /// Open the creation dialog from the dashboard
    async fn open_form(&self) -> Result<(), BrowserError> {
        let create = Candidates::new("create button", selectors::CREATE_BUTTONS);
        let Some(create_selector) = first_visible(self.session, create, self.element_wait).await
        else {
            return Err(BrowserError::ElementNotFound("create button".into()));
        };

        self.session.click(&create_selector).await?;

        let dialog = Candidates::new("creation dialog", selectors::FORM_DIALOGS);
        if first_visible(self.session, dialog, self.element_wait).await.is_none() {
            return Err(BrowserError::Timeout("creation dialog never appeared".into()));
        }

        Ok(())
    }

    async fn fill_field(&mut self, spec: &FieldSpec) -> Result<(), BrowserError> {
        let candidates = Candidates::new(spec.label, spec.selectors);
        let Some(selector) = first_visible(self.session, candidates, self.element_wait).await
        else {
            warn!("Field not present, skipping: {}", spec.label);
            return Ok(());
        };

        match spec.kind {
            FieldKind::Text => self.fill_text(spec, &selector).await,
            FieldKind::Choice => self.fill_choice(spec, &selector).await,
            FieldKind::MultiChoice => self.fill_multi_choice(spec, &selector).await,
        }
    }

    async fn fill_text(&self, spec: &FieldSpec, selector: &str) -> Result<(), BrowserError> {
        let value = if spec.key == "summary" {
            // The template only carries a prefix; the operator writes the rest
            let typed = prompt::prompt_line("Summary").unwrap_or(None);
            match (self.template.summary_prefix.as_deref(), typed) {
                (Some(prefix), Some(text)) => Some(format!("{} {}", prefix, text)),
                (None, Some(text)) => Some(text),
                (_, None) => None,
            }
        } else {
            match template_text_value(self.template, spec.key) {
                Some(value) => Some(value),
                None => prompt::prompt_line(spec.label).unwrap_or(None),
            }
        };

        let Some(value) = value else {
            warn!("No value for {}, skipping", spec.label);
            return Ok(());
        };

        self.session.type_text(selector, &value).await
    }

    async fn fill_choice(&mut self, spec: &FieldSpec, selector: &str) -> Result<(), BrowserError> {
        let options = self.options_for(spec, selector).await?;
        if options.is_empty() {
            warn!("No options found for {}, skipping", spec.label);
            return Ok(());
        }

        let template_value = template_choice_value(self.template, spec.key);
        let index = match decide_choice(template_value.as_deref(), &options) {
            ChoiceDecision::Pick(index) => {
                info!("Template sets {} = {}", spec.label, options[index]);
                Some(index)
            }
            ChoiceDecision::NeedsPrompt => {
                if let Some(value) = template_value {
                    warn!(
                        "Template value '{}' not among {} options, asking",
                        value, spec.label
                    );
                }
                prompt::prompt_pick(spec.label, &options).unwrap_or(None)
            }
        };

        let Some(index) = index else {
            warn!("No value for {}, skipping", spec.label);
            return Ok(());
        };

        self.select_option(spec, selector, &options[index]).await
    }

    async fn fill_multi_choice(
        &mut self,
        spec: &FieldSpec,
        selector: &str,
    ) -> Result<(), BrowserError> {
        let options = self.options_for(spec, selector).await?;
        if options.is_empty() {
            warn!("No options found for {}, skipping", spec.label);
            return Ok(());
        }

        let wanted: Vec<String> = if self.template.components.is_empty() {
            match prompt::prompt_pick(spec.label, &options).unwrap_or(None) {
                Some(index) => vec![options[index].clone()],
                None => Vec::new(),
            }
        } else {
            self.template.components.clone()
        };

        if wanted.is_empty() {
            warn!("No value for {}, skipping", spec.label);
            return Ok(());
        }

        for value in &wanted {
            match find_option_index(&options, value) {
                Some(index) => {
                    self.select_option(spec, selector, &options[index]).await?;
                }
                None => warn!("'{}' is not among {} options, skipping it", value, spec.label),
            }
        }

        Ok(())
    }

    /// Cached option list for a field, scraping the live dropdown on a miss
    async fn options_for(
        &mut self,
        spec: &FieldSpec,
        selector: &str,
    ) -> Result<Vec<String>, BrowserError> {
        if let Some(cached) = self.cache.get(spec.key) {
            return Ok(cached.to_vec());
        }

        let scraped = self.scrape_options(spec, selector).await?;
        if !scraped.is_empty() {
            self.cache.put(spec.key, scraped.clone());
        }
        Ok(scraped)
    }

    /// Open the dropdown and read its visible option texts
    async fn scrape_options(
        &self,
        spec: &FieldSpec,
        selector: &str,
    ) -> Result<Vec<String>, BrowserError> {
        info!("Scraping options for {}", spec.label);

        self.session.click(selector).await?;
        tokio::time::sleep(Duration::from_millis(400)).await;

        let option_selectors: Vec<String> =
            selectors::DROPDOWN_OPTIONS.iter().map(|s| js_str(s)).collect();
        let script = format!(
            r#"
            (function() {{
                const selectors = [{}];
                for (const sel of selectors) {{
                    const options = Array.from(document.querySelectorAll(sel))
                        .filter(el => el.offsetParent !== null)
                        .map(el => el.innerText.trim())
                        .filter(text => text.length > 0);
                    if (options.length) return options;
                }}
                return [];
            }})()
            "#,
            option_selectors.join(", ")
        );

        let result = self.session.execute_js(&script).await?;
        let _ = self.session.press_key("body", "Escape").await;

        let options = result
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(options)
    }

    /// Open the dropdown and click the entry with the given text
    async fn select_option(
        &self,
        spec: &FieldSpec,
        selector: &str,
        value: &str,
    ) -> Result<(), BrowserError> {
        self.session.click(selector).await?;
        tokio::time::sleep(Duration::from_millis(400)).await;

        let option_selectors: Vec<String> =
            selectors::DROPDOWN_OPTIONS.iter().map(|s| js_str(s)).collect();
        let script = format!(
            r#"
            (function() {{
                const selectors = [{}];
                const wanted = {};
                for (const sel of selectors) {{
                    const options = Array.from(document.querySelectorAll(sel))
                        .filter(el => el.offsetParent !== null);
                    const target = options.find(el => el.innerText.trim() === wanted);
                    if (target) {{
                        target.click();
                        return true;
                    }}
                }}
                return false;
            }})()
            "#,
            option_selectors.join(", "),
            js_str(value)
        );

        let clicked = self
            .session
            .execute_js(&script)
            .await?
            .as_bool()
            .unwrap_or(false);

        if !clicked {
            let _ = self.session.press_key("body", "Escape").await;
            return Err(BrowserError::ElementNotFound(format!(
                "option '{}' for {}",
                value, spec.label
            )));
        }

        info!("Selected {} = {}", spec.label, value);
        Ok(())
    }

    async fn submit(&self) -> Result<(), BrowserError> {
        let submit = Candidates::new("submit button", selectors::SUBMIT_BUTTONS);
        let Some(submit_selector) = first_visible(self.session, submit, self.element_wait).await
        else {
            return Err(BrowserError::ElementNotFound("creation dialog submit".into()));
        };

        self.session.click(&submit_selector).await?;

        // Give the dialog a moment to close and the ticket to land
        tokio::time::sleep(Duration::from_millis(1500)).await;
        info!("Ticket submitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_option_index_is_case_insensitive() {
        let opts = options(&["Task", "Story", "Bug"]);
        assert_eq!(find_option_index(&opts, "bug"), Some(2));
        assert_eq!(find_option_index(&opts, " BUG "), Some(2));
        assert_eq!(find_option_index(&opts, "Epic"), None);
    }

    #[test]
    fn test_template_match_skips_prompt() {
        // Template {"workType":"Bug"} against options with "Bug" at index 2:
        // the flow picks index 2 without asking the operator.
        let opts = options(&["Task", "Story", "Bug"]);
        assert_eq!(decide_choice(Some("Bug"), &opts), ChoiceDecision::Pick(2));
    }

    #[test]
    fn test_missing_template_value_prompts() {
        let opts = options(&["Task", "Story", "Bug"]);
        assert_eq!(decide_choice(None, &opts), ChoiceDecision::NeedsPrompt);
        assert_eq!(
            decide_choice(Some("Incident"), &opts),
            ChoiceDecision::NeedsPrompt
        );
    }

    #[test]
    fn test_template_choice_value_mapping() {
        let mut template = Template::blank();
        template.work_type = Some("Bug".to_string());
        template.story_points = Some("5".to_string());

        assert_eq!(
            template_choice_value(&template, "workType").as_deref(),
            Some("Bug")
        );
        assert_eq!(
            template_choice_value(&template, "storyPointScale").as_deref(),
            Some("5")
        );
        assert!(template_choice_value(&template, "categoryReason").is_none());
    }

    #[test]
    fn test_fresh_scrape_populates_cache_then_template_picks() {
        // Fresh run: nothing cached for workType. The scrape lands in the
        // cache and the template value resolves against it with no prompt.
        let dir = tempfile::tempdir().unwrap();
        let mut cache = OptionCacheStore::open(dir.path().join("option_cache.json"));
        assert!(cache.get("workType").is_none());

        let scraped = options(&["Task", "Story", "Bug"]);
        cache.put("workType", scraped.clone());

        let cached = cache.get("workType").unwrap().to_vec();
        assert_eq!(decide_choice(Some("Bug"), &cached), ChoiceDecision::Pick(2));
        assert!(cached.iter().any(|o| o == "Bug"));
    }

    #[test]
    fn test_js_str_escapes_quotes() {
        assert_eq!(js_str(r#"a"b"#), r#""a\"b""#);
    }
}
