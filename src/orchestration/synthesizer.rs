//! Response synthesis.
//!
//! Turns the aggregated data map into user-facing prose. An adaptive
//! renderer can be injected; when it is absent, fails, or times out, a
//! deterministic template rendering takes over. Synthesis never fails:
//! the caller always receives displayable text with no internal error
//! detail in it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tera::Tera;

use crate::trace::TraceAccumulator;

use super::planner::{Intent, Plan};

/// Upper bound on adaptive rendering before the template fallback runs.
pub const SYNTHESIZER_TIMEOUT_SECONDS: u64 = 10;

const ANSWER_TEMPLATE: &str = r#"{{ greeting }}
{% for section in sections %}
## {{ section.title }}

{{ section.body }}
{% endfor %}{% if sections | length == 0 %}
I could not retrieve any supporting data for this request. Please try again shortly.
{% endif %}{% if urgent %}
This request was flagged as urgent and has been prioritized.
{% endif %}"#;

// ---------------------------------------------------------------------------
// AdaptiveRenderer
// ---------------------------------------------------------------------------

/// Pluggable model-backed renderer. Implementations compose a free-form
/// answer from the plan and the aggregated data.
#[async_trait]
pub trait AdaptiveRenderer: Send + Sync {
    async fn render(
        &self,
        plan: &Plan,
        data: &HashMap<String, Value>,
    ) -> Result<String, anyhow::Error>;
}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

pub struct Synthesizer {
    adaptive: Option<Arc<dyn AdaptiveRenderer>>,
    timeout: Duration,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synthesizer {
    pub fn new() -> Self {
        Self {
            adaptive: None,
            timeout: Duration::from_secs(SYNTHESIZER_TIMEOUT_SECONDS),
        }
    }

    /// Builder: attach an adaptive renderer.
    pub fn with_adaptive(mut self, renderer: Arc<dyn AdaptiveRenderer>) -> Self {
        self.adaptive = Some(renderer);
        self
    }

    /// Builder: override the adaptive rendering timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Produce the final answer text. Infallible by construction: any
    /// adaptive failure falls back to the template rendering, and any
    /// template failure falls back to plain formatting.
    pub async fn synthesize(
        &self,
        plan: &Plan,
        data: &HashMap<String, Value>,
        trace: &mut TraceAccumulator,
    ) -> String {
        if let Some(renderer) = &self.adaptive {
            match tokio::time::timeout(self.timeout, renderer.render(plan, data)).await {
                Ok(Ok(text)) if !text.trim().is_empty() => {
                    trace.event("synthesis: adaptive renderer produced the answer");
                    return text;
                }
                Ok(Ok(_)) => {
                    trace.event("synthesis: adaptive renderer returned empty text; using template");
                }
                Ok(Err(e)) => {
                    log::warn!("adaptive renderer failed: {e}");
                    trace.event("synthesis: adaptive renderer failed; using template");
                }
                Err(_) => {
                    log::warn!(
                        "adaptive renderer exceeded {}s",
                        self.timeout.as_secs()
                    );
                    trace.event("synthesis: adaptive renderer timed out; using template");
                }
            }
        } else {
            trace.event("synthesis: template rendering");
        }
        self.template_answer(plan, data)
    }

    fn template_answer(&self, plan: &Plan, data: &HashMap<String, Value>) -> String {
        let greeting = greeting_for(plan.intent);

        let mut categories: Vec<&String> = data.keys().collect();
        categories.sort();
        let sections: Vec<Value> = categories
            .into_iter()
            .map(|category| {
                serde_json::json!({
                    "title": title_case(category),
                    "body": body_text(&data[category]),
                })
            })
            .collect();

        let mut context = tera::Context::new();
        context.insert("greeting", greeting);
        context.insert("sections", &sections);
        context.insert("urgent", &plan.urgent);

        match Tera::one_off(ANSWER_TEMPLATE, &context, false) {
            Ok(rendered) => rendered.trim().to_string(),
            Err(e) => {
                log::error!("answer template failed to render: {e}");
                plain_answer(greeting, data)
            }
        }
    }
}

fn greeting_for(intent: Intent) -> &'static str {
    match intent {
        Intent::PolicyInquiry => "Here is the policy information I found.",
        Intent::ClaimInquiry => "Here is the latest on the claim.",
        Intent::BillingInquiry => "Here is the billing information I found.",
        Intent::AccountInquiry => "Here is the account information I found.",
        Intent::General => "Here is what I found for your request.",
    }
}

/// `policy-data` becomes `Policy Data`.
fn title_case(category: &str) -> String {
    category
        .split(['-', '_'])
        .filter(|t| !t.is_empty())
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strings render verbatim; anything structured is pretty-printed.
fn body_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn plain_answer(greeting: &str, data: &HashMap<String, Value>) -> String {
    let mut out = greeting.to_string();
    let mut categories: Vec<&String> = data.keys().collect();
    categories.sort();
    for category in categories {
        out.push_str(&format!(
            "\n\n{}: {}",
            title_case(category),
            body_text(&data[category])
        ));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(intent: Intent, urgent: bool) -> Plan {
        Plan {
            intent,
            confidence: 0.9,
            required_capabilities: vec!["policy-data".to_string()],
            urgent,
        }
    }

    struct FixedRenderer(String);

    #[async_trait]
    impl AdaptiveRenderer for FixedRenderer {
        async fn render(
            &self,
            _plan: &Plan,
            _data: &HashMap<String, Value>,
        ) -> Result<String, anyhow::Error> {
            Ok(self.0.clone())
        }
    }

    struct FailingRenderer;

    #[async_trait]
    impl AdaptiveRenderer for FailingRenderer {
        async fn render(
            &self,
            _plan: &Plan,
            _data: &HashMap<String, Value>,
        ) -> Result<String, anyhow::Error> {
            anyhow::bail!("model unavailable")
        }
    }

    struct HangingRenderer;

    #[async_trait]
    impl AdaptiveRenderer for HangingRenderer {
        async fn render(
            &self,
            _plan: &Plan,
            _data: &HashMap<String, Value>,
        ) -> Result<String, anyhow::Error> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_template_sections_and_greeting() {
        let mut data = HashMap::new();
        data.insert("policy-data".to_string(), json!({"number": "POL-9"}));
        data.insert(
            "account_profile".to_string(),
            Value::String("Jordan Reyes, member since 2019".to_string()),
        );

        let mut trace = TraceAccumulator::new();
        let answer = Synthesizer::new()
            .synthesize(&plan(Intent::PolicyInquiry, false), &data, &mut trace)
            .await;

        assert!(answer.starts_with("Here is the policy information I found."));
        assert!(answer.contains("## Account Profile"));
        assert!(answer.contains("Jordan Reyes, member since 2019"));
        assert!(answer.contains("## Policy Data"));
        assert!(answer.contains("POL-9"));
        assert!(!answer.contains("urgent"));
    }

    #[tokio::test]
    async fn test_empty_data_yields_apology_line() {
        let mut trace = TraceAccumulator::new();
        let answer = Synthesizer::new()
            .synthesize(&plan(Intent::General, false), &HashMap::new(), &mut trace)
            .await;
        assert!(answer.contains("could not retrieve any supporting data"));
    }

    #[tokio::test]
    async fn test_urgent_line_present() {
        let mut data = HashMap::new();
        data.insert("claim-data".to_string(), json!({"status": "open"}));
        let mut trace = TraceAccumulator::new();
        let answer = Synthesizer::new()
            .synthesize(&plan(Intent::ClaimInquiry, true), &data, &mut trace)
            .await;
        assert!(answer.contains("flagged as urgent"));
    }

    #[tokio::test]
    async fn test_adaptive_renderer_preferred() {
        let mut trace = TraceAccumulator::new();
        let answer = Synthesizer::new()
            .with_adaptive(Arc::new(FixedRenderer("Custom answer.".to_string())))
            .synthesize(&plan(Intent::General, false), &HashMap::new(), &mut trace)
            .await;
        assert_eq!(answer, "Custom answer.");
    }

    #[tokio::test]
    async fn test_adaptive_failure_falls_back() {
        let mut trace = TraceAccumulator::new();
        let answer = Synthesizer::new()
            .with_adaptive(Arc::new(FailingRenderer))
            .synthesize(&plan(Intent::General, false), &HashMap::new(), &mut trace)
            .await;
        assert!(answer.contains("could not retrieve any supporting data"));
        assert!(!answer.contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_adaptive_empty_text_falls_back() {
        let mut trace = TraceAccumulator::new();
        let answer = Synthesizer::new()
            .with_adaptive(Arc::new(FixedRenderer("   ".to_string())))
            .synthesize(&plan(Intent::BillingInquiry, false), &HashMap::new(), &mut trace)
            .await;
        assert!(answer.starts_with("Here is the billing information I found."));
    }

    #[tokio::test]
    async fn test_adaptive_timeout_falls_back() {
        let mut trace = TraceAccumulator::new();
        let answer = Synthesizer::new()
            .with_adaptive(Arc::new(HangingRenderer))
            .with_timeout(Duration::from_millis(50))
            .synthesize(&plan(Intent::AccountInquiry, false), &HashMap::new(), &mut trace)
            .await;
        assert!(answer.starts_with("Here is the account information I found."));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("policy-data"), "Policy Data");
        assert_eq!(title_case("account_profile"), "Account Profile");
    }
}
