//! Orchestration planner.
//!
//! Turns an inbound message into an intent classification plus the
//! capability categories the request needs. The primary path delegates to
//! an adaptive (model-backed) planner behind the [`AdaptivePlanner`]
//! trait; when that call errors, times out, or returns an unusable plan,
//! a deterministic keyword classifier takes over so the pipeline always
//! has some plan. Fallback plans carry a fixed lower confidence so
//! downstream consumers can tell degraded planning apart.
//!
//! The planner emits capability *categories* (e.g. `"policy-data"`), not
//! concrete capability names; resolving a category against whatever
//! services happen to be registered is the dispatcher's job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::trace::TraceAccumulator;

/// Confidence reported by every deterministic fallback plan.
pub const FALLBACK_CONFIDENCE: f64 = 0.4;

/// Default adaptive planner timeout in seconds.
pub const PLANNER_TIMEOUT_SECONDS: u64 = 10;

// ---------------------------------------------------------------------------
// Intent / Plan
// ---------------------------------------------------------------------------

/// Coarse classification of what the caller is asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    PolicyInquiry,
    ClaimInquiry,
    BillingInquiry,
    AccountInquiry,
    General,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::PolicyInquiry => write!(f, "policy_inquiry"),
            Intent::ClaimInquiry => write!(f, "claim_inquiry"),
            Intent::BillingInquiry => write!(f, "billing_inquiry"),
            Intent::AccountInquiry => write!(f, "account_inquiry"),
            Intent::General => write!(f, "general"),
        }
    }
}

/// The planner's output: always usable, whatever path produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub intent: Intent,
    /// 0.0–1.0; fallback plans always report [`FALLBACK_CONFIDENCE`].
    pub confidence: f64,
    /// Capability categories the dispatcher must resolve.
    pub required_capabilities: Vec<String>,
    pub urgent: bool,
}

// ---------------------------------------------------------------------------
// AdaptivePlanner
// ---------------------------------------------------------------------------

/// Pluggable model-backed classifier.
#[async_trait]
pub trait AdaptivePlanner: Send + Sync {
    /// Classify a raw message into a plan.
    async fn classify(&self, message: &str) -> Result<Plan, anyhow::Error>;
}

// ---------------------------------------------------------------------------
// Keyword rules
// ---------------------------------------------------------------------------

struct KeywordRule {
    intent: Intent,
    keywords: &'static [&'static str],
    categories: &'static [&'static str],
}

static KEYWORD_RULES: Lazy<Vec<KeywordRule>> = Lazy::new(|| {
    vec![
        KeywordRule {
            intent: Intent::PolicyInquiry,
            keywords: &["policy", "coverage", "premium", "deductible", "renew"],
            categories: &["policy-data", "account-profile"],
        },
        KeywordRule {
            intent: Intent::ClaimInquiry,
            keywords: &["claim", "accident", "damage", "incident", "repair"],
            categories: &["claim-data", "account-profile"],
        },
        KeywordRule {
            intent: Intent::BillingInquiry,
            keywords: &["bill", "payment", "invoice", "charge", "refund"],
            categories: &["billing-data", "account-profile"],
        },
        KeywordRule {
            intent: Intent::AccountInquiry,
            keywords: &["account", "address", "contact", "profile", "email"],
            categories: &["account-profile"],
        },
    ]
});

const URGENT_KEYWORDS: &[&str] = &["urgent", "immediately", "asap", "emergency", "right away"];

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Intent planner with a deterministic fallback. Never fails.
pub struct Planner {
    adaptive: Option<Arc<dyn AdaptivePlanner>>,
    timeout: Duration,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner {
    /// Create a planner with only the keyword fallback.
    pub fn new() -> Self {
        Self {
            adaptive: None,
            timeout: Duration::from_secs(PLANNER_TIMEOUT_SECONDS),
        }
    }

    /// Builder: plug in an adaptive planner.
    pub fn with_adaptive(mut self, adaptive: Arc<dyn AdaptivePlanner>) -> Self {
        self.adaptive = Some(adaptive);
        self
    }

    /// Builder: set the adaptive planner timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Produce a plan for a message. Always returns a usable plan.
    pub async fn plan(&self, message: &str, trace: &mut TraceAccumulator) -> Plan {
        if let Some(adaptive) = &self.adaptive {
            match tokio::time::timeout(self.timeout, adaptive.classify(message)).await {
                Ok(Ok(plan)) if plan_is_usable(&plan) => {
                    trace.reason(format!(
                        "adaptive planner classified intent '{}' (confidence {:.2})",
                        plan.intent, plan.confidence
                    ));
                    return Plan {
                        confidence: plan.confidence.clamp(0.0, 1.0),
                        ..plan
                    };
                }
                Ok(Ok(_)) => {
                    trace.reason("adaptive planner returned an unusable plan; using keyword fallback");
                }
                Ok(Err(e)) => {
                    log::warn!("adaptive planner failed: {}", e);
                    trace.reason("adaptive planner failed; using keyword fallback");
                }
                Err(_) => {
                    log::warn!("adaptive planner timed out after {:?}", self.timeout);
                    trace.reason("adaptive planner timed out; using keyword fallback");
                }
            }
        }

        let plan = Self::fallback_plan(message);
        trace.reason(format!(
            "keyword fallback classified intent '{}' with categories {:?}",
            plan.intent, plan.required_capabilities
        ));
        plan
    }

    /// Deterministic keyword classification.
    ///
    /// The rule with the most keyword hits wins; ties go to the earlier
    /// rule. No hits at all produce a `General` plan that still asks for
    /// the caller's profile.
    pub fn fallback_plan(message: &str) -> Plan {
        let lowered = message.to_lowercase();

        let mut best: Option<(&KeywordRule, usize)> = None;
        for rule in KEYWORD_RULES.iter() {
            let hits = rule
                .keywords
                .iter()
                .filter(|k| lowered.contains(*k))
                .count();
            if hits == 0 {
                continue;
            }
            // Ties keep the earlier rule.
            if best.map(|(_, b)| hits > b).unwrap_or(true) {
                best = Some((rule, hits));
            }
        }

        let urgent = URGENT_KEYWORDS.iter().any(|k| lowered.contains(k));

        match best {
            Some((rule, _)) => Plan {
                intent: rule.intent,
                confidence: FALLBACK_CONFIDENCE,
                required_capabilities: rule.categories.iter().map(|c| c.to_string()).collect(),
                urgent,
            },
            None => Plan {
                intent: Intent::General,
                confidence: FALLBACK_CONFIDENCE,
                required_capabilities: vec!["account-profile".to_string()],
                urgent,
            },
        }
    }
}

/// A plan is usable when its confidence is a real number and it names at
/// least one category.
fn plan_is_usable(plan: &Plan) -> bool {
    plan.confidence.is_finite() && !plan.required_capabilities.is_empty()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
