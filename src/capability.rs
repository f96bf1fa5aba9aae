//! Capability model.
//!
//! A [`Capability`] is a named operation, readable resource, or prompt
//! template exposed by a backend service and discovered at runtime. It is
//! created by the discovery client from the service's self-description and
//! never mutated afterwards; a refresh replaces a service's capabilities
//! wholesale.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// CapabilityKind / CapabilityDetail
// ---------------------------------------------------------------------------

/// The three discoverable capability kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityKind::Tool => write!(f, "tool"),
            CapabilityKind::Resource => write!(f, "resource"),
            CapabilityKind::Prompt => write!(f, "prompt"),
        }
    }
}

/// Kind-specific payload of a capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityDetail {
    /// A callable operation with a declared parameter schema.
    Tool {
        /// Raw JSON schema for the tool's input.
        input_schema: Value,
        /// Parameter names the schema marks as required.
        required_params: Vec<String>,
    },
    /// A readable resource, concrete or templated.
    Resource {
        uri: String,
        content_type: Option<String>,
        /// True when the URI is a template rather than a concrete address.
        template: bool,
    },
    /// A prompt template with named arguments.
    Prompt { argument_names: Vec<String> },
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// One discovered capability, owned by a single service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    /// Unqualified capability name as the service declared it.
    pub name: String,
    /// Human-readable description from the service's self-description.
    pub description: String,
    /// Owning service name.
    pub service: String,
    /// Kind-specific payload.
    pub detail: CapabilityDetail,
}

impl Capability {
    /// The service-scoped name, `"service.capability"`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.service, self.name)
    }

    /// Which of the three kinds this is.
    pub fn kind(&self) -> CapabilityKind {
        match self.detail {
            CapabilityDetail::Tool { .. } => CapabilityKind::Tool,
            CapabilityDetail::Resource { .. } => CapabilityKind::Resource,
            CapabilityDetail::Prompt { .. } => CapabilityKind::Prompt,
        }
    }

    /// Required parameter names for a tool; empty for other kinds.
    pub fn required_params(&self) -> &[String] {
        match &self.detail {
            CapabilityDetail::Tool {
                required_params, ..
            } => required_params,
            _ => &[],
        }
    }

    /// Parse a tool from its wire self-description.
    ///
    /// Wire shape: `{"name", "description", "inputSchema"}`. Entries
    /// without a name are skipped by returning `None`.
    pub fn tool_from_value(service: &str, value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.to_string();
        let description = description_of(value);
        let input_schema = value
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));
        let required_params = input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            name,
            description,
            service: service.to_string(),
            detail: CapabilityDetail::Tool {
                input_schema,
                required_params,
            },
        })
    }

    /// Parse a resource or resource template from its wire self-description.
    ///
    /// Concrete resources carry `"uri"`; templates carry `"uriTemplate"`.
    pub fn resource_from_value(service: &str, value: &Value, template: bool) -> Option<Self> {
        let name = value.get("name")?.as_str()?.to_string();
        let uri_key = if template { "uriTemplate" } else { "uri" };
        let uri = value.get(uri_key)?.as_str()?.to_string();
        let content_type = value
            .get("mimeType")
            .and_then(Value::as_str)
            .map(String::from);

        Some(Self {
            name,
            description: description_of(value),
            service: service.to_string(),
            detail: CapabilityDetail::Resource {
                uri,
                content_type,
                template,
            },
        })
    }

    /// Parse a prompt template from its wire self-description.
    ///
    /// Wire shape: `{"name", "description", "arguments": [{"name", ...}]}`.
    pub fn prompt_from_value(service: &str, value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.to_string();
        let argument_names = value
            .get("arguments")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|a| a.get("name").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            name,
            description: description_of(value),
            service: service.to_string(),
            detail: CapabilityDetail::Prompt { argument_names },
        })
    }
}

fn description_of(value: &Value) -> String {
    value
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// ---------------------------------------------------------------------------
// ServiceCapabilities
// ---------------------------------------------------------------------------

/// Everything one service exposes, produced atomically by a discovery pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCapabilities {
    /// Owning service name.
    pub service: String,
    pub tools: Vec<Capability>,
    /// Concrete resources and resource templates.
    pub resources: Vec<Capability>,
    pub prompts: Vec<Capability>,
    /// Discovery metadata (timestamps, partial-failure notes).
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ServiceCapabilities {
    /// Create an empty capability set for a service.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            tools: Vec::new(),
            resources: Vec::new(),
            prompts: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Iterate over every capability regardless of kind.
    pub fn all(&self) -> impl Iterator<Item = &Capability> + '_ {
        self.tools
            .iter()
            .chain(self.resources.iter())
            .chain(self.prompts.iter())
    }

    /// Total number of capabilities.
    pub fn len(&self) -> usize {
        self.tools.len() + self.resources.len() + self.prompts.len()
    }

    /// Whether the service exposed nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_from_value() {
        let wire = json!({
            "name": "get_policy",
            "description": "Fetch a policy by id",
            "inputSchema": {
                "type": "object",
                "properties": {"policy_id": {"type": "string"}},
                "required": ["policy_id"]
            }
        });
        let cap = Capability::tool_from_value("policy_service", &wire).unwrap();
        assert_eq!(cap.name, "get_policy");
        assert_eq!(cap.qualified_name(), "policy_service.get_policy");
        assert_eq!(cap.kind(), CapabilityKind::Tool);
        assert_eq!(cap.required_params(), ["policy_id"]);
    }

    #[test]
    fn test_tool_from_value_without_schema() {
        let wire = json!({"name": "ping"});
        let cap = Capability::tool_from_value("svc", &wire).unwrap();
        assert!(cap.required_params().is_empty());
        assert!(cap.description.is_empty());
    }

    #[test]
    fn test_tool_from_value_missing_name() {
        let wire = json!({"description": "nameless"});
        assert!(Capability::tool_from_value("svc", &wire).is_none());
    }

    #[test]
    fn test_resource_from_value() {
        let wire = json!({
            "name": "policy_document",
            "description": "Policy PDF",
            "uri": "policy://documents/123",
            "mimeType": "application/pdf"
        });
        let cap = Capability::resource_from_value("policy_service", &wire, false).unwrap();
        assert_eq!(cap.kind(), CapabilityKind::Resource);
        match &cap.detail {
            CapabilityDetail::Resource {
                uri,
                content_type,
                template,
            } => {
                assert_eq!(uri, "policy://documents/123");
                assert_eq!(content_type.as_deref(), Some("application/pdf"));
                assert!(!template);
            }
            other => panic!("unexpected detail: {:?}", other),
        }
    }

    #[test]
    fn test_resource_template_from_value() {
        let wire = json!({
            "name": "claim_photos",
            "uriTemplate": "claims://{claim_id}/photos"
        });
        let cap = Capability::resource_from_value("claims_service", &wire, true).unwrap();
        match &cap.detail {
            CapabilityDetail::Resource { template, .. } => assert!(template),
            other => panic!("unexpected detail: {:?}", other),
        }
    }

    #[test]
    fn test_prompt_from_value() {
        let wire = json!({
            "name": "summarize_claim",
            "description": "Summarize a claim for an adjuster",
            "arguments": [{"name": "claim_id", "required": true}, {"name": "tone"}]
        });
        let cap = Capability::prompt_from_value("claims_service", &wire).unwrap();
        assert_eq!(cap.kind(), CapabilityKind::Prompt);
        match &cap.detail {
            CapabilityDetail::Prompt { argument_names } => {
                assert_eq!(argument_names, &["claim_id", "tone"]);
            }
            other => panic!("unexpected detail: {:?}", other),
        }
    }

    #[test]
    fn test_service_capabilities_counts() {
        let mut caps = ServiceCapabilities::new("policy_service");
        assert!(caps.is_empty());

        caps.tools.push(
            Capability::tool_from_value("policy_service", &json!({"name": "get_policy"})).unwrap(),
        );
        caps.prompts.push(
            Capability::prompt_from_value("policy_service", &json!({"name": "explain"})).unwrap(),
        );

        assert_eq!(caps.len(), 2);
        assert_eq!(caps.all().count(), 2);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(CapabilityKind::Tool.to_string(), "tool");
        assert_eq!(CapabilityKind::Resource.to_string(), "resource");
        assert_eq!(CapabilityKind::Prompt.to_string(), "prompt");
    }
}
