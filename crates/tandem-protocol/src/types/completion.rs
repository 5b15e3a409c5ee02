//! Argument autocompletion types
//!
//! This module contains the payloads of `completion/complete`, which lets a
//! peer ask for suggestions for one argument of a prompt or resource template.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hard cap on the number of values in one completion result
pub const MAX_COMPLETION_VALUES: usize = 100;

/// Argument information for completion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArgumentInfo {
    /// The name of the argument being completed
    pub name: String,
    /// The current value of the argument (may be partial)
    pub value: String,
}

/// Data for prompt reference (excluding the type field)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PromptReferenceData {
    /// The name of the prompt
    pub name: String,
    /// Human-readable title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Data for resource template reference (excluding the type field)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ResourceTemplateReferenceData {
    /// The URI or URI template of the resource
    pub uri: String,
}

/// Reference types for completion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum CompletionReference {
    /// Reference to a prompt
    #[serde(rename = "ref/prompt")]
    Prompt(PromptReferenceData),
    /// Reference to a resource template
    #[serde(rename = "ref/resource")]
    ResourceTemplate(ResourceTemplateReferenceData),
}

impl CompletionReference {
    /// Reference a prompt by name
    pub fn prompt(name: impl Into<String>) -> Self {
        Self::Prompt(PromptReferenceData {
            name: name.into(),
            title: None,
        })
    }

    /// Reference a resource template by URI
    pub fn resource(uri: impl Into<String>) -> Self {
        Self::ResourceTemplate(ResourceTemplateReferenceData { uri: uri.into() })
    }

    /// Wire discriminator (`ref/prompt` or `ref/resource`)
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Prompt(_) => "ref/prompt",
            Self::ResourceTemplate(_) => "ref/resource",
        }
    }

    /// Identifier within the kind: the prompt name or template URI
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Prompt(data) => &data.name,
            Self::ResourceTemplate(data) => &data.uri,
        }
    }
}

/// Previously-resolved arguments that narrow candidate generation
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct CompletionContext {
    /// Previously-resolved variables in a URI template or prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, String>>,
}

impl CompletionContext {
    /// Look up an already-resolved argument
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments.as_ref()?.get(name).map(String::as_str)
    }
}

/// Parameters for completion/complete request
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CompleteRequestParams {
    /// The argument's information
    pub argument: ArgumentInfo,
    /// Reference to the item being completed
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    /// Additional, optional context for completions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<CompletionContext>,
}

/// Completion values with paging hints
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompletionData {
    /// Suggested values; never more than [`MAX_COMPLETION_VALUES`]
    pub values: Vec<String>,
    /// Total number of candidates, which may exceed `values.len()`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    /// Whether more candidates exist beyond `values`
    #[serde(rename = "hasMore", default)]
    pub has_more: bool,
}

impl CompletionData {
    /// An empty result: no values, no total, nothing more
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Values with no total
    #[must_use]
    pub fn with_values(values: Vec<String>) -> Self {
        Self {
            values,
            total: None,
            has_more: false,
        }
    }
}

/// Response to a completion/complete request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompleteResult {
    /// Completion data
    pub completion: CompletionData,
}
