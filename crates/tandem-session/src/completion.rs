//! Argument completion
//!
//! Applications register a [`CompletionProvider`] per `(reference, argument)`
//! pair. The resolver looks the provider up, hands it the partial value and
//! any already-resolved arguments, and normalizes the result: at most
//! [`MAX_COMPLETION_VALUES`] values, with `hasMore` consistent with `total`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use tandem_protocol::types::{ArgumentInfo, MAX_COMPLETION_VALUES};
use tandem_protocol::{CompletionContext, CompletionData, CompletionReference, Result};

/// Everything a provider gets to look at for one resolution
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    /// Prompt or resource template being completed
    pub reference: &'a CompletionReference,
    /// Argument name and the partial value typed so far
    pub argument: &'a ArgumentInfo,
    /// Arguments the peer already resolved
    pub context: Option<&'a CompletionContext>,
}

impl CompletionRequest<'_> {
    /// The partial value typed so far
    pub fn partial(&self) -> &str {
        &self.argument.value
    }

    /// An already-resolved argument, if the peer sent one
    pub fn resolved(&self, name: &str) -> Option<&str> {
        self.context?.argument(name)
    }
}

/// Supplies completion candidates for one argument
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce candidates. The resolver truncates oversized results.
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<CompletionData>;
}

/// Provider backed by a plain function
pub struct FnCompletion<F> {
    f: F,
}

impl<F> fmt::Debug for FnCompletion<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCompletion").finish_non_exhaustive()
    }
}

/// Wrap a synchronous function as a [`CompletionProvider`]
pub fn completion_fn<F>(f: F) -> FnCompletion<F>
where
    F: Fn(&CompletionRequest<'_>) -> Result<CompletionData> + Send + Sync,
{
    FnCompletion { f }
}

#[async_trait]
impl<F> CompletionProvider for FnCompletion<F>
where
    F: Fn(&CompletionRequest<'_>) -> Result<CompletionData> + Send + Sync,
{
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<CompletionData> {
        (self.f)(request)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProviderKey {
    kind: &'static str,
    id: String,
    argument: String,
}

impl ProviderKey {
    fn new(reference: &CompletionReference, argument: &str) -> Self {
        Self {
            kind: reference.kind(),
            id: reference.id().to_string(),
            argument: argument.to_string(),
        }
    }
}

/// Looks up providers and normalizes their results
#[derive(Default, Clone)]
pub struct CompletionResolver {
    providers: HashMap<ProviderKey, Arc<dyn CompletionProvider>>,
}

impl fmt::Debug for CompletionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionResolver")
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl CompletionResolver {
    /// Resolver with no providers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for `argument` of `reference`, replacing any
    /// previous provider for the same pair
    pub fn register(
        &mut self,
        reference: &CompletionReference,
        argument: &str,
        provider: Arc<dyn CompletionProvider>,
    ) {
        self.providers
            .insert(ProviderKey::new(reference, argument), provider);
    }

    /// Whether a provider exists for the pair
    pub fn has_provider(&self, reference: &CompletionReference, argument: &str) -> bool {
        self.providers
            .contains_key(&ProviderKey::new(reference, argument))
    }

    /// Resolve candidates for `argument`.
    ///
    /// A missing provider yields an empty result rather than an error.
    /// Provider errors are passed through unchanged.
    pub async fn complete(
        &self,
        reference: &CompletionReference,
        argument: &ArgumentInfo,
        context: Option<&CompletionContext>,
    ) -> Result<CompletionData> {
        let Some(provider) = self
            .providers
            .get(&ProviderKey::new(reference, &argument.name))
        else {
            debug!(
                reference = reference.id(),
                argument = %argument.name,
                "No completion provider registered"
            );
            return Ok(CompletionData::empty());
        };

        let request = CompletionRequest {
            reference,
            argument,
            context,
        };
        let data = provider.complete(&request).await?;
        Ok(normalize(data))
    }
}

/// Enforce the value cap and keep `has_more` consistent with `total`
fn normalize(mut data: CompletionData) -> CompletionData {
    let produced = data.values.len();
    if produced > MAX_COMPLETION_VALUES {
        trace!(produced, "Truncating completion values");
        data.values.truncate(MAX_COMPLETION_VALUES);
        data.has_more = true;
        if data.total.is_none() {
            data.total = u32::try_from(produced).ok();
        }
    }
    if let Some(total) = data.total {
        data.has_more = total as usize > data.values.len();
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tandem_protocol::Error;

    fn argument(name: &str, value: &str) -> ArgumentInfo {
        ArgumentInfo {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_provider_is_empty_not_error() {
        let resolver = CompletionResolver::new();
        let data = resolver
            .complete(
                &CompletionReference::prompt("greet"),
                &argument("language", "py"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(data, CompletionData::empty());
        assert!(!data.has_more);
        assert_eq!(data.total, None);
    }

    #[tokio::test]
    async fn test_filters_by_partial_and_context() {
        let mut resolver = CompletionResolver::new();
        let reference = CompletionReference::prompt("deploy");
        resolver.register(
            &reference,
            "service",
            Arc::new(completion_fn(|request| {
                let region = request.resolved("region").unwrap_or("eu");
                let values = ["api", "auth", "billing"]
                    .iter()
                    .filter(|name| name.starts_with(request.partial()))
                    .map(|name| format!("{region}-{name}"))
                    .collect();
                Ok(CompletionData::with_values(values))
            })),
        );

        let context = CompletionContext {
            arguments: Some(HashMap::from([("region".to_string(), "us".to_string())])),
        };
        let data = resolver
            .complete(&reference, &argument("service", "a"), Some(&context))
            .await
            .unwrap();
        assert_eq!(data.values, vec!["us-api", "us-auth"]);
        assert_eq!(context.argument("region"), Some("us"));
    }

    #[tokio::test]
    async fn test_truncates_to_cap() {
        let mut resolver = CompletionResolver::new();
        let reference = CompletionReference::resource("file:///{path}");
        resolver.register(
            &reference,
            "path",
            Arc::new(completion_fn(|_| {
                Ok(CompletionData::with_values(
                    (0..250).map(|i| format!("file-{i}")).collect(),
                ))
            })),
        );

        let data = resolver
            .complete(&reference, &argument("path", ""), None)
            .await
            .unwrap();
        assert_eq!(data.values.len(), MAX_COMPLETION_VALUES);
        assert!(data.has_more);
        assert_eq!(data.total, Some(250));
    }

    #[test]
    fn test_total_beyond_values_sets_has_more() {
        let data = normalize(CompletionData {
            values: vec!["a".into()],
            total: Some(10),
            has_more: false,
        });
        assert!(data.has_more);

        let data = normalize(CompletionData {
            values: vec!["a".into()],
            total: Some(1),
            has_more: false,
        });
        assert!(!data.has_more);
    }

    #[test]
    fn test_known_total_overrides_stale_has_more() {
        let data = normalize(CompletionData {
            values: vec!["a".into(), "b".into()],
            total: Some(2),
            has_more: true,
        });
        assert!(!data.has_more);

        let data = normalize(CompletionData {
            values: vec!["a".into()],
            total: None,
            has_more: true,
        });
        assert!(data.has_more);
    }

    #[tokio::test]
    async fn test_provider_error_passes_through() {
        let mut resolver = CompletionResolver::new();
        let reference = CompletionReference::prompt("p");
        resolver.register(
            &reference,
            "a",
            Arc::new(completion_fn(|_| Err(Error::internal("backend down")))),
        );
        assert!(resolver.has_provider(&reference, "a"));
        assert!(!resolver.has_provider(&reference, "b"));

        let err = resolver
            .complete(&reference, &argument("a", ""), None)
            .await
            .unwrap_err();
        assert_eq!(err.message, "backend down");
    }
}
