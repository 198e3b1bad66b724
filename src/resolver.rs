use std::{collections::HashMap, sync::Arc};

use url::form_urlencoded;

use crate::config::FallbackSettings;
use crate::intent::IntentUri;
use crate::registry::Registry;

pub const FALLBACK_STORE_BASE: &str = "http://play.google.com/store/search";
pub const FALLBACK_SEARCH_TERM: &str = "beckn";
pub const FALLBACK_CATEGORY: &str = "apps";

/// Terminal outcome of a resolution. Falling back is a normal result, not an
/// error: it means no mapping is registered for the domain/target pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    Fallback(String),
}

impl Resolution {
    pub fn uri(&self) -> &str {
        match self {
            Resolution::Resolved(uri) | Resolution::Fallback(uri) => uri,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Resolution::Resolved(_) => "resolved",
            Resolution::Fallback(_) => "fallback",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Fallback(_))
    }
}

/// Generator for the discovery-store search link offered when no mapping
/// matches. Takes no per-request input; the search term is fixed at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFallback {
    store_base: String,
    search_term: String,
    category: String,
}

impl Default for StoreFallback {
    fn default() -> Self {
        Self {
            store_base: FALLBACK_STORE_BASE.into(),
            search_term: FALLBACK_SEARCH_TERM.into(),
            category: FALLBACK_CATEGORY.into(),
        }
    }
}

impl StoreFallback {
    pub fn from_settings(settings: &FallbackSettings) -> Self {
        Self {
            store_base: settings.store_base.clone(),
            search_term: settings.search_term.clone(),
            category: settings.category.clone(),
        }
    }

    pub fn uri(&self) -> String {
        format!(
            "{}?q={}&c={}",
            self.store_base, self.search_term, self.category
        )
    }
}

/// Projects parsed intent fields through the registered mapping for a
/// domain/target pair. Pure over its immutable inputs; safe to share across
/// request handlers without locking.
#[derive(Debug, Clone)]
pub struct MappingResolver {
    registry: Arc<Registry>,
    fallback: StoreFallback,
}

impl MappingResolver {
    pub fn new(registry: Arc<Registry>, fallback: StoreFallback) -> Self {
        Self { registry, fallback }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn fallback_uri(&self) -> String {
        self.fallback.uri()
    }

    /// Resolve a domain and field map against a target application.
    ///
    /// Destination fields follow the mapping's declaration order, never the
    /// input's. A source field that is absent or empty is omitted entirely.
    /// The `?` separator is appended even when no field survives projection.
    pub fn resolve(
        &self,
        domain: &str,
        fields: &HashMap<String, String>,
        target_app: &str,
    ) -> Resolution {
        let Some(mapping) = self.registry.lookup(domain, target_app) else {
            return Resolution::Fallback(self.fallback.uri());
        };

        let mut query = form_urlencoded::Serializer::new(String::new());
        for rename in &mapping.field_map {
            match fields.get(&rename.source) {
                Some(value) if !value.is_empty() => {
                    query.append_pair(&rename.dest, value);
                }
                _ => {}
            }
        }

        Resolution::Resolved(format!("{}?{}", mapping.base_uri, query.finish()))
    }

    pub fn resolve_intent(&self, intent: &IntentUri, target_app: &str) -> Resolution {
        self.resolve(intent.domain(), intent.fields(), target_app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent;
    use crate::registry::RegistryConfig;

    const SAMPLE_REGISTRY: &str = r#"
        [[domain]]
        name = "webapi.magicpin.in/oms_partner/ondc"

        [[domain.app]]
        target = "magicpin"
        base_uri = "magicpin://ondc"

        [[domain.app.field]]
        source = "context.bpp_id"

        [[domain.app.field]]
        source = "context.domain"

        [[domain.app.field]]
        source = "message.intent.provider.id"

        [[domain.app.field]]
        source = "context.action"
    "#;

    fn sample_resolver() -> MappingResolver {
        let config: RegistryConfig = toml::from_str(SAMPLE_REGISTRY).expect("toml parses");
        let registry = Registry::from_config(config).expect("valid registry");
        MappingResolver::new(Arc::new(registry), StoreFallback::default())
    }

    #[test]
    fn resolves_registered_mapping_in_declared_order() {
        let resolver = sample_resolver();
        let intent = intent::parse(
            "beckn://webapi.magicpin.in/oms_partner/ondc?context.bpp_id=bpp1&context.domain=retail&context.action=search",
        )
        .expect("parse ok");

        let resolution = resolver.resolve_intent(&intent, "magicpin");
        assert_eq!(
            resolution,
            Resolution::Resolved(
                "magicpin://ondc?context.bpp_id=bpp1&context.domain=retail&context.action=search"
                    .into()
            )
        );
    }

    #[test]
    fn output_order_follows_mapping_not_input() {
        let resolver = sample_resolver();
        // Input order reversed relative to the mapping declaration.
        let intent = intent::parse(
            "beckn://webapi.magicpin.in/oms_partner/ondc?context.action=search&context.domain=retail&context.bpp_id=bpp1",
        )
        .expect("parse ok");

        let resolution = resolver.resolve_intent(&intent, "magicpin");
        assert_eq!(
            resolution.uri(),
            "magicpin://ondc?context.bpp_id=bpp1&context.domain=retail&context.action=search"
        );
    }

    #[test]
    fn absent_and_empty_fields_are_omitted() {
        let resolver = sample_resolver();
        let intent = intent::parse(
            "beckn://webapi.magicpin.in/oms_partner/ondc?context.bpp_id=bpp1&context.domain=",
        )
        .expect("parse ok");

        let resolution = resolver.resolve_intent(&intent, "magicpin");
        assert_eq!(resolution.uri(), "magicpin://ondc?context.bpp_id=bpp1");
    }

    #[test]
    fn empty_projection_still_appends_separator() {
        let resolver = sample_resolver();
        let intent = intent::parse("beckn://webapi.magicpin.in/oms_partner/ondc?unrelated=1")
            .expect("parse ok");

        let resolution = resolver.resolve_intent(&intent, "magicpin");
        assert_eq!(resolution.uri(), "magicpin://ondc?");
    }

    #[test]
    fn values_are_percent_encoded() {
        let resolver = sample_resolver();
        let mut fields = HashMap::new();
        fields.insert("context.domain".to_string(), "retail & grocery".to_string());

        let resolution =
            resolver.resolve("webapi.magicpin.in/oms_partner/ondc", &fields, "magicpin");
        assert_eq!(
            resolution.uri(),
            "magicpin://ondc?context.domain=retail+%26+grocery"
        );
    }

    #[test]
    fn unknown_target_falls_back_to_store_link() {
        let resolver = sample_resolver();
        let intent = intent::parse(
            "beckn://webapi.magicpin.in/oms_partner/ondc?context.bpp_id=bpp1&context.domain=retail&context.action=search",
        )
        .expect("parse ok");

        let resolution = resolver.resolve_intent(&intent, "unknown_app");
        assert_eq!(
            resolution,
            Resolution::Fallback("http://play.google.com/store/search?q=beckn&c=apps".into())
        );
    }

    #[test]
    fn unknown_domain_falls_back_to_store_link() {
        let resolver = sample_resolver();
        let fields = HashMap::new();
        let resolution = resolver.resolve("nowhere.example", &fields, "magicpin");
        assert!(resolution.is_fallback());
        assert_eq!(resolution.uri(), resolver.fallback_uri());
    }

    #[test]
    fn resolution_is_deterministic() {
        let resolver = sample_resolver();
        let intent = intent::parse(
            "beckn://webapi.magicpin.in/oms_partner/ondc?context.bpp_id=bpp1&context.action=search",
        )
        .expect("parse ok");

        let first = resolver.resolve_intent(&intent, "magicpin");
        let second = resolver.resolve_intent(&intent, "magicpin");
        assert_eq!(first, second);
    }
}
