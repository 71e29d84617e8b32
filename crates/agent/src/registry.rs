use std::sync::Arc;

use telassist_core::config::RouterConfig;
use telassist_core::{ApplicationError, Category};

use crate::handlers::{
    BillingHandler, FallbackHandler, Handler, KnowledgeHandler, NetworkHandler, ServiceHandler,
    SupportServices,
};
use crate::llm::LlmClient;

pub type SharedHandler = Arc<dyn Handler>;

/// Category paired with the handler that will answer it.
#[derive(Clone)]
pub struct RouteDecision {
    pub category: Category,
    pub handler: SharedHandler,
}

impl RouteDecision {
    pub fn handler_name(&self) -> &'static str {
        self.handler.name()
    }
}

/// Immutable category → handler mapping. Only obtainable through
/// [`HandlerRegistryBuilder::build`], which refuses to produce a registry
/// with a gap, so [`HandlerRegistry::resolve`] cannot fail.
#[derive(Clone)]
pub struct HandlerRegistry {
    billing: SharedHandler,
    network: SharedHandler,
    service: SharedHandler,
    knowledge: SharedHandler,
    fallback: SharedHandler,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// The production wiring: one concrete handler per category over the
    /// given collaborators.
    pub fn for_support(
        services: &SupportServices,
        router: &RouterConfig,
        model: Option<Arc<dyn LlmClient>>,
    ) -> Result<Self, ApplicationError> {
        let mut billing = BillingHandler::new(
            services.accounts.clone(),
            services.knowledge.clone(),
            router.passage_limit,
        );
        let mut network = NetworkHandler::new(
            services.network.clone(),
            services.knowledge.clone(),
            router.passage_limit,
        );
        let mut service = ServiceHandler::new(
            services.accounts.clone(),
            services.knowledge.clone(),
            router.passage_limit,
        );
        let mut knowledge = KnowledgeHandler::new(services.knowledge.clone(), router.passage_limit);
        let mut fallback = FallbackHandler::from_config(router);

        if let Some(model) = model {
            billing = billing.with_model(model.clone());
            network = network.with_model(model.clone());
            service = service.with_model(model.clone());
            knowledge = knowledge.with_model(model.clone());
            fallback = fallback.with_model(model);
        }

        Self::builder()
            .register(Category::Billing, billing)
            .register(Category::Network, network)
            .register(Category::Service, service)
            .register(Category::Knowledge, knowledge)
            .register(Category::Fallback, fallback)
            .build()
    }

    pub fn resolve(&self, category: Category) -> RouteDecision {
        let handler = match category {
            Category::Billing => &self.billing,
            Category::Network => &self.network,
            Category::Service => &self.service,
            Category::Knowledge => &self.knowledge,
            Category::Fallback => &self.fallback,
        };
        RouteDecision { category, handler: Arc::clone(handler) }
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    billing: Option<SharedHandler>,
    network: Option<SharedHandler>,
    service: Option<SharedHandler>,
    knowledge: Option<SharedHandler>,
    fallback: Option<SharedHandler>,
}

impl HandlerRegistryBuilder {
    pub fn register<H>(self, category: Category, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        self.register_shared(category, Arc::new(handler))
    }

    /// Registering a category twice keeps the last handler.
    pub fn register_shared(mut self, category: Category, handler: SharedHandler) -> Self {
        let slot = match category {
            Category::Billing => &mut self.billing,
            Category::Network => &mut self.network,
            Category::Service => &mut self.service,
            Category::Knowledge => &mut self.knowledge,
            Category::Fallback => &mut self.fallback,
        };
        *slot = Some(handler);
        self
    }

    pub fn build(self) -> Result<HandlerRegistry, ApplicationError> {
        match (self.billing, self.network, self.service, self.knowledge, self.fallback) {
            (Some(billing), Some(network), Some(service), Some(knowledge), Some(fallback)) => {
                Ok(HandlerRegistry { billing, network, service, knowledge, fallback })
            }
            (billing, network, service, knowledge, fallback) => {
                let present = [
                    billing.is_some(),
                    network.is_some(),
                    service.is_some(),
                    knowledge.is_some(),
                    fallback.is_some(),
                ];
                let missing = Category::ALL
                    .into_iter()
                    .zip(present)
                    .filter_map(|(category, present)| (!present).then_some(category))
                    .collect();
                Err(ApplicationError::RoutingMisconfiguration { missing })
            }
        }
    }
}
