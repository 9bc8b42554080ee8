//! Per-invocation collaborator resolution
//!
//! Each collaborator category resolves to exactly one instance through a
//! fixed precedence chain: explicit per-call override, then the agent's
//! static set, then the process-wide defaults owned by the composition root.
//! An unresolved category means the corresponding stage is skipped. Defaults
//! are ordinary values passed in at construction, never module-level state.

use super::{
    Generator, KnowledgeSource, Monitor, PolicyEvaluator, ToolExecutor, Tracer, Validator,
    ValidatorSet,
};
use std::sync::Arc;

/// One instance (or absence) per collaborator category
///
/// Used three ways: as a request's per-call overrides, as an agent's static
/// configuration, and as the composition root's process-wide defaults.
#[derive(Clone, Default)]
pub struct CollaboratorSet {
    pub validator: Option<Arc<dyn Validator>>,
    pub knowledge: Option<Arc<dyn KnowledgeSource>>,
    pub policy: Option<Arc<dyn PolicyEvaluator>>,
    pub tools: Option<Arc<dyn ToolExecutor>>,
    pub generator: Option<Arc<dyn Generator>>,
    pub tracer: Option<Arc<dyn Tracer>>,
    pub monitor: Option<Arc<dyn Monitor>>,
}

impl CollaboratorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeSource>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyEvaluator>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }
}

impl std::fmt::Debug for CollaboratorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaboratorSet")
            .field("validator", &self.validator.is_some())
            .field("knowledge", &self.knowledge.is_some())
            .field("policy", &self.policy.is_some())
            .field("tools", &self.tools.is_some())
            .field("generator", &self.generator.is_some())
            .field("tracer", &self.tracer.is_some())
            .field("monitor", &self.monitor.is_some())
            .finish()
    }
}

/// The single instance each stage will talk to for one invocation
#[derive(Clone, Default)]
pub struct ResolvedCollaborators {
    pub validator: Option<Arc<dyn Validator>>,
    pub knowledge: Option<Arc<dyn KnowledgeSource>>,
    pub policy: Option<Arc<dyn PolicyEvaluator>>,
    pub tools: Option<Arc<dyn ToolExecutor>>,
    pub generator: Option<Arc<dyn Generator>>,
    pub tracer: Option<Arc<dyn Tracer>>,
    pub monitor: Option<Arc<dyn Monitor>>,
}

fn pick<T: ?Sized>(
    request: &Option<Arc<T>>,
    agent: &Option<Arc<T>>,
    defaults: &Option<Arc<T>>,
) -> Option<Arc<T>> {
    request
        .clone()
        .or_else(|| agent.clone())
        .or_else(|| defaults.clone())
}

/// Resolve the collaborators for one invocation
///
/// Validator precedence is special: per-call validator, then the agent's
/// validator, then a per-call ad-hoc list (wrapped into a [`ValidatorSet`]
/// so it stays a single mechanism), then the default. Only one mechanism is
/// ever invoked per stage.
pub fn resolve(
    overrides: &CollaboratorSet,
    ad_hoc_validators: &[Arc<dyn Validator>],
    agent: &CollaboratorSet,
    defaults: &CollaboratorSet,
) -> ResolvedCollaborators {
    let validator = overrides
        .validator
        .clone()
        .or_else(|| agent.validator.clone())
        .or_else(|| {
            if ad_hoc_validators.is_empty() {
                None
            } else {
                Some(Arc::new(ValidatorSet::new(ad_hoc_validators.to_vec()))
                    as Arc<dyn Validator>)
            }
        })
        .or_else(|| defaults.validator.clone());

    ResolvedCollaborators {
        validator,
        knowledge: pick(&overrides.knowledge, &agent.knowledge, &defaults.knowledge),
        policy: pick(&overrides.policy, &agent.policy, &defaults.policy),
        tools: pick(&overrides.tools, &agent.tools, &defaults.tools),
        generator: pick(&overrides.generator, &agent.generator, &defaults.generator),
        tracer: pick(&overrides.tracer, &agent.tracer, &defaults.tracer),
        monitor: pick(&overrides.monitor, &agent.monitor, &defaults.monitor),
    }
}
