//! Dispatcher and rule evaluation
//!
//! Picks the rule module for an observation, surfaces its descriptors,
//! decides the applicable categories and runs each category lookup against a
//! metadata store. Evaluation touches neither the cache nor the queue.

use crate::error::{EvalError, EvalResult};
use crate::query::Lookup;
use crate::rules::{Category, CategoryRule, Registry, RuleContext, RuleModule};
use crate::store::MetadataStore;
use calassoc_common::{DescriptorSet, Error, Observation, ObservationId, Result};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Ranked candidates per applicable category
pub type Associations = BTreeMap<Category, Vec<ObservationId>>;

/// Per-module overrides of the default `howmany` caps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Limits {
    overrides: BTreeMap<&'static str, BTreeMap<Category, usize>>,
}

impl Limits {
    /// Validate `[limits.<MODULE>]` tables
    ///
    /// Module names must be registered and every category must be one the
    /// module can produce.
    pub fn from_config(raw: &BTreeMap<String, BTreeMap<String, usize>>) -> Result<Self> {
        let mut overrides = BTreeMap::new();
        for (module_name, table) in raw {
            let module = Registry::module_by_name(module_name).ok_or_else(|| {
                Error::Config(format!("Unknown rule module '{}' in [limits]", module_name))
            })?;
            let mut caps = BTreeMap::new();
            for (category_name, cap) in table {
                let category: Category = category_name.parse().map_err(|_| {
                    Error::Config(format!(
                        "Unknown category '{}' in [limits.{}]",
                        category_name, module_name
                    ))
                })?;
                if !module.categories().any(|c| c == category) {
                    return Err(Error::Config(format!(
                        "{} rules do not produce '{}'",
                        module.name, category
                    )));
                }
                caps.insert(category, *cap);
            }
            overrides.insert(module.name, caps);
        }
        Ok(Self { overrides })
    }

    /// Cap for a category: override if configured, else the module default
    pub fn limit(&self, module: &RuleModule, rule: &CategoryRule, processed: bool) -> usize {
        let category = Category {
            kind: rule.kind,
            processed,
        };
        self.overrides
            .get(module.name)
            .and_then(|caps| caps.get(&category))
            .copied()
            .unwrap_or_else(|| rule.default_limit(processed))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    registry: Registry,
    limits: Limits,
}

impl Evaluator {
    pub fn new(registry: Registry, limits: Limits) -> Self {
        Self { registry, limits }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn module_for(&self, observation: &Observation) -> &'static RuleModule {
        self.registry.module_for(&observation.instrument)
    }

    /// Flat descriptor mapping the observation's module sees
    pub fn descriptors(&self, observation: &Observation) -> (&'static RuleModule, DescriptorSet) {
        let module = self.module_for(observation);
        let descriptors = DescriptorSet::surfaced(observation, module.instr_descriptors);
        (module, descriptors)
    }

    /// Applicable categories, sorted and de-duplicated
    pub fn applicable(&self, observation: &Observation) -> (&'static RuleModule, Vec<Category>) {
        let (module, descriptors) = self.descriptors(observation);
        let mut categories = module.applicable(&descriptors);
        categories.sort();
        categories.dedup();
        (module, categories)
    }

    /// Build one category lookup without executing it
    ///
    /// Guards that reject the category yield `Lookup::Empty`. `howmany`
    /// overrides the configured cap.
    pub fn lookup(
        &self,
        module: &'static RuleModule,
        reference: &DescriptorSet,
        category: Category,
        howmany: Option<usize>,
    ) -> EvalResult<Lookup> {
        let rule = module
            .rule(category.kind)
            .ok_or_else(|| EvalError::UnsupportedCategory {
                category: category.to_string(),
                module: module.name,
            })?;

        if let Some(guard) = rule
            .guards
            .iter()
            .find(|g| !g.allows(reference, category.processed))
        {
            trace!(category = %category, guard = ?guard, "Lookup guarded out");
            return Ok(Lookup::Empty);
        }

        let ctx = RuleContext {
            module: module.name,
            reference,
            processed: category.processed,
            howmany: howmany.unwrap_or_else(|| self.limits.limit(module, rule, category.processed)),
        };
        (rule.build)(&ctx)
    }

    /// Ranked candidates for one category, applicable or not
    pub async fn evaluate_category(
        &self,
        store: &dyn MetadataStore,
        observation: &Observation,
        category: Category,
        howmany: Option<usize>,
    ) -> EvalResult<Vec<ObservationId>> {
        let (module, descriptors) = self.descriptors(observation);
        match self.lookup(module, &descriptors, category, howmany)? {
            Lookup::Empty => Ok(Vec::new()),
            Lookup::Query(plan) => Ok(store.query(&plan).await?),
        }
    }

    /// Evaluate every applicable category
    ///
    /// The first failing category aborts the whole evaluation.
    pub async fn evaluate(
        &self,
        store: &dyn MetadataStore,
        observation: &Observation,
    ) -> EvalResult<Associations> {
        let (module, descriptors) = self.descriptors(observation);
        let mut categories = module.applicable(&descriptors);
        categories.sort();
        categories.dedup();

        let mut associations = Associations::new();
        for category in categories {
            let candidates = match self.lookup(module, &descriptors, category, None)? {
                Lookup::Empty => Vec::new(),
                Lookup::Query(plan) => store.query(&plan).await?,
            };
            trace!(
                observation_id = %observation.id,
                category = %category,
                found = candidates.len(),
                "Category evaluated"
            );
            associations.insert(category, candidates);
        }

        debug!(
            observation_id = %observation.id,
            module = module.name,
            categories = associations.len(),
            "Observation evaluated"
        );
        Ok(associations)
    }
}
