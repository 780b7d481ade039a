// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Pipeline builder
//!
//! Resolves a [`PipelineSpec`] against a [`ModuleRegistry`], instantiates
//! every module, derives the execution order and checks that each required
//! input is produced by an earlier module. Any failure aborts the build
//! before a single module runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::capabilities::{InputDecl, Module};
use crate::errors::{CapflowError, CapflowResult, DependencyPhase};
use crate::pipeline::dag::{DependencyGraph, GraphNode};
use crate::pipeline::{Concurrency, ErrorPolicy, Ordering, PipelineSpec, PipelineValidator};
use crate::registry::ModuleRegistry;

/// A module instance bound to its place in a pipeline
#[derive(Clone)]
pub struct BoundModule {
    /// Instance name
    pub name: String,
    /// Registry identifier
    pub id: String,
    /// Position in the pipeline definition
    pub position: usize,
    pub module: Arc<dyn Module>,
    pub consumes: Vec<InputDecl>,
    pub produces: Vec<String>,
    /// Time limit for a single invocation
    pub timeout: Option<Duration>,
    /// Execution-order indices of modules that must finish first
    pub upstream: Vec<usize>,
}

impl BoundModule {
    pub fn consumed_keys(&self) -> Vec<String> {
        self.consumes.iter().map(|d| d.key.clone()).collect()
    }
}

impl std::fmt::Debug for BoundModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundModule")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .field("upstream", &self.upstream)
            .finish()
    }
}

/// A pipeline ready to run: modules in execution order plus run settings
pub struct BuiltPipeline {
    pub name: String,
    modules: Vec<BoundModule>,
    graph: DependencyGraph,
    ordering: Ordering,
    pub error_policy: ErrorPolicy,
    pub concurrency: Concurrency,
    pub max_parallel: Option<usize>,
}

impl BuiltPipeline {
    /// Modules in execution order
    pub fn modules(&self) -> &[BoundModule] {
        &self.modules
    }

    /// Instance names in execution order
    pub fn execution_order(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn ordering(&self) -> Ordering {
        self.ordering
    }

    /// Text listing of the execution plan
    pub fn plan(&self) -> String {
        let positions: Vec<usize> = self.modules.iter().map(|m| m.position).collect();
        self.graph.to_text(&positions)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for BuiltPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltPipeline")
            .field("name", &self.name)
            .field("modules", &self.modules)
            .field("ordering", &self.ordering)
            .field("error_policy", &self.error_policy)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

/// Builds pipelines from specifications
pub struct PipelineBuilder<'a> {
    registry: &'a ModuleRegistry,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(registry: &'a ModuleRegistry) -> Self {
        Self { registry }
    }

    /// Build a pipeline
    pub fn build(&self, spec: &PipelineSpec) -> CapflowResult<BuiltPipeline> {
        let validation = PipelineValidator::validate(spec);
        if !validation.is_valid() {
            return Err(CapflowError::InvalidPipeline {
                reason: validation.errors.join("; "),
                help: Some("Run 'capflow validate' for details".to_string()),
            });
        }

        // Resolve everything before constructing anything
        let factories = spec
            .modules
            .iter()
            .map(|entry| self.registry.resolve(&entry.id))
            .collect::<CapflowResult<Vec<_>>>()?;

        let mut instances = Vec::with_capacity(spec.modules.len());
        for (entry, factory) in spec.modules.iter().zip(&factories) {
            let module = factory(&entry.settings).map_err(|e| CapflowError::module_init(&entry.id, &e))?;

            if module.produces().is_empty() {
                return Err(CapflowError::ModuleInit {
                    id: entry.id.clone(),
                    cause: "module declares no produced keys".to_string(),
                });
            }

            tracing::debug!(
                module = %entry.name(),
                id = %entry.id,
                consumes = ?module.consumes(),
                produces = ?module.produces(),
                "module.instantiated"
            );
            instances.push(module);
        }

        let nodes = spec
            .modules
            .iter()
            .zip(&instances)
            .map(|(entry, module)| GraphNode {
                name: entry.name().to_string(),
                id: entry.id.clone(),
                consumes: module.consumes().to_vec(),
                produces: module.produces().to_vec(),
                depends_on: entry.depends_on.clone(),
            })
            .collect();
        let graph = DependencyGraph::build(nodes)?;

        let ordering = spec.resolved_ordering();
        let order: Vec<usize> = match ordering {
            Ordering::Declared => (0..spec.modules.len()).collect(),
            Ordering::Dependencies => graph.topological_order()?,
        };

        let mut available: HashSet<&str> = HashSet::new();
        let mut order_index: HashMap<&str, usize> = HashMap::new();
        let mut modules: Vec<BoundModule> = Vec::with_capacity(order.len());

        for &position in &order {
            let entry = &spec.modules[position];
            let module = &instances[position];

            for decl in module.consumes() {
                if decl.required && !available.contains(decl.key.as_str()) {
                    return Err(CapflowError::UnsatisfiedDependency {
                        module: entry.name().to_string(),
                        key: decl.key.clone(),
                        phase: DependencyPhase::Build,
                    });
                }
            }

            let mut upstream = Vec::new();
            for dep in &entry.depends_on {
                match order_index.get(dep.as_str()) {
                    Some(&index) => upstream.push(index),
                    None => {
                        return Err(CapflowError::InvalidPipeline {
                            reason: format!(
                                "Module '{}' depends on '{}', which runs after it",
                                entry.name(),
                                dep
                            ),
                            help: Some("Reorder the modules or use ordering: dependencies".into()),
                        })
                    }
                }
            }
            for (index, earlier) in modules.iter().enumerate() {
                if conflicts(earlier, module.as_ref()) {
                    upstream.push(index);
                }
            }
            upstream.sort_unstable();
            upstream.dedup();

            available.extend(module.produces().iter().map(String::as_str));
            order_index.insert(entry.name(), modules.len());

            modules.push(BoundModule {
                name: entry.name().to_string(),
                id: entry.id.clone(),
                position,
                module: Arc::clone(module),
                consumes: module.consumes().to_vec(),
                produces: module.produces().to_vec(),
                timeout: entry
                    .timeout_ms
                    .or(spec.module_timeout_ms)
                    .map(Duration::from_millis),
                upstream,
            });
        }

        tracing::info!(
            pipeline = %spec.name,
            modules = modules.len(),
            ordering = %ordering,
            "pipeline.built"
        );

        Ok(BuiltPipeline {
            name: spec.name.clone(),
            modules,
            graph,
            ordering,
            error_policy: spec.error_policy,
            concurrency: spec.concurrency,
            max_parallel: spec.max_parallel,
        })
    }
}

/// Whether `later` must wait for `earlier` to keep results identical to
/// sequential execution: it reads what `earlier` writes, writes what
/// `earlier` reads, or both write the same key.
fn conflicts(earlier: &BoundModule, later: &dyn Module) -> bool {
    let reads = |decls: &[InputDecl], key: &str| decls.iter().any(|d| d.key == key);

    later.consumes().iter().any(|d| earlier.produces.contains(&d.key))
        || later
            .produces()
            .iter()
            .any(|key| earlier.produces.contains(key) || reads(&earlier.consumes, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{Inputs, Outputs, Settings};
    use crate::pipeline::ModuleEntry;
    use async_trait::async_trait;
    use serde_json::json;

    /// Module whose keys come straight from its settings
    struct KeyedModule {
        consumes: Vec<InputDecl>,
        produces: Vec<String>,
    }

    #[async_trait]
    impl Module for KeyedModule {
        fn consumes(&self) -> &[InputDecl] {
            &self.consumes
        }

        fn produces(&self) -> &[String] {
            &self.produces
        }

        async fn execute(&self, _inputs: Inputs) -> anyhow::Result<Outputs> {
            Ok(Outputs::new())
        }
    }

    fn keyed(settings: &Settings) -> anyhow::Result<Arc<dyn Module>> {
        let list = |field: &str| -> Vec<String> {
            settings[field]
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default()
        };

        let mut consumes: Vec<InputDecl> = list("consumes").into_iter().map(InputDecl::required).collect();
        consumes.extend(list("optional").into_iter().map(InputDecl::optional));

        Ok(Arc::new(KeyedModule {
            consumes,
            produces: list("produces"),
        }))
    }

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        for id in ["scraper", "summarizer", "pdf_parser", "keyed"] {
            registry.register(id, keyed).unwrap();
        }
        registry
            .register("broken", |_: &Settings| Err(anyhow::anyhow!("missing api key")))
            .unwrap();
        registry.seal();
        registry
    }

    fn scraper() -> ModuleEntry {
        ModuleEntry::new("scraper").with_settings(json!({ "produces": ["raw_text"] }))
    }

    fn summarizer() -> ModuleEntry {
        ModuleEntry::new("summarizer")
            .with_settings(json!({ "consumes": ["raw_text"], "produces": ["summary"] }))
    }

    #[test]
    fn test_declared_order() {
        let registry = registry();
        let spec = PipelineSpec::new("p", vec![scraper(), summarizer()]);

        let built = PipelineBuilder::new(&registry).build(&spec).unwrap();
        assert_eq!(built.execution_order(), vec!["scraper", "summarizer"]);
        assert_eq!(built.ordering(), Ordering::Declared);
        assert_eq!(built.modules()[1].upstream, vec![0]);
    }

    #[test]
    fn test_dependency_declarations_reorder() {
        let registry = registry();
        let spec = PipelineSpec::new("p", vec![summarizer().depends_on(["scraper"]), scraper()]);

        let built = PipelineBuilder::new(&registry).build(&spec).unwrap();
        assert_eq!(built.execution_order(), vec!["scraper", "summarizer"]);
        assert_eq!(built.modules()[0].position, 1);
    }

    #[test]
    fn test_unknown_module_fails_fast() {
        let mut registry = ModuleRegistry::new();
        registry.register("pdf_parser", keyed).unwrap();
        registry
            .register("boom", |_: &Settings| -> anyhow::Result<Arc<dyn Module>> {
                panic!("factories must not run when any identifier is unknown")
            })
            .unwrap();

        let spec = PipelineSpec::new(
            "p",
            vec![
                ModuleEntry::new("boom"),
                ModuleEntry::new("pdf_parserr"),
            ],
        );

        let err = PipelineBuilder::new(&registry).build(&spec).unwrap_err();
        assert!(matches!(err, CapflowError::UnknownModule { ref id, .. } if id == "pdf_parserr"));
    }

    #[test]
    fn test_unsatisfied_dependency() {
        let registry = registry();
        let spec = PipelineSpec::new("p", vec![summarizer()]);

        let err = PipelineBuilder::new(&registry).build(&spec).unwrap_err();
        match err {
            CapflowError::UnsatisfiedDependency { module, key, phase } => {
                assert_eq!(module, "summarizer");
                assert_eq!(key, "raw_text");
                assert_eq!(phase, DependencyPhase::Build);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_declared_order_does_not_look_ahead() {
        let registry = registry();
        let spec = PipelineSpec::new("p", vec![summarizer(), scraper()]);

        let err = PipelineBuilder::new(&registry).build(&spec).unwrap_err();
        assert!(matches!(err, CapflowError::UnsatisfiedDependency { .. }));
    }

    #[test]
    fn test_optional_inputs_may_be_missing() {
        let registry = registry();
        let spec = PipelineSpec::new(
            "p",
            vec![
                scraper(),
                ModuleEntry::new("summarizer").with_settings(json!({
                    "consumes": ["raw_text"],
                    "optional": ["title"],
                    "produces": ["summary"],
                })),
            ],
        );

        assert!(PipelineBuilder::new(&registry).build(&spec).is_ok());
    }

    #[test]
    fn test_cycle_fails_build() {
        let registry = registry();
        let mut spec = PipelineSpec::new(
            "p",
            vec![
                ModuleEntry::new("keyed")
                    .with_name("a")
                    .with_settings(json!({ "consumes": ["y"], "produces": ["x"] })),
                ModuleEntry::new("keyed")
                    .with_name("b")
                    .with_settings(json!({ "consumes": ["x"], "produces": ["y"] })),
            ],
        );
        spec.ordering = Some(Ordering::Dependencies);

        let err = PipelineBuilder::new(&registry).build(&spec).unwrap_err();
        assert!(matches!(err, CapflowError::CyclicDependency { .. }));
    }

    #[test]
    fn test_in_place_rewrites_under_dependency_ordering() {
        let registry = registry();
        let rewrite = |name: &str| {
            ModuleEntry::new("keyed")
                .with_name(name)
                .with_settings(json!({ "consumes": ["text"], "produces": ["text"] }))
        };
        let mut spec = PipelineSpec::new(
            "p",
            vec![
                ModuleEntry::new("keyed")
                    .with_name("source")
                    .with_settings(json!({ "produces": ["text"] })),
                rewrite("trim"),
                rewrite("lower"),
            ],
        );
        spec.ordering = Some(Ordering::Dependencies);

        let built = PipelineBuilder::new(&registry).build(&spec).unwrap();
        assert_eq!(built.execution_order(), vec!["source", "trim", "lower"]);
        assert_eq!(built.modules()[2].upstream, vec![0, 1]);
    }

    #[test]
    fn test_factory_failure_is_module_init() {
        let registry = registry();
        let spec = PipelineSpec::new("p", vec![ModuleEntry::new("broken")]);

        let err = PipelineBuilder::new(&registry).build(&spec).unwrap_err();
        match err {
            CapflowError::ModuleInit { id, cause } => {
                assert_eq!(id, "broken");
                assert_eq!(cause, "missing api key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_module_without_outputs_rejected() {
        let registry = registry();
        let spec = PipelineSpec::new("p", vec![ModuleEntry::new("keyed")]);

        let err = PipelineBuilder::new(&registry).build(&spec).unwrap_err();
        assert!(matches!(err, CapflowError::ModuleInit { .. }));
    }

    #[test]
    fn test_upstream_tracks_independent_branches() {
        let registry = registry();
        let spec = PipelineSpec::new(
            "p",
            vec![
                scraper(),
                ModuleEntry::new("pdf_parser").with_settings(json!({ "produces": ["document"] })),
                summarizer(),
                ModuleEntry::new("keyed")
                    .with_name("doc_stats")
                    .with_settings(json!({ "consumes": ["document"], "produces": ["stats"] })),
                ModuleEntry::new("keyed")
                    .with_name("rescrape")
                    .with_settings(json!({ "produces": ["raw_text"] })),
            ],
        );

        let built = PipelineBuilder::new(&registry).build(&spec).unwrap();
        let upstream: Vec<&[usize]> = built.modules().iter().map(|m| m.upstream.as_slice()).collect();

        assert_eq!(upstream[0], &[] as &[usize]);
        assert_eq!(upstream[1], &[] as &[usize]);
        assert_eq!(upstream[2], &[0]);
        assert_eq!(upstream[3], &[1]);
        // rewrites raw_text: after the first writer and after its reader
        assert_eq!(upstream[4], &[0, 2]);
    }

    #[test]
    fn test_timeouts_resolve_per_module() {
        let registry = registry();
        let mut spec = PipelineSpec::new("p", vec![scraper().with_timeout_ms(50), summarizer()]);
        spec.module_timeout_ms = Some(1000);

        let built = PipelineBuilder::new(&registry).build(&spec).unwrap();
        assert_eq!(built.modules()[0].timeout, Some(Duration::from_millis(50)));
        assert_eq!(built.modules()[1].timeout, Some(Duration::from_millis(1000)));
    }

    #[test]
    fn test_plan_lists_execution_order() {
        let registry = registry();
        let spec = PipelineSpec::new("p", vec![summarizer().depends_on(["scraper"]), scraper()]);

        let built = PipelineBuilder::new(&registry).build(&spec).unwrap();
        assert_eq!(
            built.plan(),
            "1. scraper (scraper)\n2. summarizer (summarizer) [depends: scraper]\n"
        );
    }
}
