//! Deterministic pipeline resolution.
//!
//! Modules are applied in declared order to a working pipeline. Each module
//! first applies the modules named by its `DEPEND` ops (recursively, with a
//! stack-based cycle check), then its remaining ops in order. `LAST`
//! processors are queued and flushed at the end, stably sorted by module
//! name. Every processor of the result is sealed with its checksum.
//!
//! `PREPEND` does not insert at index 0 of the pipeline but at the prepend
//! anchor, which sits right after the seed's standard processors (or at the
//! very start when there is no standard seed). Successive prepends keep their
//! declared order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use assetflow_core::types::ArgMap;
use assetflow_core::zps::ProcessorRef;
use serde::Serialize;

use crate::error::PipelineError;
use crate::filter::{selects, OpFilter};
use crate::model::{ModOp, ModOpType, OpPayload, PipelineMod};
use crate::standard::standard_pipeline;

/// Key under which resolved module objectives are published.
pub const OBJECTIVES_ARG: &str = "pipeline.objectives";

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Every module reachable from a resolution request, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, PipelineMod>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: PipelineMod) {
        self.modules.insert(module.name.clone(), module);
    }

    pub fn get(&self, name: &str) -> Option<&PipelineMod> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl FromIterator<PipelineMod> for ModuleCatalog {
    fn from_iter<I: IntoIterator<Item = PipelineMod>>(iter: I) -> Self {
        let mut catalog = ModuleCatalog::new();
        for module in iter {
            catalog.insert(module);
        }
        catalog
    }
}

/// What the working pipeline starts as.
#[derive(Debug, Clone, PartialEq)]
pub enum Seed {
    Empty,
    Standard,
    /// A caller-supplied processor list; prepends go before it.
    Custom(Vec<ProcessorRef>),
}

/// A fully resolved pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPipeline {
    pub execute: Vec<ProcessorRef>,
    pub global_args: ArgMap,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Resolve `modules` (by name, in order) over `seed`.
pub fn resolve(
    catalog: &ModuleCatalog,
    seed: Seed,
    modules: &[String],
) -> Result<ResolvedPipeline, PipelineError> {
    let mut resolution = Resolution::new(catalog, seed);
    let mut objectives = BTreeSet::new();

    for name in modules {
        let module = catalog
            .get(name)
            .ok_or_else(|| PipelineError::UnknownModule(name.clone()))?;
        if !module.mod_type.is_empty() {
            objectives.insert(module.mod_type.clone());
        }
        resolution.apply_module(module)?;
    }

    let mut execute = resolution.finish();
    for processor in &mut execute {
        processor.seal();
    }

    let mut global_args = ArgMap::new();
    global_args.insert(
        OBJECTIVES_ARG.to_string(),
        serde_json::Value::from(objectives.into_iter().collect::<Vec<_>>()),
    );

    tracing::debug!(
        modules = modules.len(),
        processors = execute.len(),
        "Pipeline resolved",
    );

    Ok(ResolvedPipeline {
        execute,
        global_args,
    })
}

/// Resolve a custom processor list: a deep copy of `refs`, sealed.
pub fn resolve_custom(refs: &[ProcessorRef]) -> ResolvedPipeline {
    let mut execute = refs.to_vec();
    for processor in &mut execute {
        processor.seal();
    }
    ResolvedPipeline {
        execute,
        global_args: ArgMap::new(),
    }
}

// ---------------------------------------------------------------------------
// Resolution state
// ---------------------------------------------------------------------------

/// A position in the working pipeline.
#[derive(Debug, Clone)]
enum Slot {
    Processor(ProcessorRef),
    PrependAnchor,
}

struct Resolution<'a> {
    catalog: &'a ModuleCatalog,
    slots: Vec<Slot>,
    last: Vec<ProcessorRef>,
    /// Applications per `(module, op index)` in this call.
    apply_counts: HashMap<(String, usize), u32>,
    /// Modules currently being applied, outermost first.
    stack: Vec<String>,
}

impl<'a> Resolution<'a> {
    fn new(catalog: &'a ModuleCatalog, seed: Seed) -> Self {
        let slots = match seed {
            Seed::Empty => vec![Slot::PrependAnchor],
            Seed::Standard => standard_pipeline()
                .into_iter()
                .map(Slot::Processor)
                .chain(std::iter::once(Slot::PrependAnchor))
                .collect(),
            Seed::Custom(refs) => std::iter::once(Slot::PrependAnchor)
                .chain(refs.into_iter().map(Slot::Processor))
                .collect(),
        };
        Self {
            catalog,
            slots,
            last: Vec::new(),
            apply_counts: HashMap::new(),
            stack: Vec::new(),
        }
    }

    fn apply_module(&mut self, module: &'a PipelineMod) -> Result<(), PipelineError> {
        if let Some(pos) = self.stack.iter().position(|n| n == &module.name) {
            let mut cycle = self.stack[pos..].to_vec();
            cycle.push(module.name.clone());
            return Err(PipelineError::DependencyCycle(cycle));
        }
        self.stack.push(module.name.clone());

        let (depends, others): (Vec<_>, Vec<_>) = module
            .ops
            .iter()
            .enumerate()
            .partition(|(_, op)| op.op_type == ModOpType::Depend);

        for (index, op) in depends.into_iter().chain(others) {
            let key = (module.name.clone(), index);
            let applied = self.apply_counts.get(&key).copied().unwrap_or(0);
            if applied >= op.max_apply_count {
                continue;
            }
            if self.apply_op(&module.name, op)? {
                *self.apply_counts.entry(key).or_insert(0) += 1;
            }
        }

        self.stack.pop();
        Ok(())
    }

    /// Apply one op. Returns whether it changed anything.
    fn apply_op(&mut self, module: &str, op: &ModOp) -> Result<bool, PipelineError> {
        let filter = op.filter.as_ref();
        match (&op.op_type, &op.payload) {
            (ModOpType::Depend, OpPayload::Modules(names)) => {
                let catalog = self.catalog;
                for name in names {
                    let dependency = catalog
                        .get(name)
                        .ok_or_else(|| PipelineError::UnknownModule(name.clone()))?;
                    self.apply_module(dependency)?;
                }
                Ok(true)
            }
            (ModOpType::Append, OpPayload::Processors(refs)) => {
                if !self.guard(filter) {
                    return Ok(false);
                }
                self.slots.extend(refs.iter().cloned().map(Slot::Processor));
                Ok(true)
            }
            (ModOpType::Prepend, OpPayload::Processors(refs)) => {
                if !self.guard(filter) {
                    return Ok(false);
                }
                let at = self.anchor();
                self.slots
                    .splice(at..at, refs.iter().cloned().map(Slot::Processor));
                Ok(true)
            }
            (ModOpType::Last, OpPayload::Processors(refs)) => {
                if !self.guard(filter) {
                    return Ok(false);
                }
                self.last.extend(refs.iter().cloned());
                Ok(true)
            }
            (ModOpType::AppendMerge, OpPayload::Processors(refs)) => {
                if !self.guard(filter) {
                    return Ok(false);
                }
                for incoming in refs {
                    self.append_merge(incoming);
                }
                Ok(true)
            }
            (ModOpType::SetArgs, OpPayload::Args(args)) => {
                let mut changed = false;
                for processor in self.processors_mut() {
                    if selects(filter, &processor.class_name) {
                        merge_args(&mut processor.args, args);
                        changed = true;
                    }
                }
                Ok(changed)
            }
            (ModOpType::AddBefore, OpPayload::Processors(refs)) => {
                let Some(at) = self.first_match(filter) else {
                    return Ok(false);
                };
                self.slots
                    .splice(at..at, refs.iter().cloned().map(Slot::Processor));
                Ok(true)
            }
            (ModOpType::AddAfter, OpPayload::Processors(refs)) => {
                let Some(at) = self.first_match(filter) else {
                    return Ok(false);
                };
                self.slots
                    .splice(at + 1..at + 1, refs.iter().cloned().map(Slot::Processor));
                Ok(true)
            }
            (ModOpType::Replace, OpPayload::Processors(refs)) => {
                let mut changed = false;
                let slots = std::mem::take(&mut self.slots);
                for slot in slots {
                    match slot {
                        Slot::Processor(p) if selects(filter, &p.class_name) => {
                            self.slots.extend(refs.iter().cloned().map(Slot::Processor));
                            changed = true;
                        }
                        other => self.slots.push(other),
                    }
                }
                Ok(changed)
            }
            (ModOpType::Remove, _) => {
                let before = self.slots.len();
                self.slots.retain(|slot| match slot {
                    Slot::Processor(p) => !selects(filter, &p.class_name),
                    Slot::PrependAnchor => true,
                });
                Ok(self.slots.len() != before)
            }
            (op_type, _) => Err(PipelineError::InvalidPayload {
                module: module.to_string(),
                op: op_type.name().to_string(),
                reason: "payload does not fit the operation".into(),
            }),
        }
    }

    /// Queue-or-merge for `APPEND_MERGE`: merge args into the first
    /// processor with the same class name (pipeline first, then the `LAST`
    /// queue), otherwise append.
    fn append_merge(&mut self, incoming: &ProcessorRef) {
        let existing = self
            .processors_mut()
            .find(|p| p.class_name == incoming.class_name);
        if let Some(p) = existing {
            merge_args(&mut p.args, &incoming.args);
            return;
        }
        if let Some(p) = self
            .last
            .iter_mut()
            .find(|p| p.class_name == incoming.class_name)
        {
            merge_args(&mut p.args, &incoming.args);
            return;
        }
        self.slots.push(Slot::Processor(incoming.clone()));
    }

    /// A present filter on an additive op only lets it apply when some
    /// processor in the pipeline matches.
    fn guard(&self, filter: Option<&OpFilter>) -> bool {
        match filter {
            None => true,
            Some(f) => self.processors().any(|p| f.matches(&p.class_name)),
        }
    }

    fn first_match(&self, filter: Option<&OpFilter>) -> Option<usize> {
        self.slots.iter().position(|slot| match slot {
            Slot::Processor(p) => selects(filter, &p.class_name),
            Slot::PrependAnchor => false,
        })
    }

    fn anchor(&self) -> usize {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Slot::PrependAnchor))
            .unwrap_or(0)
    }

    fn processors(&self) -> impl Iterator<Item = &ProcessorRef> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Processor(p) => Some(p),
            Slot::PrependAnchor => None,
        })
    }

    fn processors_mut(&mut self) -> impl Iterator<Item = &mut ProcessorRef> {
        self.slots.iter_mut().filter_map(|slot| match slot {
            Slot::Processor(p) => Some(p),
            Slot::PrependAnchor => None,
        })
    }

    /// Flush the `LAST` queue and drop the anchor.
    fn finish(mut self) -> Vec<ProcessorRef> {
        self.last.sort_by(|a, b| a.module.cmp(&b.module));
        let mut execute: Vec<ProcessorRef> = self
            .slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Processor(p) => Some(p),
                Slot::PrependAnchor => None,
            })
            .collect();
        execute.append(&mut self.last);
        execute
    }
}

/// Merge `incoming` into `args`; incoming keys win.
fn merge_args(args: &mut ArgMap, incoming: &ArgMap) {
    for (key, value) in incoming {
        args.insert(key.clone(), value.clone());
    }
}
