//! Typed pipeline module model.
//!
//! `ops` are stored as raw JSON on `pipeline_mods`. [`parse_ops`] validates
//! that JSON into [`ModOp`] values: each op's `apply` payload is decoded into
//! the shape its type requires and filters are compiled. Anything malformed
//! is a [`PipelineError`], never a runtime cast failure during resolution.

use std::fmt;

use assetflow_core::types::{ArgMap, DbId};
use assetflow_core::zps::ProcessorRef;
use assetflow_db::models::pipeline_mod::PipelineModRow;
use serde::{Deserialize, Serialize};

pub use crate::filter::OpFilter;
use crate::error::PipelineError;

/// Default `max_apply_count` of an op.
pub const DEFAULT_MAX_APPLY_COUNT: u32 = 1;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The operation a `ModOp` performs on the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModOpType {
    SetArgs,
    Append,
    Prepend,
    AddBefore,
    AddAfter,
    Replace,
    Remove,
    Last,
    AppendMerge,
    Depend,
}

impl ModOpType {
    pub fn name(self) -> &'static str {
        match self {
            ModOpType::SetArgs => "SET_ARGS",
            ModOpType::Append => "APPEND",
            ModOpType::Prepend => "PREPEND",
            ModOpType::AddBefore => "ADD_BEFORE",
            ModOpType::AddAfter => "ADD_AFTER",
            ModOpType::Replace => "REPLACE",
            ModOpType::Remove => "REMOVE",
            ModOpType::Last => "LAST",
            ModOpType::AppendMerge => "APPEND_MERGE",
            ModOpType::Depend => "DEPEND",
        }
    }
}

impl fmt::Display for ModOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an `OpFilter` compares its pattern with a processor class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpFilterType {
    Regex,
    Substr,
    Equal,
    NotRegex,
    NotSubstr,
}

// ---------------------------------------------------------------------------
// Ops
// ---------------------------------------------------------------------------

/// The decoded `apply` payload of an op.
#[derive(Debug, Clone, PartialEq)]
pub enum OpPayload {
    /// Processors to add (`APPEND`, `PREPEND`, `LAST`, `APPEND_MERGE`,
    /// `ADD_BEFORE`, `ADD_AFTER`, `REPLACE`).
    Processors(Vec<ProcessorRef>),
    /// Args to merge into matches (`SET_ARGS`).
    Args(ArgMap),
    /// Module names to apply first (`DEPEND`).
    Modules(Vec<String>),
    /// `REMOVE` carries no payload.
    Nothing,
}

/// One validated operation of a pipeline module.
#[derive(Debug, Clone)]
pub struct ModOp {
    pub op_type: ModOpType,
    pub payload: OpPayload,
    pub filter: Option<OpFilter>,
    pub max_apply_count: u32,
}

impl ModOp {
    /// Module names a `DEPEND` op pulls in; empty for every other op.
    pub fn depends_on(&self) -> &[String] {
        match &self.payload {
            OpPayload::Modules(names) => names,
            _ => &[],
        }
    }
}

/// Wire shape of an op inside the `ops` JSON array.
#[derive(Debug, Deserialize)]
struct RawModOp {
    #[serde(rename = "type")]
    op_type: ModOpType,
    #[serde(default)]
    apply: Option<serde_json::Value>,
    #[serde(default)]
    filter: Option<RawOpFilter>,
    #[serde(default = "default_max_apply_count")]
    max_apply_count: u32,
}

#[derive(Debug, Deserialize)]
struct RawOpFilter {
    #[serde(rename = "type")]
    filter_type: OpFilterType,
    #[serde(default)]
    processor: Option<String>,
}

fn default_max_apply_count() -> u32 {
    DEFAULT_MAX_APPLY_COUNT
}

/// Validate the raw `ops` JSON of module `module` into typed ops.
pub fn parse_ops(module: &str, ops: &serde_json::Value) -> Result<Vec<ModOp>, PipelineError> {
    let entries = ops.as_array().ok_or_else(|| PipelineError::InvalidPayload {
        module: module.to_string(),
        op: "ops".into(),
        reason: "ops must be a JSON array".into(),
    })?;

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let raw: RawModOp = serde_json::from_value(entry.clone()).map_err(|e| {
                PipelineError::InvalidPayload {
                    module: module.to_string(),
                    op: format!("ops[{i}]"),
                    reason: e.to_string(),
                }
            })?;
            parse_op(module, raw)
        })
        .collect()
}

fn parse_op(module: &str, raw: RawModOp) -> Result<ModOp, PipelineError> {
    let invalid = |reason: String| PipelineError::InvalidPayload {
        module: module.to_string(),
        op: raw.op_type.name().to_string(),
        reason,
    };

    if raw.max_apply_count == 0 {
        return Err(invalid("max_apply_count must be at least 1".into()));
    }

    let payload = match raw.op_type {
        ModOpType::Remove => OpPayload::Nothing,
        ModOpType::SetArgs => {
            let value = raw.apply.clone().ok_or_else(|| invalid("missing arg map".into()))?;
            let args: ArgMap = serde_json::from_value(value)
                .map_err(|e| invalid(format!("expected an arg map: {e}")))?;
            OpPayload::Args(args)
        }
        ModOpType::Depend => {
            let value = raw
                .apply
                .clone()
                .ok_or_else(|| invalid("missing module list".into()))?;
            let names: Vec<String> = serde_json::from_value(value)
                .map_err(|e| invalid(format!("expected a list of module names: {e}")))?;
            if names.is_empty() || names.iter().any(|n| n.trim().is_empty()) {
                return Err(invalid("module names must be non-empty".into()));
            }
            OpPayload::Modules(names)
        }
        _ => {
            let value = raw
                .apply
                .clone()
                .ok_or_else(|| invalid("missing processor list".into()))?;
            let mut refs: Vec<ProcessorRef> = serde_json::from_value(value)
                .map_err(|e| invalid(format!("expected a list of processors: {e}")))?;
            if refs.iter().any(|r| r.class_name.trim().is_empty()) {
                return Err(invalid("processor class_name must not be empty".into()));
            }
            for r in &mut refs {
                r.module = Some(module.to_string());
                r.checksum = None;
            }
            OpPayload::Processors(refs)
        }
    };

    let filter = raw
        .filter
        .map(|f| OpFilter::new(module, f.filter_type, f.processor.unwrap_or_default()))
        .transpose()?;

    Ok(ModOp {
        op_type: raw.op_type,
        payload,
        filter,
        max_apply_count: raw.max_apply_count,
    })
}

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

/// A pipeline module with validated ops.
#[derive(Debug, Clone)]
pub struct PipelineMod {
    pub id: DbId,
    pub project_id: Option<DbId>,
    pub name: String,
    /// The module's objective, e.g. `labels`. Collected into
    /// `pipeline.objectives`.
    pub mod_type: String,
    pub ops: Vec<ModOp>,
}

impl PipelineMod {
    /// Build a module in memory, validating `ops`.
    pub fn new(
        name: impl Into<String>,
        mod_type: impl Into<String>,
        ops: &serde_json::Value,
    ) -> Result<Self, PipelineError> {
        let name = name.into();
        let ops = parse_ops(&name, ops)?;
        Ok(Self {
            id: 0,
            project_id: None,
            name,
            mod_type: mod_type.into(),
            ops,
        })
    }

    /// Modules this one names in its `DEPEND` ops, in declared order.
    pub fn dependencies(&self) -> impl Iterator<Item = &String> {
        self.ops.iter().flat_map(|op| op.depends_on())
    }
}

impl TryFrom<&PipelineModRow> for PipelineMod {
    type Error = PipelineError;

    fn try_from(row: &PipelineModRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            project_id: row.project_id,
            name: row.name.clone(),
            mod_type: row.mod_type.clone(),
            ops: parse_ops(&row.name, &row.ops)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn parses_every_payload_shape() {
        let ops = parse_ops(
            "m",
            &json!([
                {"type": "APPEND", "apply": [{"class_name": "p.A", "image": "core"}]},
                {"type": "SET_ARGS", "apply": {"x": 1}, "filter": {"type": "EQUAL", "processor": "p.A"}},
                {"type": "DEPEND", "apply": ["base"]},
                {"type": "REMOVE", "filter": {"type": "SUBSTR", "processor": "Old"}, "max_apply_count": 3}
            ]),
        )
        .unwrap();

        assert_eq!(ops.len(), 4);
        assert_matches!(&ops[0].payload, OpPayload::Processors(refs) if refs[0].module.as_deref() == Some("m"));
        assert_matches!(&ops[1].payload, OpPayload::Args(args) if args["x"] == json!(1));
        assert_eq!(ops[2].depends_on(), ["base".to_string()]);
        assert_eq!(ops[3].max_apply_count, 3);
        assert_eq!(ops[0].max_apply_count, DEFAULT_MAX_APPLY_COUNT);
    }

    #[test]
    fn rejects_args_where_processors_expected() {
        let err = parse_ops("m", &json!([{"type": "APPEND", "apply": {"x": 1}}])).unwrap_err();
        assert_matches!(err, PipelineError::InvalidPayload { op, .. } if op == "APPEND");
    }

    #[test]
    fn rejects_missing_payload() {
        let err = parse_ops("m", &json!([{"type": "SET_ARGS"}])).unwrap_err();
        assert_matches!(err, PipelineError::InvalidPayload { op, .. } if op == "SET_ARGS");
    }

    #[test]
    fn rejects_unknown_op_type() {
        let err = parse_ops("m", &json!([{"type": "EXPLODE", "apply": []}])).unwrap_err();
        assert_matches!(err, PipelineError::InvalidPayload { op, .. } if op == "ops[0]");
    }

    #[test]
    fn rejects_non_array_ops() {
        let err = parse_ops("m", &json!({"type": "APPEND"})).unwrap_err();
        assert_matches!(err, PipelineError::InvalidPayload { reason, .. } if reason.contains("array"));
    }

    #[test]
    fn rejects_zero_max_apply_count() {
        let err = parse_ops("m", &json!([{"type": "REMOVE", "max_apply_count": 0}])).unwrap_err();
        assert_matches!(err, PipelineError::InvalidPayload { op, .. } if op == "REMOVE");
    }

    #[test]
    fn rejects_empty_depend_list() {
        let err = parse_ops("m", &json!([{"type": "DEPEND", "apply": []}])).unwrap_err();
        assert_matches!(err, PipelineError::InvalidPayload { op, .. } if op == "DEPEND");
    }

    #[test]
    fn rejects_bad_regex_filter() {
        let err = parse_ops(
            "m",
            &json!([{"type": "REMOVE", "filter": {"type": "REGEX", "processor": "[a-"}}]),
        )
        .unwrap_err();
        assert_matches!(err, PipelineError::InvalidFilter { .. });
    }

    #[test]
    fn op_type_names_match_wire_format() {
        for op in [ModOpType::SetArgs, ModOpType::AppendMerge, ModOpType::AddBefore] {
            let wire = serde_json::to_value(op).unwrap();
            assert_eq!(wire, json!(op.name()));
        }
    }
}
