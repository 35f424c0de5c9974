//! Executable script model: `ZpsScript` and `ProcessorRef`.
//!
//! A script is the unit of work a task runs. It is stored as a JSONB blob on
//! the `tasks` row and handed verbatim to the analyst on dispatch.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hashing::sha256_json;
use crate::types::ArgMap;

/// A single containerized processing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorRef {
    /// Fully qualified processor class, e.g. `assetflow_core.image.ProxyProcessor`.
    pub class_name: String,
    /// Container image the processor runs in.
    pub image: String,
    #[serde(default, skip_serializing_if = "ArgMap::is_empty")]
    pub args: ArgMap,
    /// Nested processors run by a container processor.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execute: Vec<ProcessorRef>,
    /// Restrict the processor to these file extensions. Empty = all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_types: Vec<String>,
    /// Pipeline module that contributed this processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Serialize)]
struct ChecksumInput<'a> {
    class_name: &'a str,
    image: &'a str,
    args: &'a ArgMap,
}

impl ProcessorRef {
    pub fn new(class_name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            image: image.into(),
            args: ArgMap::new(),
            execute: Vec::new(),
            file_types: Vec::new(),
            module: None,
            checksum: None,
        }
    }

    /// Builder-style arg setter.
    pub fn with_arg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// SHA-256 over the canonical JSON of `(class_name, image, args)`.
    ///
    /// `ArgMap` is ordered, so equal processors always hash equally.
    pub fn compute_checksum(&self) -> String {
        let input = ChecksumInput {
            class_name: &self.class_name,
            image: &self.image,
            args: &self.args,
        };
        // Serializing string keys and JSON values cannot fail.
        sha256_json(&input).unwrap_or_default()
    }

    /// Recompute the checksum of this processor and every nested one.
    pub fn seal(&mut self) {
        for child in &mut self.execute {
            child.seal();
        }
        self.checksum = Some(self.compute_checksum());
    }
}

/// An asset handed to a script, addressed by URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub uri: String,
    #[serde(default, skip_serializing_if = "ArgMap::is_empty")]
    pub attrs: ArgMap,
}

impl AssetSpec {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            attrs: ArgMap::new(),
        }
    }
}

/// The executable description run by one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZpsScript {
    pub name: String,
    /// Generators produce assets before `execute` runs over them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generate: Vec<ProcessorRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<AssetSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execute: Vec<ProcessorRef>,
    #[serde(default, skip_serializing_if = "ArgMap::is_empty")]
    pub global_args: ArgMap,
    #[serde(default, skip_serializing_if = "ArgMap::is_empty")]
    pub settings: ArgMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ZpsScript>,
}

impl ZpsScript {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Build the script for a task created by an EXPAND event.
    ///
    /// The child runs the parent's resolved pipeline, global args and
    /// settings over the new assets. Generators and child scripts are not
    /// inherited.
    pub fn expand_child(&self, name: impl Into<String>, assets: Vec<AssetSpec>) -> ZpsScript {
        ZpsScript {
            name: name.into(),
            generate: Vec::new(),
            assets,
            execute: self.execute.clone(),
            global_args: self.global_args.clone(),
            settings: self.settings.clone(),
            children: Vec::new(),
        }
    }

    /// Seal every processor in `generate` and `execute`.
    pub fn seal(&mut self) {
        for p in self.generate.iter_mut().chain(self.execute.iter_mut()) {
            p.seal();
        }
        for child in &mut self.children {
            child.seal();
        }
    }
}

/// Validate a script before it is persisted.
pub fn validate_script(script: &ZpsScript) -> Result<(), CoreError> {
    if script.name.trim().is_empty() {
        return Err(CoreError::Validation("Script name must not be empty".into()));
    }
    for p in script.generate.iter().chain(script.execute.iter()) {
        validate_processor(p)?;
    }
    for asset in &script.assets {
        if asset.uri.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Script '{}' contains an asset with an empty uri",
                script.name
            )));
        }
    }
    script.children.iter().try_for_each(validate_script)
}

fn validate_processor(p: &ProcessorRef) -> Result<(), CoreError> {
    if p.class_name.trim().is_empty() {
        return Err(CoreError::Validation(
            "Processor class_name must not be empty".into(),
        ));
    }
    p.execute.iter().try_for_each(validate_processor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checksum_ignores_insertion_order() {
        let a = ProcessorRef::new("p.Proxy", "img")
            .with_arg("width", json!(512))
            .with_arg("format", json!("jpg"));
        let b = ProcessorRef::new("p.Proxy", "img")
            .with_arg("format", json!("jpg"))
            .with_arg("width", json!(512));
        assert_eq!(a.compute_checksum(), b.compute_checksum());
    }

    #[test]
    fn checksum_changes_with_args() {
        let a = ProcessorRef::new("p.Proxy", "img").with_arg("width", json!(512));
        let b = ProcessorRef::new("p.Proxy", "img").with_arg("width", json!(256));
        assert_ne!(a.compute_checksum(), b.compute_checksum());
    }

    #[test]
    fn seal_reaches_nested_processors() {
        let mut outer = ProcessorRef::new("p.Container", "img");
        outer.execute.push(ProcessorRef::new("p.Inner", "img"));
        outer.seal();
        assert!(outer.checksum.is_some());
        assert!(outer.execute[0].checksum.is_some());
    }

    #[test]
    fn deserializes_minimal_script() {
        let script: ZpsScript = serde_json::from_value(json!({
            "name": "import",
            "execute": [{"class_name": "p.Import", "image": "core"}]
        }))
        .unwrap();
        assert_eq!(script.execute.len(), 1);
        assert!(script.assets.is_empty());
        assert!(script.execute[0].args.is_empty());
    }

    #[test]
    fn expand_child_inherits_pipeline_not_generators() {
        let mut parent = ZpsScript::new("crawl");
        parent.generate.push(ProcessorRef::new("p.Crawler", "core"));
        parent.execute.push(ProcessorRef::new("p.Proxy", "core"));
        parent.global_args.insert("pipeline.objectives".into(), json!(["labels"]));

        let child = parent.expand_child("Expand 1 assets", vec![AssetSpec::new("gs://a.jpg")]);
        assert!(child.generate.is_empty());
        assert_eq!(child.execute, parent.execute);
        assert_eq!(child.global_args, parent.global_args);
        assert_eq!(child.assets.len(), 1);
    }

    #[test]
    fn validation_rejects_blank_class_name() {
        let mut script = ZpsScript::new("s");
        script.execute.push(ProcessorRef::new(" ", "img"));
        assert!(validate_script(&script).is_err());
    }

    #[test]
    fn validation_rejects_blank_asset_uri() {
        let mut script = ZpsScript::new("s");
        script.assets.push(AssetSpec::new(""));
        assert!(validate_script(&script).is_err());
    }
}
