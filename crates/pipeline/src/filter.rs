//! Processor filters: which `ProcessorRef`s a `ModOp` targets.

use regex::Regex;

use crate::error::PipelineError;
use crate::model::OpFilterType;

/// A validated filter, with its regex compiled once at load time.
#[derive(Debug, Clone)]
pub struct OpFilter {
    pub filter_type: OpFilterType,
    pub processor: String,
    regex: Option<Regex>,
}

impl OpFilter {
    /// Build a filter for `module`. Regex patterns must match the whole
    /// class name, so they are anchored before compiling.
    pub fn new(
        module: &str,
        filter_type: OpFilterType,
        processor: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let processor = processor.into();
        let regex = match filter_type {
            OpFilterType::Regex | OpFilterType::NotRegex => {
                let anchored = format!("^(?:{processor})$");
                let compiled = Regex::new(&anchored).map_err(|e| PipelineError::InvalidFilter {
                    module: module.to_string(),
                    reason: format!("bad regex '{processor}': {e}"),
                })?;
                Some(compiled)
            }
            _ => None,
        };
        Ok(Self {
            filter_type,
            processor,
            regex,
        })
    }

    /// Whether `class_name` is selected by this filter.
    pub fn matches(&self, class_name: &str) -> bool {
        match self.filter_type {
            OpFilterType::Equal => class_name == self.processor,
            OpFilterType::Substr => class_name.contains(&self.processor),
            OpFilterType::NotSubstr => !class_name.contains(&self.processor),
            OpFilterType::Regex => self.regex_matches(class_name),
            OpFilterType::NotRegex => !self.regex_matches(class_name),
        }
    }

    fn regex_matches(&self, class_name: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(class_name))
    }
}

/// A missing filter selects every processor.
pub fn selects(filter: Option<&OpFilter>, class_name: &str) -> bool {
    filter.map_or(true, |f| f.matches(class_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn filter(t: OpFilterType, p: &str) -> OpFilter {
        OpFilter::new("test", t, p).unwrap()
    }

    #[test]
    fn equal_is_exact() {
        let f = filter(OpFilterType::Equal, "core.Proxy");
        assert!(f.matches("core.Proxy"));
        assert!(!f.matches("core.ProxyV2"));
    }

    #[test]
    fn substr_and_negation() {
        let f = filter(OpFilterType::Substr, "Proxy");
        assert!(f.matches("core.ImageProxy"));
        assert!(!f.matches("core.Import"));

        let n = filter(OpFilterType::NotSubstr, "Proxy");
        assert!(!n.matches("core.ImageProxy"));
        assert!(n.matches("core.Import"));
    }

    #[test]
    fn regex_matches_whole_class_name() {
        let f = filter(OpFilterType::Regex, r"core\..*Proxy");
        assert!(f.matches("core.ImageProxy"));
        assert!(!f.matches("core.ImageProxyProcessor"));
        assert!(!f.matches("xcore.ImageProxy"));

        let n = filter(OpFilterType::NotRegex, r"core\..*Proxy");
        assert!(n.matches("core.ImageProxyProcessor"));
    }

    #[test]
    fn alternation_is_anchored_as_a_group() {
        let f = filter(OpFilterType::Regex, "a|b");
        assert!(f.matches("a"));
        assert!(f.matches("b"));
        assert!(!f.matches("ab"));
    }

    #[test]
    fn invalid_regex_is_a_config_error() {
        let err = OpFilter::new("faces", OpFilterType::Regex, "(unclosed").unwrap_err();
        assert_matches!(err, PipelineError::InvalidFilter { module, .. } if module == "faces");
    }

    #[test]
    fn missing_filter_selects_everything() {
        assert!(selects(None, "anything"));
        let f = filter(OpFilterType::Equal, "x");
        assert!(!selects(Some(&f), "y"));
    }
}
