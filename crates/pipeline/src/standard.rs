//! The standard pipeline every modular resolution starts from unless the
//! caller opts out.

use assetflow_core::zps::ProcessorRef;

const CORE_IMAGE: &str = "assetflow/plugins-core";
const ANALYSIS_IMAGE: &str = "assetflow/plugins-analysis";

/// Import, proxy generation and similarity hashing, in run order.
pub fn standard_pipeline() -> Vec<ProcessorRef> {
    vec![
        ProcessorRef::new("assetflow_core.core.PreCacheSourceFileProcessor", CORE_IMAGE),
        ProcessorRef::new("assetflow_core.core.FileImportProcessor", CORE_IMAGE),
        ProcessorRef::new("assetflow_core.proxy.ImageProxyProcessor", CORE_IMAGE),
        ProcessorRef::new("assetflow_core.proxy.VideoProxyProcessor", CORE_IMAGE),
        ProcessorRef::new("assetflow_analysis.similarity.SimilarityProcessor", ANALYSIS_IMAGE),
    ]
}
