//! Sample corpus reproduced from
//! `examples/original_source/.../data/sample_documents.py`, trimmed to
//! the three documents the end-to-end scenarios actually reference.
//! Used by the demo binary and by the `tests/` integration scenarios.

/// One ingestible sample document.
pub struct SampleDocument {
    pub doc_id: &'static str,
    pub doc_name: &'static str,
    pub content: &'static str,
}

pub const DOC_001_RANDOM_ACCESS: SampleDocument = SampleDocument {
    doc_id: "doc_001",
    doc_name: "5G NR 随机接入流程",
    content: include_str!("corpus_doc_001.md"),
};

pub const DOC_002_CARRIER_AGGREGATION: SampleDocument = SampleDocument {
    doc_id: "doc_002",
    doc_name: "载波聚合技术详解",
    content: include_str!("corpus_doc_002.md"),
};

pub const DOC_005_GNODEB_CONFIG: SampleDocument = SampleDocument {
    doc_id: "doc_005",
    doc_name: "gNodeB 基站参数配置指南",
    content: include_str!("corpus_doc_005.md"),
};

/// The three documents S1-S3 are driven against, in ingestion order.
pub fn scenario_documents() -> Vec<&'static SampleDocument> {
    vec![&DOC_001_RANDOM_ACCESS, &DOC_002_CARRIER_AGGREGATION, &DOC_005_GNODEB_CONFIG]
}
