pub mod fusion;
pub mod query_rewriter;
