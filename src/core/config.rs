use std::env;

/// Global config for the retrieval/generation engine. Every field is
/// overridable via a `RAG_`-prefixed environment variable; an optional
/// `rag-core.json` file (loaded first, see [`load_file_config`]) can set
/// the same fields without touching the environment. Precedence, highest
/// first: env var present → JSON file field present → built-in default.
#[derive(Debug, Clone)]
pub struct Config {
    // ---- RSF fusion ----
    pub rsf_alpha_base: f64,
    pub rsf_alpha_range: f64,
    pub rsf_k: i32,
    pub rsf_s: f64,

    // ---- Three-level recall ----
    pub level1_topk: usize,
    pub level2_topk: usize,
    pub level3_topk: usize,

    // ---- Rerank cutoff ----
    pub rerank_diff_threshold: f32,
    pub rerank_abs_floor: f32,

    // ---- Chunking ----
    pub chunk_leaf_min_tokens: usize,
    pub chunk_leaf_max_tokens: usize,
    pub chunk_overlap_ratio: f64,
    pub chunk_nonleaf_threshold: usize,

    // ---- Token budget ----
    pub token_budget_total: usize,
    pub system_prompt_token_reserve: usize,

    // ---- Cache / session ----
    pub session_ttl_seconds: u64,
    pub cache_ttl_seconds: u64,
    pub semantic_cache_threshold: f32,

    // ---- Embedding ----
    pub embedding_dim_light: usize,
    pub embedding_dim_dense: usize,

    // ---- Summarization trigger ----
    pub summarize_trigger_messages: usize,
    pub summarize_keep_recent: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rsf_alpha_base: 0.4,
            rsf_alpha_range: 0.3,
            rsf_k: 8,
            rsf_s: 1.0,

            level1_topk: 1500,
            level2_topk: 80,
            level3_topk: 10,

            rerank_diff_threshold: 0.8,
            rerank_abs_floor: 0.3,

            chunk_leaf_min_tokens: 512,
            chunk_leaf_max_tokens: 800,
            chunk_overlap_ratio: 0.12,
            chunk_nonleaf_threshold: 2000,

            token_budget_total: 4000,
            system_prompt_token_reserve: 500,

            session_ttl_seconds: 7200,
            cache_ttl_seconds: 86400,
            semantic_cache_threshold: 0.92,

            embedding_dim_light: 384,
            embedding_dim_dense: 768,

            summarize_trigger_messages: 20,
            summarize_keep_recent: 4,
        }
    }
}

/// A config file mirroring [`Config`]'s fields, all optional — only the
/// keys present override the built-in default before env vars are applied.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct FileConfig {
    pub rsf_alpha_base: Option<f64>,
    pub rsf_alpha_range: Option<f64>,
    pub rsf_k: Option<i32>,
    pub rsf_s: Option<f64>,
    pub level1_topk: Option<usize>,
    pub level2_topk: Option<usize>,
    pub level3_topk: Option<usize>,
    pub rerank_diff_threshold: Option<f32>,
    pub rerank_abs_floor: Option<f32>,
    pub chunk_leaf_min_tokens: Option<usize>,
    pub chunk_leaf_max_tokens: Option<usize>,
    pub chunk_overlap_ratio: Option<f64>,
    pub chunk_nonleaf_threshold: Option<usize>,
    pub token_budget_total: Option<usize>,
    pub system_prompt_token_reserve: Option<usize>,
    pub session_ttl_seconds: Option<u64>,
    pub cache_ttl_seconds: Option<u64>,
    pub semantic_cache_threshold: Option<f32>,
    pub embedding_dim_light: Option<usize>,
    pub embedding_dim_dense: Option<usize>,
    pub summarize_trigger_messages: Option<usize>,
    pub summarize_keep_recent: Option<usize>,
}

const ENV_CONFIG_PATH: &str = "RAG_CORE_CONFIG";

/// Load `rag-core.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `RAG_CORE_CONFIG` env var path
/// 2. `./rag-core.json` (process cwd)
/// 3. `../rag-core.json` (one level up)
///
/// Missing file → `FileConfig::default()` (silent, all env/default fallbacks
/// apply). Parse error → log a warning, return `FileConfig::default()`.
pub fn load_file_config() -> FileConfig {
    let mut candidates = vec![
        std::path::PathBuf::from("rag-core.json"),
        std::path::PathBuf::from("../rag-core.json"),
    ];
    if let Ok(env_path) = env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, std::path::PathBuf::from(env_path));
    }

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<FileConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("rag-core.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "rag-core.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return FileConfig::default();
                }
            },
            Err(_) => continue,
        }
    }

    FileConfig::default()
}

fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

impl Config {
    /// Resolve a full config: defaults, overridden by the file config's
    /// present fields, overridden in turn by any `RAG_*` env var.
    pub fn resolve(file: &FileConfig) -> Self {
        let d = Config::default();
        Config {
            rsf_alpha_base: env_or("RAG_RSF_ALPHA_BASE", file.rsf_alpha_base.unwrap_or(d.rsf_alpha_base)),
            rsf_alpha_range: env_or("RAG_RSF_ALPHA_RANGE", file.rsf_alpha_range.unwrap_or(d.rsf_alpha_range)),
            rsf_k: env_or("RAG_RSF_K", file.rsf_k.unwrap_or(d.rsf_k)),
            rsf_s: env_or("RAG_RSF_S", file.rsf_s.unwrap_or(d.rsf_s)),

            level1_topk: env_or("RAG_LEVEL1_TOPK", file.level1_topk.unwrap_or(d.level1_topk)),
            level2_topk: env_or("RAG_LEVEL2_TOPK", file.level2_topk.unwrap_or(d.level2_topk)),
            level3_topk: env_or("RAG_LEVEL3_TOPK", file.level3_topk.unwrap_or(d.level3_topk)),

            rerank_diff_threshold: env_or(
                "RAG_RERANK_DIFF_THRESHOLD",
                file.rerank_diff_threshold.unwrap_or(d.rerank_diff_threshold),
            ),
            rerank_abs_floor: env_or("RAG_RERANK_ABS_FLOOR", file.rerank_abs_floor.unwrap_or(d.rerank_abs_floor)),

            chunk_leaf_min_tokens: env_or(
                "RAG_CHUNK_LEAF_MIN_TOKENS",
                file.chunk_leaf_min_tokens.unwrap_or(d.chunk_leaf_min_tokens),
            ),
            chunk_leaf_max_tokens: env_or(
                "RAG_CHUNK_LEAF_MAX_TOKENS",
                file.chunk_leaf_max_tokens.unwrap_or(d.chunk_leaf_max_tokens),
            ),
            chunk_overlap_ratio: env_or(
                "RAG_CHUNK_OVERLAP_RATIO",
                file.chunk_overlap_ratio.unwrap_or(d.chunk_overlap_ratio),
            ),
            chunk_nonleaf_threshold: env_or(
                "RAG_CHUNK_NONLEAF_THRESHOLD",
                file.chunk_nonleaf_threshold.unwrap_or(d.chunk_nonleaf_threshold),
            ),

            token_budget_total: env_or(
                "RAG_TOKEN_BUDGET_TOTAL",
                file.token_budget_total.unwrap_or(d.token_budget_total),
            ),
            system_prompt_token_reserve: env_or(
                "RAG_SYSTEM_PROMPT_TOKEN_RESERVE",
                file.system_prompt_token_reserve.unwrap_or(d.system_prompt_token_reserve),
            ),

            session_ttl_seconds: env_or(
                "RAG_SESSION_TTL_SECONDS",
                file.session_ttl_seconds.unwrap_or(d.session_ttl_seconds),
            ),
            cache_ttl_seconds: env_or("RAG_CACHE_TTL_SECONDS", file.cache_ttl_seconds.unwrap_or(d.cache_ttl_seconds)),
            semantic_cache_threshold: env_or(
                "RAG_SEMANTIC_CACHE_THRESHOLD",
                file.semantic_cache_threshold.unwrap_or(d.semantic_cache_threshold),
            ),

            embedding_dim_light: env_or(
                "RAG_EMBEDDING_DIM_LIGHT",
                file.embedding_dim_light.unwrap_or(d.embedding_dim_light),
            ),
            embedding_dim_dense: env_or(
                "RAG_EMBEDDING_DIM_DENSE",
                file.embedding_dim_dense.unwrap_or(d.embedding_dim_dense),
            ),

            summarize_trigger_messages: env_or(
                "RAG_SUMMARIZE_TRIGGER_MESSAGES",
                file.summarize_trigger_messages.unwrap_or(d.summarize_trigger_messages),
            ),
            summarize_keep_recent: env_or(
                "RAG_SUMMARIZE_KEEP_RECENT",
                file.summarize_keep_recent.unwrap_or(d.summarize_keep_recent),
            ),
        }
    }

    /// Convenience: load the file config from disk and resolve in one call.
    pub fn load() -> Self {
        Config::resolve(&load_file_config())
    }
}
