//! Command-line and environment configuration.

use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::Duration;
use clap::Args;
use finman_ai::http::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use finman_ai::HttpExtractorConfig;
use finman_core::policy::DEFAULT_THRESHOLD;
use finman_core::{ClarificationRule, Policy};
use finman_resolve::ResolverConfig;

#[derive(Args, Debug, Clone)]
pub struct StoreOpts {
    /// DuckDB file for saved records (in-memory when unset)
    #[arg(long, env = "FINMAN_DB", global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct LlmOpts {
    /// API key for the chat-completions endpoint
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "FINMAN_LLM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, env = "FINMAN_LLM_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,
}

impl LlmOpts {
    pub fn extractor_config(&self) -> anyhow::Result<HttpExtractorConfig> {
        let api_key = self
            .api_key
            .clone()
            .context("no API key: set GROQ_API_KEY or pass --api-key")?;
        let mut config = HttpExtractorConfig::new(api_key);
        config.base_url = self.base_url.clone();
        config.model = self.model.clone();
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ResolveOpts {
    /// Minimum per-field confidence to accept without asking
    #[arg(long, env = "FINMAN_THRESHOLD", default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f32,

    /// How field confidences combine: price-override or symmetric
    #[arg(long, env = "FINMAN_RULE", default_value = "price-override", value_parser = parse_rule)]
    pub rule: ClarificationRule,

    /// Ask for a yes/no before saving each entry
    #[arg(long, env = "FINMAN_CONFIRM")]
    pub confirm: bool,

    /// Idle seconds before a session and its pending entry expire
    #[arg(long, env = "FINMAN_SESSION_TTL_SECS", default_value_t = 86_400)]
    pub session_ttl_secs: u32,
}

impl ResolveOpts {
    pub fn resolver_config(&self) -> anyhow::Result<ResolverConfig> {
        if !(0.0..=1.0).contains(&self.threshold) {
            bail!("threshold must be within 0..=1, got {}", self.threshold);
        }
        Ok(ResolverConfig {
            policy: Policy::new(self.threshold, self.rule),
            confirm_before_save: self.confirm,
        })
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(i64::from(self.session_ttl_secs))
    }
}

fn parse_rule(s: &str) -> Result<ClarificationRule, String> {
    ClarificationRule::parse(s).ok_or_else(|| format!("unknown rule {s:?} (price-override, symmetric)"))
}
