use anyhow::{bail, Context, Result};
use refinement::RefinementOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Wire format spoken by the generation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiFlavor {
    /// `POST {url}/generate` with `{prompt, max_length, model, temperature}`.
    #[default]
    Generate,
    /// OpenAI-compatible `POST {url}/chat/completions`.
    ChatCompletions,
}

impl std::str::FromStr for ApiFlavor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generate" | "slm" => Ok(Self::Generate),
            "chat" | "chat_completions" | "openai" => Ok(Self::ChatCompletions),
            other => bail!("unknown API flavor '{other}' (expected generate or chat_completions)"),
        }
    }
}

/// Generation endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,
    pub model: String,
    pub flavor: ApiFlavor,
    /// Bearer token; only sent for the chat-completions flavor.
    pub api_key: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "http://host.docker.internal:8000".into(),
            model: "deepseek".into(),
            flavor: ApiFlavor::Generate,
            api_key: None,
        }
    }
}

/// External lint and test tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub verilator: String,
    pub iverilog: String,
    pub pytest: String,
    pub lint_timeout_secs: u64,
    pub test_timeout_secs: u64,
    /// Explicit cocotb harness; discovered under the code dir when unset.
    pub harness: Option<PathBuf>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            verilator: "verilator".into(),
            iverilog: "iverilog".into(),
            pytest: "pytest".into(),
            lint_timeout_secs: 30,
            test_timeout_secs: 120,
            harness: None,
        }
    }
}

/// Top-level agent configuration.
///
/// Layered: defaults, then an optional TOML file, then environment, then
/// CLI flags (applied by the binary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Benchmark workspace holding `prompt.json`, `docs/`, `rtl/`, `verif/`, `rundir/`.
    pub code_dir: PathBuf,
    pub endpoint: EndpointConfig,
    pub toolchain: ToolchainConfig,
    pub refinement: RefinementOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            code_dir: PathBuf::from("/code"),
            endpoint: EndpointConfig::default(),
            toolchain: ToolchainConfig::default(),
            refinement: RefinementOptions::default(),
        }
    }
}

impl AgentConfig {
    /// Defaults, optional file, then process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Overlay environment variables read through `lookup`.
    ///
    /// `RTL_AGENT_*` names take precedence over the legacy `SLM_*` names.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |primary: &'static str, legacy: Option<&'static str>| {
            lookup(primary)
                .map(|value| (primary, value))
                .or_else(|| legacy.and_then(|name| lookup(name).map(|value| (name, value))))
        };

        if let Some((_, dir)) = var("RTL_AGENT_CODE_DIR", None) {
            self.code_dir = PathBuf::from(dir);
        }
        if let Some((_, url)) = var("RTL_AGENT_API_URL", Some("SLM_API_URL")) {
            self.endpoint.url = url;
        }
        if let Some((_, model)) = var("RTL_AGENT_MODEL", Some("SLM_MODEL")) {
            self.endpoint.model = model;
        }
        if let Some((_, flavor)) = var("RTL_AGENT_API_FLAVOR", None) {
            self.endpoint.flavor = flavor.parse()?;
        }
        if let Some((_, key)) = var("RTL_AGENT_API_KEY", Some("OPENAI_API_KEY")) {
            self.endpoint.api_key = Some(key);
        }
        if let Some((name, raw)) = var("RTL_AGENT_MAX_LENGTH", Some("SLM_MAX_LENGTH")) {
            let max_length: u32 = parse_var(name, &raw)?;
            self.refinement.generation.max_length = max_length;
            self.refinement.max_prompt_tokens = max_length as usize;
        }
        if let Some((name, raw)) = var("RTL_AGENT_TIMEOUT", Some("SLM_TIMEOUT")) {
            self.refinement.generation_timeout_secs = parse_var(name, &raw)?;
        }
        if let Some((name, raw)) = var("RTL_AGENT_TEMPERATURE", None) {
            self.refinement.generation.temperature = parse_var(name, &raw)?;
        }
        if let Some((name, raw)) = var("RTL_AGENT_MAX_ITERATIONS", None) {
            self.refinement.max_iterations = parse_var(name, &raw)?;
        }
        if let Some((name, raw)) = var("RTL_AGENT_PORT_VALIDATION", None) {
            self.refinement.enable_port_validation = parse_var(name, &raw)?;
        }
        if let Some((name, raw)) = var("RTL_AGENT_DEADLINE", None) {
            self.refinement.overall_deadline_secs = Some(parse_var(name, &raw)?);
        }
        Ok(())
    }

    /// Reject values the loop or the toolchain cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.refinement
            .validate()
            .context("Invalid refinement options")?;
        if self.toolchain.lint_timeout_secs == 0 {
            bail!("lint_timeout_secs must be positive");
        }
        if self.toolchain.test_timeout_secs == 0 {
            bail!("test_timeout_secs must be positive");
        }
        if self.endpoint.url.trim().is_empty() {
            bail!("endpoint url must not be empty");
        }
        Ok(())
    }

    pub fn prompt_file(&self) -> PathBuf {
        self.code_dir.join("prompt.json")
    }

    pub fn rtl_dir(&self) -> PathBuf {
        self.code_dir.join("rtl")
    }

    pub fn rundir(&self) -> PathBuf {
        self.code_dir.join("rundir")
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value for {name}: '{raw}'"))
}
