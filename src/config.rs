//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MASTERY__*` 覆盖（双下划线表示嵌套，如 `MASTERY__SESSION__MAX_REVIEW_ATTEMPTS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

/// Evaluator 温度上限：其判定直接驱动状态迁移，必须保持低温
pub const MAX_EVALUATOR_TEMPERATURE: f32 = 0.2;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub agents: AgentsSection,
    #[serde(default)]
    pub session: SessionSection,
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：groq / openai / mock；实际选择还取决于环境中的 API Key
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            max_tokens: default_max_tokens(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "groq".to_string()
}

fn default_model() -> String {
    "meta-llama/llama-4-maverick-17b-128e-instruct".to_string()
}

fn default_max_tokens() -> u32 {
    3000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次生成调用超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [agents] 段：各角色采样温度与 prompt 覆盖目录
#[derive(Debug, Clone, Deserialize)]
pub struct AgentsSection {
    #[serde(default = "default_path_generator_temperature")]
    pub path_generator_temperature: f32,
    #[serde(default = "default_tutor_temperature")]
    pub tutor_temperature: f32,
    #[serde(default = "default_evaluator_temperature")]
    pub evaluator_temperature: f32,
    #[serde(default = "default_reviewer_temperature")]
    pub reviewer_temperature: f32,
    /// 存在 `<prompts_dir>/<role>.txt` 时覆盖对应角色的 system prompt
    pub prompts_dir: Option<PathBuf>,
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            path_generator_temperature: default_path_generator_temperature(),
            tutor_temperature: default_tutor_temperature(),
            evaluator_temperature: default_evaluator_temperature(),
            reviewer_temperature: default_reviewer_temperature(),
            prompts_dir: None,
        }
    }
}

impl AgentsSection {
    /// 实际使用的 Evaluator 温度（超过上限时截断）
    pub fn effective_evaluator_temperature(&self) -> f32 {
        self.evaluator_temperature.clamp(0.0, MAX_EVALUATOR_TEMPERATURE)
    }
}

fn default_path_generator_temperature() -> f32 {
    0.7
}

fn default_tutor_temperature() -> f32 {
    0.5
}

fn default_evaluator_temperature() -> f32 {
    0.1
}

fn default_reviewer_temperature() -> f32 {
    0.3
}

/// [session] 段：审查重试预算、各角色历史窗口、生成重试次数
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_max_review_attempts")]
    pub max_review_attempts: u32,
    /// Tutor 可见的最近轮数
    #[serde(default = "default_tutor_history_window")]
    pub tutor_history_window: usize,
    /// Evaluator 可见的最近轮数
    #[serde(default = "default_evaluator_history_window")]
    pub evaluator_history_window: usize,
    /// 单次 Agent 调用的总尝试次数（含首次），默认 2 即自动重试一次
    #[serde(default = "default_generation_attempts")]
    pub generation_attempts: u32,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_review_attempts: default_max_review_attempts(),
            tutor_history_window: default_tutor_history_window(),
            evaluator_history_window: default_evaluator_history_window(),
            generation_attempts: default_generation_attempts(),
        }
    }
}

fn default_max_review_attempts() -> u32 {
    3
}

fn default_tutor_history_window() -> usize {
    6
}

fn default_evaluator_history_window() -> usize {
    2
}

fn default_generation_attempts() -> u32 {
    2
}

/// 从 config 目录加载配置，环境变量 MASTERY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 则追加该文件（可覆盖前面的键）；文件缺失或无法解析时返回错误
/// 3. 最后叠加环境变量 MASTERY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if !path.is_file() {
            return Err(config::ConfigError::NotFound(path.display().to_string()));
        }
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MASTERY")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.session.max_review_attempts, 3);
        assert_eq!(cfg.session.tutor_history_window, 6);
        assert_eq!(cfg.session.evaluator_history_window, 2);
        assert_eq!(cfg.session.generation_attempts, 2);
        assert_eq!(cfg.llm.provider, "groq");
        assert!((cfg.agents.evaluator_temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_evaluator_temperature_is_clamped() {
        let agents = AgentsSection {
            evaluator_temperature: 0.9,
            ..AgentsSection::default()
        };
        assert!((agents.effective_evaluator_temperature() - MAX_EVALUATOR_TEMPERATURE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_load_config_from_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[session]\nmax_review_attempts = 5\n\n[agents]\ntutor_temperature = 0.8"
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.session.max_review_attempts, 5);
        assert_eq!(cfg.session.tutor_history_window, 6);
        assert!((cfg.agents.tutor_temperature - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_explicit_config_must_exist_and_parse() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            load_config(Some(missing)),
            Err(config::ConfigError::NotFound(_))
        ));

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[session\nmax_review_attempts = ").unwrap();
        assert!(load_config(Some(file.path().to_path_buf())).is_err());
    }
}
