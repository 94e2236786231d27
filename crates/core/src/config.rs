use serde::Deserialize;
use std::path::PathBuf;

/// Root application configuration. Loaded from environment variables
/// with the prefix `SALON_LOYALTY__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Tenant key every collection is stored under.
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub loyalty: LoyaltyConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    JsonFile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_workspace() -> String {
    "default".to_string()
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            store: StoreConfig::default(),
            loyalty: LoyaltyConfig::default(),
        }
    }
}

// ─── Loyalty Config ─────────────────────────────────────────────────────────

/// How the visit streak is derived from purchase history.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreakMode {
    /// 1 if the last visit is inside the streak window, else 0.
    RecentVisit,
    /// Run of consecutive visit days ending at the last visit, if that visit
    /// is inside the streak window.
    ConsecutiveDays,
}

/// Flat bonus unlocked once the streak reaches `min_days`. Bonuses stack.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct StreakBonus {
    pub min_days: u32,
    pub points: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoyaltyConfig {
    #[serde(default = "default_referrer_bonus")]
    pub referrer_bonus: u64,
    #[serde(default = "default_referee_bonus")]
    pub referee_bonus: u64,
    #[serde(default = "default_birthday_reward")]
    pub birthday_reward: u64,
    #[serde(default = "default_streak_mode")]
    pub streak_mode: StreakMode,
    #[serde(default = "default_streak_window_days")]
    pub streak_window_days: i64,
    #[serde(default = "default_streak_bonuses")]
    pub streak_bonuses: Vec<StreakBonus>,
    #[serde(default = "default_referral_code_length")]
    pub referral_code_length: usize,
}

fn default_referrer_bonus() -> u64 {
    500
}

fn default_referee_bonus() -> u64 {
    250
}

fn default_birthday_reward() -> u64 {
    1000
}

fn default_streak_mode() -> StreakMode {
    StreakMode::ConsecutiveDays
}

fn default_streak_window_days() -> i64 {
    2
}

fn default_streak_bonuses() -> Vec<StreakBonus> {
    vec![
        StreakBonus { min_days: 7, points: 1000 },
        StreakBonus { min_days: 30, points: 5000 },
    ]
}

fn default_referral_code_length() -> usize {
    8
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            referrer_bonus: default_referrer_bonus(),
            referee_bonus: default_referee_bonus(),
            birthday_reward: default_birthday_reward(),
            streak_mode: default_streak_mode(),
            streak_window_days: default_streak_window_days(),
            streak_bonuses: default_streak_bonuses(),
            referral_code_length: default_referral_code_length(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("SALON_LOYALTY")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
