// src/config/mod.rs
pub mod digest;

pub use digest::{
    substitute_env, test_mode_mock, CacheSettings, DigestConfig, FeedConfig, HistorySettings,
    ScoringSettings, DEFAULT_CONFIG_PATH,
};
