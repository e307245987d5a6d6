use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{PipelineError, Result};

const DEFAULT_BASE_URL: &str = "https://api.openbrewerydb.org/v1/breweries";
// The API rejects requests without a browser-like User-Agent.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const RAW_FILE_NAME: &str = "breweries_raw.parquet";

/// Everything a run needs to know. Loaded once in `main` and passed down.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub base_url: String,
    pub user_agent: String,
    pub per_page: u32,
    pub pages: u32,
    pub timeout_secs: u64,
    pub data_dir: PathBuf,
    pub target_country: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            per_page: 200,
            pages: 3,
            timeout_secs: 10,
            data_dir: PathBuf::from("data"),
            target_country: "United States".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `BREWERY_*` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::Environment::with_prefix("BREWERY").try_parsing(true))
            .build()?;
        let loaded: PipelineConfig = settings.try_deserialize()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(PipelineError::Config("base_url must not be empty".into()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(PipelineError::Config("user_agent must not be empty".into()));
        }
        if self.per_page == 0 {
            return Err(PipelineError::Config("per_page must be at least 1".into()));
        }
        if self.pages == 0 {
            return Err(PipelineError::Config("pages must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(PipelineError::Config("timeout_secs must be at least 1".into()));
        }
        if self.target_country.trim().is_empty() {
            return Err(PipelineError::Config("target_country must not be empty".into()));
        }
        Ok(())
    }

    pub fn page_url(&self, page: u32) -> String {
        format!("{}?per_page={}&page={}", self.base_url, self.per_page, page)
    }

    pub fn bronze_dir(&self) -> PathBuf {
        self.data_dir.join("bronze")
    }

    pub fn gold_dir(&self) -> PathBuf {
        self.data_dir.join("gold")
    }

    pub fn raw_artifact(&self) -> PathBuf {
        self.bronze_dir().join(RAW_FILE_NAME)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.bronze_dir(), self.gold_dir()] {
            fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_public_api() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.pages, 3);
        assert_eq!(cfg.per_page, 200);
        assert_eq!(cfg.timeout_secs, 10);
        assert_eq!(cfg.target_country, "United States");
        assert!(!cfg.user_agent.is_empty());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn page_url_carries_size_and_number() {
        let cfg = PipelineConfig::default();
        assert_eq!(
            cfg.page_url(2),
            "https://api.openbrewerydb.org/v1/breweries?per_page=200&page=2"
        );
    }

    #[test]
    fn derived_paths_live_under_data_dir() {
        let cfg = PipelineConfig {
            data_dir: PathBuf::from("/tmp/run"),
            ..Default::default()
        };
        assert_eq!(cfg.bronze_dir(), PathBuf::from("/tmp/run/bronze"));
        assert_eq!(cfg.gold_dir(), PathBuf::from("/tmp/run/gold"));
        assert_eq!(
            cfg.raw_artifact(),
            PathBuf::from("/tmp/run/bronze/breweries_raw.parquet")
        );
    }

    #[test]
    fn rejects_empty_user_agent_and_zero_pages() {
        let no_agent = PipelineConfig {
            user_agent: "  ".into(),
            ..Default::default()
        };
        assert!(matches!(no_agent.validate(), Err(PipelineError::Config(_))));

        let no_pages = PipelineConfig {
            pages: 0,
            ..Default::default()
        };
        assert!(matches!(no_pages.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn ensure_dirs_creates_both_layers() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig {
            data_dir: tmp.path().join("data"),
            ..Default::default()
        };
        cfg.ensure_dirs().unwrap();
        assert!(cfg.bronze_dir().is_dir());
        assert!(cfg.gold_dir().is_dir());
    }
}
