//! Runtime configuration for the four scrapers.
//!
//! Every scraper has a complete built-in default ([`Config::default`]). An
//! optional YAML file is applied on top as a patch: only the keys it names
//! are replaced, so a file containing
//!
//! ```yaml
//! sina_text:
//!   target: 20
//!   pacing:
//!     item_delay_ms: 3000
//! ```
//!
//! changes two values and leaves every other default in place.

use crate::discovery::{DiscoveryLimits, StallPolicy};
use crate::error::ScrapeError;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
pub const SINA_HOME: &str = "https://mil.news.sina.com.cn/";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: Option<String>,
    pub referer: Option<String>,
    pub timeout_secs: u64,
    /// Skip TLS certificate verification.
    pub insecure: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: CHROME_UA.to_string(),
            accept: HTML_ACCEPT.to_string(),
            accept_language: None,
            referer: None,
            timeout_secs: 15,
            insecure: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Chromium executable; auto-detected when unset.
    pub chrome_path: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    pub navigation_timeout_secs: u64,
    /// Pause after navigation before the first extraction.
    pub initial_wait_ms: u64,
    /// Selector that must appear before the listing is considered loaded.
    pub ready_selector: Option<String>,
    pub ready_timeout_secs: u64,
    /// How long to wait for a load-more control to appear.
    pub control_timeout_secs: u64,
    /// Scroll-to-bottom passes before each extraction.
    pub scroll_passes: u32,
    pub scroll_pause_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            window_width: 1920,
            window_height: 1080,
            navigation_timeout_secs: 60,
            initial_wait_ms: 3000,
            ready_selector: None,
            ready_timeout_secs: 10,
            control_timeout_secs: 5,
            scroll_passes: 0,
            scroll_pause_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// End discovery once `target` articles are visible. Off for image
    /// scrapers, whose target counts images and not articles.
    pub stop_at_target: bool,
    pub max_attempts: usize,
    pub max_consecutive_failures: usize,
    pub settle_delay_ms: u64,
    pub truncate: bool,
    pub stall_policy: StallPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Pause after each article.
    pub item_delay_ms: u64,
    /// Pause after each image download.
    pub image_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub listing_url: String,
    /// Articles (text scrapers) or images (image scrapers) to save.
    pub target: usize,
    pub discovery: DiscoveryConfig,
    pub pacing: PacingConfig,
    pub http: HttpConfig,
    pub browser: BrowserConfig,
    /// Bodies shorter than this many characters are rejected.
    pub min_body_chars: usize,
    /// Downloads smaller than this many bytes are rejected.
    pub min_image_bytes: usize,
    /// Name text files `NNN_HHMMSS.txt` instead of `NNN.txt`.
    pub timestamped_names: bool,
}

impl ScraperConfig {
    pub fn limits(&self) -> DiscoveryLimits {
        let target_size = if self.discovery.stop_at_target {
            self.target
        } else {
            usize::MAX
        };
        DiscoveryLimits {
            target_size,
            max_attempts: self.discovery.max_attempts,
            max_consecutive_failures: self.discovery.max_consecutive_failures,
            settle_delay: Duration::from_millis(self.discovery.settle_delay_ms),
            truncate: self.discovery.truncate,
            stall_policy: self.discovery.stall_policy,
        }
    }

    fn sina_text() -> Self {
        Self {
            listing_url: SINA_HOME.to_string(),
            target: 100,
            discovery: DiscoveryConfig {
                stop_at_target: true,
                max_attempts: 3,
                max_consecutive_failures: 5,
                settle_delay_ms: 5000,
                truncate: true,
                stall_policy: StallPolicy::TriggerOnly,
            },
            pacing: PacingConfig {
                item_delay_ms: 1000,
                image_delay_ms: 0,
            },
            http: HttpConfig {
                accept: "application/json, text/plain, */*".to_string(),
                referer: Some(SINA_HOME.to_string()),
                timeout_secs: 10,
                insecure: true,
                ..HttpConfig::default()
            },
            browser: BrowserConfig {
                initial_wait_ms: 5000,
                ready_selector: Some(".ty-cardlist-w".to_string()),
                scroll_passes: 3,
                ..BrowserConfig::default()
            },
            min_body_chars: 50,
            min_image_bytes: 0,
            timestamped_names: true,
        }
    }

    fn sina_images() -> Self {
        let text = Self::sina_text();
        Self {
            discovery: DiscoveryConfig {
                stop_at_target: false,
                max_attempts: 10,
                truncate: false,
                ..text.discovery
            },
            pacing: PacingConfig {
                item_delay_ms: 500,
                image_delay_ms: 0,
            },
            http: HttpConfig {
                accept: "image/webp,image/apng,image/*,*/*;q=0.8".to_string(),
                ..text.http
            },
            min_body_chars: 0,
            min_image_bytes: 5000,
            timestamped_names: false,
            ..text
        }
    }

    fn ifeng_text() -> Self {
        Self {
            listing_url: "https://mil.ifeng.com/shanklist/14-35083-".to_string(),
            target: 100,
            discovery: DiscoveryConfig {
                stop_at_target: true,
                max_attempts: 10,
                max_consecutive_failures: 1,
                settle_delay_ms: 3000,
                truncate: true,
                stall_policy: StallPolicy::CountEmptyYield,
            },
            pacing: PacingConfig {
                item_delay_ms: 1000,
                image_delay_ms: 0,
            },
            http: HttpConfig::default(),
            browser: BrowserConfig {
                initial_wait_ms: 3000,
                ..BrowserConfig::default()
            },
            min_body_chars: 1,
            min_image_bytes: 0,
            timestamped_names: false,
        }
    }

    fn ifeng_images() -> Self {
        Self {
            listing_url: "https://mil.ifeng.com/shanklist/originalcard/14-35081-".to_string(),
            target: 100,
            // unused: the gallery index is read from one static page
            discovery: DiscoveryConfig {
                stop_at_target: false,
                max_attempts: 0,
                max_consecutive_failures: 1,
                settle_delay_ms: 0,
                truncate: false,
                stall_policy: StallPolicy::TriggerOnly,
            },
            pacing: PacingConfig {
                item_delay_ms: 2000,
                image_delay_ms: 1000,
            },
            http: HttpConfig {
                accept_language: Some("zh-CN,zh;q=0.8,en-US;q=0.5,en;q=0.3".to_string()),
                ..HttpConfig::default()
            },
            browser: BrowserConfig::default(),
            min_body_chars: 0,
            min_image_bytes: 0,
            timestamped_names: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sina_text: ScraperConfig,
    pub sina_images: ScraperConfig,
    pub ifeng_text: ScraperConfig,
    pub ifeng_images: ScraperConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sina_text: ScraperConfig::sina_text(),
            sina_images: ScraperConfig::sina_images(),
            ifeng_text: ScraperConfig::ifeng_text(),
            ifeng_images: ScraperConfig::ifeng_images(),
        }
    }
}

/// Recursively overlay `patch` onto `base`. Mappings merge key by key;
/// any other value replaces what was there.
fn merge_yaml(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Mapping(base_map), Value::Mapping(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

impl Config {
    /// Parse a YAML patch and apply it over the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ScrapeError> {
        let patch: Value = serde_yaml::from_str(yaml)
            .map_err(|e| ScrapeError::Config(format!("invalid YAML: {e}")))?;
        let mut base = serde_yaml::to_value(Config::default())
            .map_err(|e| ScrapeError::Config(e.to_string()))?;
        if !patch.is_null() {
            merge_yaml(&mut base, patch);
        }
        serde_yaml::from_value(base).map_err(|e| ScrapeError::Config(e.to_string()))
    }

    /// Load the configuration, applying `path` over the defaults when given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ScrapeError> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            ScrapeError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml(&yaml)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DiscoveryState, PageSource, discover};
    use crate::models::CandidateItem;

    #[test]
    fn test_defaults_match_site_behaviour() {
        let config = Config::default();
        assert_eq!(config.sina_text.discovery.max_attempts, 3);
        assert!(config.sina_text.discovery.truncate);
        assert!(config.sina_text.timestamped_names);
        assert_eq!(config.sina_images.discovery.max_attempts, 10);
        assert!(!config.sina_images.discovery.truncate);
        assert_eq!(config.sina_images.min_image_bytes, 5000);
        assert_eq!(
            config.ifeng_text.discovery.stall_policy,
            StallPolicy::CountEmptyYield
        );
        assert_eq!(config.ifeng_text.discovery.max_consecutive_failures, 1);
    }

    #[test]
    fn test_patch_overrides_only_named_keys() {
        let yaml = r#"
sina_text:
  target: 20
  pacing:
    item_delay_ms: 3000
ifeng_text:
  discovery:
    stall_policy: trigger-only
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.sina_text.target, 20);
        assert_eq!(config.sina_text.pacing.item_delay_ms, 3000);
        assert_eq!(config.sina_text.discovery.max_attempts, 3);
        assert_eq!(config.sina_text.http.timeout_secs, 10);
        assert_eq!(
            config.ifeng_text.discovery.stall_policy,
            StallPolicy::TriggerOnly
        );
        assert_eq!(config.ifeng_text.discovery.max_attempts, 10);
    }

    #[test]
    fn test_empty_patch_is_default() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.ifeng_images.pacing.image_delay_ms, 1000);
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let err = Config::from_yaml("sina_text:\n  target: lots\n").unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_limits_conversion() {
        let limits = Config::default().sina_text.limits();
        assert_eq!(limits.target_size, 100);
        assert_eq!(limits.settle_delay, Duration::from_millis(5000));
    }

    #[test]
    fn test_only_sina_skips_tls_verification() {
        let config = Config::default();
        assert!(config.sina_text.http.insecure);
        assert!(config.sina_images.http.insecure);
        assert!(!config.ifeng_text.http.insecure);
        assert!(!config.ifeng_images.http.insecure);
    }

    /// Adds `per_click` fresh articles on every trigger.
    struct Feed {
        visible: usize,
        per_click: usize,
    }

    impl PageSource for Feed {
        async fn snapshot(&mut self) -> Result<Vec<CandidateItem>, ScrapeError> {
            Ok((0..self.visible)
                .map(|i| CandidateItem::new(format!("https://mil.news.sina.com.cn/{i}.shtml"), "t"))
                .collect())
        }

        async fn trigger_more(&mut self) -> Result<(), ScrapeError> {
            self.visible += self.per_click;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sina_images_discovery_uses_full_click_budget() {
        let mut limits = Config::default().sina_images.limits();
        limits.settle_delay = Duration::ZERO;
        let mut feed = Feed {
            visible: 25,
            per_click: 25,
        };

        let found = discover(&mut feed, &limits).await;

        assert_eq!(found.state, DiscoveryState::Exhausted);
        assert_eq!(found.attempts_made, 10);
        assert_eq!(found.items.len(), 275);
    }

    #[tokio::test]
    async fn test_sina_text_discovery_stops_at_target() {
        let mut limits = Config::default().sina_text.limits();
        limits.settle_delay = Duration::ZERO;
        let mut feed = Feed {
            visible: 25,
            per_click: 50,
        };

        let found = discover(&mut feed, &limits).await;

        assert_eq!(found.state, DiscoveryState::Satisfied);
        assert_eq!(found.attempts_made, 2);
        assert_eq!(found.items.len(), 100);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraper.yaml");
        std::fs::write(&path, "ifeng_images:\n  target: 7\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.ifeng_images.target, 7);

        let missing = Config::load(Some(&dir.path().join("nope.yaml")));
        assert!(missing.is_err());
    }
}
