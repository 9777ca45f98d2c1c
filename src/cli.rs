//! Command-line interface definitions.
//!
//! One subcommand per scraper. Global flags choose where output lands and
//! override the matching values of the loaded configuration.

use crate::config::ScraperConfig;
use crate::discovery::StallPolicy;
use crate::scrapers::ScraperKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the military news scrapers.
///
/// # Examples
///
/// ```sh
/// # 100 Sina articles into ./test, paths into ./test.xlsx
/// mil_news_scraper sina-text
///
/// # 30 ifeng gallery images, with a JSON manifest
/// mil_news_scraper --target 30 --manifest run.json ifeng-images
///
/// # Watch the browser while it works
/// mil_news_scraper --headed sina-images
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory saved files are written to
    #[arg(short, long, env = "MIL_SCRAPER_OUTPUT_DIR", default_value = "test", global = true)]
    pub output_dir: String,

    /// Path of the spreadsheet listing every saved file
    #[arg(short, long, env = "MIL_SCRAPER_TABLE", default_value = "test.xlsx", global = true)]
    pub table: PathBuf,

    /// Optional path to a YAML configuration file
    #[arg(short, long, env = "MIL_SCRAPER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Also write a JSON manifest of the run here
    #[arg(short, long, global = true)]
    pub manifest: Option<PathBuf>,

    /// Number of articles (text) or images (images) to save
    #[arg(long, global = true)]
    pub target: Option<usize>,

    /// Show the browser window instead of running headless
    #[arg(long, global = true)]
    pub headed: bool,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Chromium executable to launch
    #[arg(long, env = "CHROME", global = true)]
    pub chrome_path: Option<PathBuf>,

    /// Whether a load-more click that surfaces nothing new counts as a failure
    #[arg(long, value_enum, global = true)]
    pub stall_policy: Option<StallPolicy>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Save article text from the Sina military feed
    SinaText,
    /// Save article images from the Sina military feed
    SinaImages,
    /// Save article text from the ifeng military news stream
    IfengText,
    /// Save gallery images from the ifeng original-picture channel
    IfengImages,
}

impl Command {
    pub fn kind(self) -> ScraperKind {
        match self {
            Command::SinaText => ScraperKind::SinaText,
            Command::SinaImages => ScraperKind::SinaImages,
            Command::IfengText => ScraperKind::IfengText,
            Command::IfengImages => ScraperKind::IfengImages,
        }
    }
}

impl Cli {
    /// Apply the flags that were given on top of `config`.
    pub fn apply_overrides(&self, config: &mut ScraperConfig) {
        if let Some(target) = self.target {
            config.target = target;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if self.insecure {
            config.http.insecure = true;
        }
        if let Some(path) = &self.chrome_path {
            config.browser.chrome_path = Some(path.clone());
        }
        if let Some(policy) = self.stall_policy {
            config.discovery.stall_policy = policy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["mil_news_scraper", "sina-text"]);

        assert_eq!(cli.command, Command::SinaText);
        assert_eq!(cli.output_dir, "test");
        assert_eq!(cli.table, PathBuf::from("test.xlsx"));
        assert!(cli.manifest.is_none());
        assert!(!cli.headed);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "mil_news_scraper",
            "ifeng-images",
            "-o",
            "/tmp/pics",
            "--target",
            "30",
            "--manifest",
            "run.json",
        ]);

        assert_eq!(cli.command.kind(), ScraperKind::IfengImages);
        assert_eq!(cli.output_dir, "/tmp/pics");
        assert_eq!(cli.target, Some(30));
        assert_eq!(cli.manifest, Some(PathBuf::from("run.json")));
    }

    #[test]
    fn test_overrides_apply_only_given_flags() {
        let cli = Cli::parse_from([
            "mil_news_scraper",
            "--headed",
            "--stall-policy",
            "count-empty-yield",
            "--target",
            "5",
            "sina-images",
        ]);
        let mut config = Config::default().sina_images;
        cli.apply_overrides(&mut config);

        assert_eq!(config.target, 5);
        assert!(!config.browser.headless);
        assert_eq!(config.pacing.item_delay_ms, 500);
        assert_eq!(config.discovery.stall_policy, StallPolicy::CountEmptyYield);
        assert_eq!(config.discovery.max_attempts, 10);
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["mil_news_scraper"]).is_err());
    }
}
