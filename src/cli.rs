use clap::{Parser, Subcommand};

use crate::cache::CacheKind;

#[derive(Parser)]
#[command(name = "cninfo-dl")]
#[command(about = "Download cninfo disclosure announcements for a stock, with response caching and resumable downloads")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Stock code to process (falls back to CNINFO_STOCK)
    pub stock_code: Option<String>,

    /// Category key or display-name filter (falls back to CNINFO_CATEGORY)
    pub category: Option<String>,

    /// Bypass the listing cache and stop each category at the first
    /// already-downloaded announcement
    #[arg(short, long)]
    pub incremental: bool,

    /// Match the category filter against display names exactly instead of by
    /// substring
    #[arg(long)]
    pub exact: bool,

    /// Download directory
    #[arg(short, long)]
    pub output: Option<String>,

    /// Cache directory
    #[arg(long)]
    pub cache_dir: Option<String>,

    /// Category catalog file (list-search.json)
    #[arg(long)]
    pub catalog: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show cached entry counts per kind
    Info,
    /// Remove cached entries
    Clear {
        /// Kind to clear (search, stock, announcement); clears everything
        /// when omitted
        kind: Option<String>,
    },
}

/// Inputs for one download run, after merging CLI arguments with the
/// `CNINFO_*` environment defaults.
#[derive(Debug)]
pub struct RunInputs {
    pub stock_code: String,
    pub category: Option<String>,
    pub incremental: bool,
}

impl Cli {
    /// Resolve the run inputs. Environment defaults (`CNINFO_STOCK`,
    /// `CNINFO_CATEGORY`, `CNINFO_INCREMENTAL`) apply only when no
    /// positional arguments were supplied.
    pub fn run_inputs(&self) -> Result<RunInputs, anyhow::Error> {
        match &self.stock_code {
            Some(stock_code) => Ok(RunInputs {
                stock_code: stock_code.clone(),
                category: self.category.clone(),
                incremental: self.incremental,
            }),
            None => Ok(RunInputs {
                stock_code: std::env::var("CNINFO_STOCK").ok().ok_or_else(|| {
                    anyhow::anyhow!("No stock code given; pass <stockCode> or set CNINFO_STOCK")
                })?,
                category: self.category.clone().or_else(|| std::env::var("CNINFO_CATEGORY").ok()),
                incremental: self.incremental || env_flag("CNINFO_INCREMENTAL"),
            }),
        }
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

pub fn parse_cache_kind(kind: &str) -> Result<CacheKind, anyhow::Error> {
    match kind.to_lowercase().as_str() {
        "search" | "top_search" => Ok(CacheKind::Search),
        "stock" => Ok(CacheKind::StockPage),
        "announcement" | "listing" => Ok(CacheKind::Announcement),
        other => Err(anyhow::anyhow!(
            "Unknown cache kind: {}. Supported kinds: search, stock, announcement",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cache_kind() {
        assert_eq!(parse_cache_kind("search").unwrap(), CacheKind::Search);
        assert_eq!(parse_cache_kind("Stock").unwrap(), CacheKind::StockPage);
        assert_eq!(
            parse_cache_kind("announcement").unwrap(),
            CacheKind::Announcement
        );
        assert!(parse_cache_kind("bogus").is_err());
    }

    #[test]
    fn test_positional_surface() {
        let cli = Cli::try_parse_from(["cninfo-dl", "601225", "年度报告", "--incremental"]).unwrap();
        assert_eq!(cli.stock_code.as_deref(), Some("601225"));
        assert_eq!(cli.category.as_deref(), Some("年度报告"));
        assert!(cli.incremental);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_env_defaults_only_without_positionals() {
        // One test body: these env vars are process-global and parallel
        // test threads must not interleave set/remove
        std::env::set_var("CNINFO_STOCK", "000001");
        std::env::set_var("CNINFO_CATEGORY", "半年度报告");
        std::env::set_var("CNINFO_INCREMENTAL", "1");

        // Positional stock code supplied: env defaults are ignored
        let cli = Cli::try_parse_from(["cninfo-dl", "601225"]).unwrap();
        let inputs = cli.run_inputs().unwrap();
        assert_eq!(inputs.stock_code, "601225");
        assert_eq!(inputs.category, None);
        assert!(!inputs.incremental);

        // No positionals: everything falls back to the environment
        let cli = Cli::try_parse_from(["cninfo-dl"]).unwrap();
        let inputs = cli.run_inputs().unwrap();
        assert_eq!(inputs.stock_code, "000001");
        assert_eq!(inputs.category.as_deref(), Some("半年度报告"));
        assert!(inputs.incremental);

        std::env::remove_var("CNINFO_STOCK");
        std::env::remove_var("CNINFO_CATEGORY");
        std::env::remove_var("CNINFO_INCREMENTAL");

        // Neither positionals nor environment: the run cannot start
        let cli = Cli::try_parse_from(["cninfo-dl"]).unwrap();
        assert!(cli.run_inputs().is_err());
    }

    #[test]
    fn test_cache_subcommand() {
        let cli = Cli::try_parse_from(["cninfo-dl", "cache", "clear", "stock"]).unwrap();
        match cli.command {
            Some(Commands::Cache {
                action: CacheAction::Clear { kind },
            }) => assert_eq!(kind.as_deref(), Some("stock")),
            _ => panic!("expected cache clear subcommand"),
        }
    }
}
