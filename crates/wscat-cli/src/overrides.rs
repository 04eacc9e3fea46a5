use std::fmt::Write as _;
use std::path::PathBuf;

use clap::Subcommand;
use wscat_catalog::overrides::{parse_feed_file, FeedLayout, ParsedFeed};
use wscat_core::AppConfig;

#[derive(Debug, Subcommand)]
pub enum OverridesCommands {
    /// Parse the override feed and report what the storefront would see
    Check {
        /// Feed to check instead of `WSCAT_OVERRIDE_FEED_PATH`
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

pub(crate) async fn run(config: &AppConfig, command: OverridesCommands) -> anyhow::Result<()> {
    match command {
        OverridesCommands::Check { path } => {
            let path = path.unwrap_or_else(|| config.override_feed_path.clone());
            run_check(path).await
        }
    }
}

async fn run_check(path: PathBuf) -> anyhow::Result<()> {
    if !path.exists() {
        println!(
            "no override feed at {}; storefront prices come from the catalog",
            path.display()
        );
        return Ok(());
    }
    let display = path.display().to_string();
    let parsed = tokio::task::spawn_blocking(move || parse_feed_file(&path)).await??;
    print!("{}", format_feed_report(&display, &parsed));
    Ok(())
}

pub(crate) fn format_feed_report(path: &str, feed: &ParsedFeed) -> String {
    let layout = match feed.layout {
        FeedLayout::Named => "named columns",
        FeedLayout::Positional => "positional columns",
    };
    let price_only = feed
        .entries
        .values()
        .filter(|e| e.price.is_some() && e.in_stock.is_none())
        .count();
    let stock_only = feed
        .entries
        .values()
        .filter(|e| e.price.is_none() && e.in_stock.is_some())
        .count();
    let out_of_stock = feed
        .entries
        .values()
        .filter(|e| e.in_stock == Some(false))
        .count();

    let mut out = String::new();
    let _ = writeln!(out, "feed:               {path}");
    let _ = writeln!(out, "layout:             {layout}");
    let _ = writeln!(out, "rows:               {}", feed.stats.rows);
    let _ = writeln!(out, "entries:            {}", feed.entries.len());
    let _ = writeln!(out, "  price only:       {price_only}");
    let _ = writeln!(out, "  stock only:       {stock_only}");
    let _ = writeln!(out, "  out of stock:     {out_of_stock}");
    let _ = writeln!(out, "skipped rows:       {}", feed.stats.skipped_rows);
    let _ = writeln!(out, "unparseable prices: {}", feed.stats.unparseable_prices);
    let _ = writeln!(out, "unrecognized stock: {}", feed.stats.unrecognized_stock);
    if feed.stats.unrecognized_stock > 0 {
        out.push_str("warning: unrecognized stock values are treated as in stock\n");
    }
    out
}
