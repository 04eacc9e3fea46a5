use chrono::{TimeZone, Utc};
use uuid::Uuid;
use wscat_catalog::SyncPreview;
use wscat_core::{SyncRun, SyncRunStatus, SyncRunType, TriggerSource};

use super::*;

fn sample_run(status: SyncRunStatus, error_message: Option<&str>) -> SyncRun {
    SyncRun {
        id: 42,
        public_id: Uuid::nil(),
        run_type: SyncRunType::Incremental,
        trigger_source: TriggerSource::Scheduler,
        status,
        started_at: Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap(),
        completed_at: None,
        fetched_count: 120,
        upserted_count: 40,
        error_count: 1,
        skipped_count: 3,
        error_message: error_message.map(str::to_string),
    }
}

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["wscat-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["wscat-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["wscat-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn sync_full_defaults_to_a_real_run() {
    let cli = Cli::try_parse_from(["wscat-cli", "sync", "full"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::Full { dry_run: false }
        })
    ));
}

#[test]
fn sync_incremental_accepts_dry_run() {
    let cli = Cli::try_parse_from(["wscat-cli", "sync", "incremental", "--dry-run"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::Incremental { dry_run: true }
        })
    ));
}

#[test]
fn sync_stock_parses() {
    let cli = Cli::try_parse_from(["wscat-cli", "sync", "stock"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::Stock { dry_run: false }
        })
    ));
}

#[test]
fn sync_status_limit_defaults_to_20() {
    let cli = Cli::try_parse_from(["wscat-cli", "sync", "status"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::Status { limit: 20 }
        })
    ));
}

#[test]
fn sync_status_with_custom_limit() {
    let cli = Cli::try_parse_from(["wscat-cli", "sync", "status", "--limit", "5"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: SyncCommands::Status { limit: 5 }
        })
    ));
}

#[test]
fn unknown_sync_type_is_rejected() {
    assert!(Cli::try_parse_from(["wscat-cli", "sync", "weekly"]).is_err());
}

#[test]
fn overrides_check_without_path_uses_config() {
    let cli = Cli::try_parse_from(["wscat-cli", "overrides", "check"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Overrides {
            command: OverridesCommands::Check { path: None }
        })
    ));
}

#[test]
fn overrides_check_with_path() {
    let cli = Cli::try_parse_from([
        "wscat-cli",
        "overrides",
        "check",
        "--path",
        "/tmp/feed.csv",
    ])
    .unwrap();
    match cli.command {
        Some(Commands::Overrides {
            command: OverridesCommands::Check { path: Some(path) },
        }) => assert_eq!(path, std::path::PathBuf::from("/tmp/feed.csv")),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn products_query_parses_filters() {
    let cli = Cli::try_parse_from([
        "wscat-cli",
        "products",
        "query",
        "--search",
        "whey isolate",
        "--min-price",
        "5",
        "--max-price",
        "30.50",
        "--sort",
        "price_asc",
        "--page",
        "2",
    ])
    .unwrap();
    match cli.command {
        Some(Commands::Products {
            command:
                ProductsCommands::Query {
                    page,
                    page_size,
                    category,
                    search,
                    min_price,
                    max_price,
                    sort,
                },
        }) => {
            assert_eq!(page, Some(2));
            assert_eq!(page_size, None);
            assert_eq!(category, None);
            assert_eq!(search.as_deref(), Some("whey isolate"));
            assert_eq!(min_price.map(|p| p.to_string()).as_deref(), Some("5"));
            assert_eq!(max_price.map(|p| p.to_string()).as_deref(), Some("30.50"));
            assert_eq!(sort.as_deref(), Some("price_asc"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn products_query_rejects_non_numeric_price() {
    assert!(
        Cli::try_parse_from(["wscat-cli", "products", "query", "--min-price", "cheap"]).is_err()
    );
}

#[test]
fn products_show_requires_id() {
    assert!(Cli::try_parse_from(["wscat-cli", "products", "show"]).is_err());
    let cli = Cli::try_parse_from(["wscat-cli", "products", "show", "fam-1a2b"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Products {
            command: ProductsCommands::Show { ref id }
        }) if id == "fam-1a2b"
    ));
}

#[test]
fn run_summary_includes_counts_and_error() {
    let line = sync::format_run_summary(&sample_run(
        SyncRunStatus::Failed,
        Some("run timed out after 900s"),
    ));
    assert_eq!(
        line,
        "sync run 42 (incremental) failed: fetched 120, upserted 40, errors 1, skipped 3 \
         (run timed out after 900s)"
    );
}

#[test]
fn run_table_has_header_and_one_row_per_run() {
    let table = sync::format_run_table(&[
        sample_run(SyncRunStatus::Success, None),
        sample_run(SyncRunStatus::Partial, None),
    ]);
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("ID"));
    assert!(lines[1].starts_with("42"));
    assert!(lines[1].contains("incremental"));
    assert!(lines[1].contains("scheduler"));
    assert!(lines[1].contains("2026-03-01 06:00:00"));
    assert!(lines[2].contains("partial"));
}

#[test]
fn stock_preview_reports_signals() {
    let preview = SyncPreview {
        run_type: Some(SyncRunType::Stock),
        fetched: 10,
        writes: 7,
        inert_signals: 3,
        ..SyncPreview::default()
    };
    assert_eq!(
        sync::format_preview(&preview),
        "dry-run: stock run would apply 7 of 10 signals (3 carry no price or stock)\n"
    );
}

#[test]
fn catalog_preview_reports_merge_counts() {
    let preview = SyncPreview {
        run_type: Some(SyncRunType::Full),
        fetched: 12,
        rejected: 1,
        merged_groups: 2,
        writes: 6,
        ..SyncPreview::default()
    };
    let text = sync::format_preview(&preview);
    assert!(text.starts_with("dry-run: full run would upsert 6 products from 12 records"));
    assert!(text.contains("rejected: 1"));
    assert!(text.contains("merged groups: 2"));
}
