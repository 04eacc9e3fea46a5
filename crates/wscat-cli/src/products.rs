use std::fmt::Write as _;
use std::sync::Arc;

use clap::Subcommand;
use rust_decimal::Decimal;
use wscat_catalog::{CatalogQueryService, OverrideCache, ProductPage, ProductQuery};
use wscat_core::{AppConfig, MergedProduct};
use wscat_db::{CatalogStore, PgCatalogStore};

#[derive(Debug, Subcommand)]
pub enum ProductsCommands {
    /// List one page of the catalog with overrides applied
    Query {
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
        #[arg(long)]
        category: Option<String>,
        /// Free-text search over name, category and description
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        min_price: Option<Decimal>,
        #[arg(long)]
        max_price: Option<Decimal>,
        /// `best_match`, `price_asc` or `price_desc`
        #[arg(long)]
        sort: Option<String>,
    },
    /// Show one product by id
    Show { id: String },
}

pub(crate) async fn run(config: &AppConfig, command: ProductsCommands) -> anyhow::Result<()> {
    let pool = crate::connect(config).await?;
    let store: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool));
    let overrides = Arc::new(OverrideCache::new(&config.override_feed_path));
    let service = CatalogQueryService::from_config(store, overrides, config);

    match command {
        ProductsCommands::Query {
            page,
            page_size,
            category,
            search,
            min_price,
            max_price,
            sort,
        } => {
            let query = ProductQuery {
                page,
                page_size,
                category,
                search,
                min_price,
                max_price,
                sort,
            };
            let result = service.query_products(&query).await?;
            if result.total == 0 {
                println!("no products found; run `sync full` first or widen the filters");
                return Ok(());
            }
            print!("{}", format_product_page(&result));
        }
        ProductsCommands::Show { id } => match service.get_product_by_id(&id).await? {
            Some(product) => print!("{}", format_product_detail(&product)),
            None => anyhow::bail!("product not found: {id}"),
        },
    }
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(width.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

pub(crate) fn format_product_page(page: &ProductPage) -> String {
    let mut out = format!(
        "{:<24}{:<42}{:<18}{:>10}  {:<6}\n",
        "ID", "NAME", "CATEGORY", "PRICE", "STOCK"
    );
    for product in &page.items {
        let _ = writeln!(
            out,
            "{:<24}{:<42}{:<18}{:>10}  {:<6}",
            truncate(&product.id, 22),
            truncate(&product.name, 40),
            truncate(&product.category, 16),
            format!("{:.2}", product.price),
            if product.in_stock { "yes" } else { "no" }
        );
    }
    let _ = writeln!(
        out,
        "page {} ({} per page), {} of {} products",
        page.page,
        page.page_size,
        page.items.len(),
        page.total
    );
    out
}

pub(crate) fn format_product_detail(product: &MergedProduct) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "id:          {}", product.id);
    let _ = writeln!(out, "name:        {}", product.name);
    if !product.brand.is_empty() {
        let _ = writeln!(out, "brand:       {}", product.brand);
    }
    let _ = writeln!(out, "category:    {}", product.category);
    let _ = writeln!(out, "price:       {:.2}", product.price);
    let _ = writeln!(
        out,
        "in stock:    {}",
        if product.in_stock { "yes" } else { "no" }
    );
    if !product.flavours.is_empty() {
        let _ = writeln!(out, "flavours:    {}", product.flavours.join(", "));
    }
    let _ = writeln!(out, "members:     {}", product.member_skus.join(", "));
    let _ = writeln!(out, "images:      {}", product.images.len());
    if let Some(description) = &product.description {
        let _ = writeln!(out, "description: {}", truncate(description, 200));
    }
    out
}
