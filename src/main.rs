mod app;
mod cache;
mod config;
mod edge;
mod inventory;
mod logging;
mod products;
mod store;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use crate::inventory::InventoryFilter;
use crate::products::types::ProductDraft;
use crate::products::{is_valid_barcode, LookupSource};

#[derive(Parser, Debug)]
#[command(name = "larder")]
#[command(about = "Offline-first product cache and barcode lookup for kitchen inventory")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/larder/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Write logs to the data directory instead of stderr
  #[arg(long, global = true)]
  log_file: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Resolve a barcode to a product
  Lookup { barcode: String },

  /// Add a product by hand
  Add {
    barcode: String,
    name: String,
    #[arg(long)]
    brand: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    subcategory: Option<String>,
    #[arg(long)]
    supplier: Option<String>,
    /// Cost per unit
    #[arg(long)]
    cost: Option<f64>,
    /// Weight per container in pounds
    #[arg(long)]
    weight: Option<f64>,
    /// Container type, e.g. Bag or Can
    #[arg(long)]
    container: Option<String>,
    #[arg(long)]
    dry: bool,
  },

  /// Search known products by name, brand or barcode
  Search {
    query: String,
    #[arg(long)]
    category: Option<String>,
  },

  /// Add containers of a product to stock
  Stock { barcode: String, quantity: f64 },

  /// List stock on hand
  Inventory {
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    supplier: Option<String>,
  },

  /// Show cache and store statistics
  Stats,

  /// Queue a change for the next sync
  Queue {
    method: String,
    url: String,
    /// JSON request body
    #[arg(long)]
    body: Option<String>,
  },

  /// Replay queued changes
  Sync {
    #[arg(long, default_value = edge::SYNC_TAG)]
    tag: String,
  },

  /// Precache the asset manifest and activate the current cache generation
  Warm,

  /// Fetch a path through the edge cache
  Fetch {
    path: String,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init(args.log_file)?;

  let config = config::Config::load(args.config.as_deref())?;
  let app = app::App::new(config)?;

  match args.command {
    Command::Lookup { barcode } => {
      if !is_valid_barcode(&barcode) {
        return Err(eyre!("'{}' is not a valid barcode (8 or more digits)", barcode));
      }
      match app.lookup(&barcode).await {
        Some(lookup) => {
          let source = match lookup.source {
            LookupSource::Memory => "memory cache".to_string(),
            LookupSource::LocalTable => "local table".to_string(),
            LookupSource::External(name) => name.to_string(),
          };
          println!("{}", serde_json::to_string_pretty(&lookup.product)?);
          eprintln!("source: {}", source);
        }
        None => {
          println!(
            "No product found for {}. Add it with `larder add {} <name>`.",
            barcode, barcode
          );
        }
      }
    }
    Command::Add {
      barcode,
      name,
      brand,
      category,
      subcategory,
      supplier,
      cost,
      weight,
      container,
      dry,
    } => {
      let mut draft = ProductDraft::new(barcode);
      draft.name = Some(name);
      draft.brand = brand;
      draft.category = category;
      draft.subcategory = subcategory;
      draft.supplier = supplier;
      draft.cost_per_unit = cost;
      draft.weight_per_container = weight;
      draft.container_type = container;
      draft.is_dry_good = Some(dry);

      let product = app.add_product(draft)?;
      println!("{}", serde_json::to_string_pretty(&product)?);
    }
    Command::Search { query, category } => {
      let results = app.search(&query, category.as_deref());
      if results.is_empty() {
        println!("No products match '{}'", query);
      }
      for product in results {
        println!(
          "{:<14} {:<32} {:<12} {}",
          product.barcode, product.name, product.category, product.supplier
        );
      }
    }
    Command::Stock { barcode, quantity } => {
      let item = app.stock(&barcode, quantity).await?;
      println!(
        "{}: {} x {} ({:.2} lbs)",
        item.name, item.quantity, item.container_type, item.total_weight_lbs
      );
    }
    Command::Inventory { category, supplier } => {
      let items = app.inventory(&InventoryFilter { category, supplier })?;
      for item in items {
        println!(
          "{:<14} {:<32} {:>8} {:<10} {:>10.2} lbs",
          item.id, item.name, item.quantity, item.container_type, item.total_weight_lbs
        );
      }
    }
    Command::Stats => {
      let stats = app.stats()?;
      println!("store:            {}", if stats.durable { "sqlite" } else { "memory" });
      println!("products:         {}", stats.products);
      println!("pending changes:  {}", stats.pending_changes);
      println!(
        "memory cache:     {}/{} entries, {} accesses, avg age {:.1}s",
        stats.cache.size,
        stats.cache.max_size,
        stats.cache.total_accesses,
        stats.cache.average_age_seconds
      );
      match stats.last_sync {
        Some(payload) => println!(
          "last sync:        {} {}{}",
          payload.written_at().to_rfc3339(),
          payload.data,
          if stats.sync_stale { " (stale)" } else { "" }
        ),
        None => println!("last sync:        never"),
      }
    }
    Command::Queue { method, url, body } => {
      let body = body
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| eyre!("Failed to parse body as JSON: {}", e))?;
      let change = app.queue_change(&method, &url, body)?;
      println!("Queued {} {} ({})", change.method, change.url, change.id);
    }
    Command::Sync { tag } => {
      let report = app.sync(&tag).await?;
      println!("Replayed {}, failed {}", report.replayed, report.failed);
    }
    Command::Warm => {
      app.warm().await?;
      println!("Edge cache ready");
    }
    Command::Fetch { path, navigate } => {
      let response = app.fetch(&path, navigate).await?;
      eprintln!("{} {}", response.status, response.url);
      println!("{}", response.text());
    }
  }

  Ok(())
}
