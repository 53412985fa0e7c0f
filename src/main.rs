use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use catalog_sync::catalog::blogs::BlogListArgs;
use catalog_sync::catalog::orders::OrderListArgs;
use catalog_sync::catalog::products::ProductListArgs;
use catalog_sync::catalog::OrderStatus;
use catalog_sync::config::Config;
use catalog_sync::{logging, CatalogClient, FetchError};

#[derive(Parser, Debug)]
#[command(name = "catalog-sync")]
#[command(about = "Query and edit the storefront catalog from the terminal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/catalog-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List the records of a resource
  List {
    resource: Resource,
    #[arg(short, long)]
    search: Option<String>,
    /// Product status filter
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    limit: Option<u32>,
  },
  /// Show one record
  Show { resource: Resource, id: String },
  /// Publish or unpublish a product, category or review
  Publish {
    resource: Resource,
    id: String,
    /// Unpublish instead
    #[arg(long)]
    off: bool,
  },
  /// Move an order to a new status
  SetOrderStatus { id: String, status: OrderStatus },
  /// Delete a record
  Delete { resource: Resource, id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Resource {
  Categories,
  Materials,
  Products,
  Blogs,
  Orders,
  Reviews,
  Customers,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _guard = logging::init(&config.log)?;
  info!(base_url = %config.api.base_url, "starting");

  let client = CatalogClient::from_config(&config)?;
  run(&client, args.command).await
}

async fn run(client: &CatalogClient, command: Command) -> Result<()> {
  match command {
    Command::List {
      resource,
      search,
      status,
      page,
      limit,
    } => match resource {
      Resource::Categories => print_json(&client.categories().await?),
      Resource::Materials => print_json(&client.materials().await?),
      Resource::Products => {
        let defaults = ProductListArgs::default();
        let args = ProductListArgs {
          search_term: search,
          status,
          page: page.unwrap_or(defaults.page),
          limit: limit.unwrap_or(defaults.limit),
          ..defaults
        };
        print_json(&client.products(&args).await?)
      }
      Resource::Blogs => print_json(&client.blogs(&BlogListArgs { page, limit }).await?),
      Resource::Orders => {
        let args = OrderListArgs {
          search_term: search,
          page,
          limit,
          sort: None,
        };
        print_json(&client.orders(&args).await?)
      }
      Resource::Reviews => print_json(&client.feedback().await?),
      Resource::Customers => print_json(&client.customers().await?),
    },
    Command::Show { resource, id } => match resource {
      Resource::Products => print_json(&client.product(&id).await?),
      Resource::Blogs => print_json(&client.blog(&id).await?),
      Resource::Orders => print_json(&client.order(&id).await?),
      Resource::Customers => print_json(&client.customer_orders(&id).await?),
      other => Err(eyre!("{:?} has no detail view, use list", other)),
    },
    Command::Publish { resource, id, off } => {
      let published = !off;
      let result = match resource {
        Resource::Products => client.set_product_published(&id, published).await,
        Resource::Categories => client.set_category_published(&id, published).await,
        Resource::Reviews => client.set_review_published(&id, published).await,
        other => return Err(eyre!("{:?} cannot be published", other)),
      };
      print_json(&result.map_err(write_failed)?)
    }
    Command::SetOrderStatus { id, status } => {
      let result = client.update_order_status(&id, status).await;
      print_json(&result.map_err(write_failed)?)
    }
    Command::Delete { resource, id } => {
      let result = match resource {
        Resource::Categories => client.delete_category(&id).await,
        Resource::Materials => client.delete_material(&id).await,
        Resource::Products => client.delete_product(&id).await,
        Resource::Blogs => client.delete_blog(&id).await,
        Resource::Customers => client.delete_customer(&id).await,
        other => return Err(eyre!("{:?} cannot be deleted", other)),
      };
      print_json(&result.map_err(write_failed)?)
    }
  }
}

/// Surface the backend's own message when it sent one.
fn write_failed(err: FetchError) -> color_eyre::Report {
  match err.server_message() {
    Some(message) => eyre!("{} ({})", message, err),
    None => eyre!(err),
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
