mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    cmd_add, cmd_clear, cmd_compare, cmd_list, cmd_price_add, cmd_price_import,
    cmd_recipe_add_ingredient, cmd_recipe_cost, cmd_recipe_create, cmd_recipe_delete,
    cmd_recipe_import, cmd_recipe_list, cmd_recipe_shop, cmd_recipe_show, cmd_remove, cmd_rename,
    cmd_set_checked, cmd_set_quantity, cmd_set_total,
};
use crate::config::Config;
use basket_core::service::ShoppingService;

#[derive(Parser)]
#[command(
    name = "basket",
    version,
    about = "A local-first shopping list and grocery price comparison CLI",
    long_about = "\n\n  ██████╗  █████╗ ███████╗██╗  ██╗███████╗████████╗
  ██╔══██╗██╔══██╗██╔════╝██║ ██╔╝██╔════╝╚══██╔══╝
  ██████╔╝███████║███████╗█████╔╝ █████╗     ██║
  ██╔══██╗██╔══██║╚════██║██╔═██╗ ██╔══╝     ██║
  ██████╔╝██║  ██║███████║██║  ██╗███████╗   ██║
  ╚═════╝ ╚═╝  ╚═╝╚══════╝╚═╝  ╚═╝╚══════╝   ╚═╝
            know what your groceries cost.
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the shopping list (grouped by recipe by default)
    List {
        /// Merge rows with the same name into one line each
        #[arg(long)]
        ungrouped: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an item to the shopping list
    Add {
        /// Item name
        name: String,
        /// Quantity with optional unit (e.g. "2", "2lb", "1.5 cups"; default: 1)
        quantity: Option<String>,
        /// Unit (overrides a unit given in the quantity)
        #[arg(short, long)]
        unit: Option<String>,
        /// Category (e.g. produce, dairy)
        #[arg(short, long)]
        category: Option<String>,
        /// Known price
        #[arg(long)]
        price: Option<f64>,
        /// Store the price is from
        #[arg(long)]
        store: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an item by ID (or ID prefix)
    Remove {
        /// Item ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check an item off
    Check {
        /// Item ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark an item as not yet bought
    Uncheck {
        /// Item ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename an item
    Rename {
        /// Item ID
        id: String,
        /// New name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the quantity of a single row
    SetQuantity {
        /// Item ID
        id: String,
        /// New quantity (values below 1 are raised to 1)
        quantity: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the total of a merged item, spreading the change over its rows
    SetTotal {
        /// Item name (case-insensitive)
        name: String,
        /// New total quantity
        total: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove every item from the list
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare stores by the cached prices of unchecked items
    Compare {
        /// ZIP code to restrict prices to
        #[arg(long)]
        zip: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record store prices
    Price {
        #[command(subcommand)]
        command: PriceCommands,
    },
    /// Manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum PriceCommands {
    /// Record a price for a list item or a recipe ingredient
    Add {
        /// Store (key like "walmart" or a name like "Whole Foods Market")
        store: String,
        /// Price per unit
        price: f64,
        /// List item ID (or ID prefix)
        #[arg(long, conflicts_with = "ingredient")]
        item: Option<String>,
        /// Ingredient name
        #[arg(long)]
        ingredient: Option<String>,
        /// ZIP code the price applies to
        #[arg(long)]
        zip: Option<String>,
        /// Product name at the store
        #[arg(long)]
        product: Option<String>,
        /// Unit price label (e.g. "$0.17/ct")
        #[arg(long)]
        unit_price: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import prices from a CSV file
    Import {
        /// Path to the CSV file
        file: std::path::PathBuf,
        /// Preview import without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create a new recipe
    Create {
        /// Recipe title
        title: String,
        /// Number of servings this recipe makes
        #[arg(short, long, default_value = "1")]
        servings: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an ingredient to a recipe
    AddIngredient {
        /// Recipe title or ID
        recipe: String,
        /// Ingredient name
        ingredient: String,
        /// Quantity (e.g. "2", "500g", "1.5 cups")
        quantity: String,
        /// Category (e.g. produce, dairy)
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recipe details
    Show {
        /// Recipe title or ID
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe
    Delete {
        /// Recipe title or ID
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a recipe from a Cooklang (.cook) file
    Import {
        /// Path to the .cook file
        file: std::path::PathBuf,
        /// Title override (defaults to metadata title or filename)
        #[arg(long)]
        title: Option<String>,
        /// Servings override (defaults to metadata servings)
        #[arg(long)]
        servings: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a recipe's ingredients to the shopping list
    Shop {
        /// Recipe title or ID
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rank stores by what a recipe costs there
    Cost {
        /// Recipe title or ID
        recipe: String,
        /// ZIP code (default: BASKET_DEFAULT_ZIP or 47906)
        #[arg(long)]
        zip: Option<String>,
        /// Servings to price for (default: 2)
        #[arg(long)]
        servings: Option<String>,
        /// Comma-separated store keys (default: all supported stores)
        #[arg(long)]
        stores: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let serving = matches!(cli.command, Commands::Serve { .. });
    init_tracing(if serving {
        "basket=info,basket_core=info,tower_http=info"
    } else {
        "warn"
    });

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let service = ShoppingService::new(&config.db_path.to_string_lossy())?
        .with_default_zip(&config.default_zip);
    let user = config.user_id.as_str();

    match cli.command {
        Commands::List { ungrouped, json } => cmd_list(&service, user, ungrouped, json),
        Commands::Add {
            name,
            quantity,
            unit,
            category,
            price,
            store,
            json,
        } => cmd_add(
            &service,
            user,
            &name,
            quantity.as_deref(),
            unit,
            category,
            price,
            store,
            json,
        ),
        Commands::Remove { id, json } => cmd_remove(&service, user, &id, json),
        Commands::Check { id, json } => cmd_set_checked(&service, user, &id, true, json),
        Commands::Uncheck { id, json } => cmd_set_checked(&service, user, &id, false, json),
        Commands::Rename { id, name, json } => cmd_rename(&service, user, &id, &name, json),
        Commands::SetQuantity { id, quantity, json } => {
            cmd_set_quantity(&service, user, &id, quantity, json)
        }
        Commands::SetTotal { name, total, json } => {
            cmd_set_total(&service, user, &name, total, json)
        }
        Commands::Clear { json } => cmd_clear(&service, user, json),
        Commands::Compare { zip, json } => cmd_compare(&service, user, zip.as_deref(), json),
        Commands::Price { command } => match command {
            PriceCommands::Add {
                store,
                price,
                item,
                ingredient,
                zip,
                product,
                unit_price,
                json,
            } => cmd_price_add(
                &service,
                user,
                &store,
                price,
                item.as_deref(),
                ingredient.as_deref(),
                zip.as_deref(),
                product,
                unit_price,
                json,
            ),
            PriceCommands::Import {
                file,
                dry_run,
                json,
            } => cmd_price_import(&service, &file, dry_run, json),
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Create {
                title,
                servings,
                json,
            } => cmd_recipe_create(&service, &title, servings, json),
            RecipeCommands::AddIngredient {
                recipe,
                ingredient,
                quantity,
                category,
                json,
            } => cmd_recipe_add_ingredient(
                &service,
                &recipe,
                &ingredient,
                &quantity,
                category.as_deref(),
                json,
            ),
            RecipeCommands::Show { recipe, json } => cmd_recipe_show(&service, &recipe, json),
            RecipeCommands::List { json } => cmd_recipe_list(&service, json),
            RecipeCommands::Delete { recipe, json } => cmd_recipe_delete(&service, &recipe, json),
            RecipeCommands::Import {
                file,
                title,
                servings,
                json,
            } => cmd_recipe_import(&service, &file, title, servings, json),
            RecipeCommands::Shop { recipe, json } => {
                cmd_recipe_shop(&service, user, &recipe, json)
            }
            RecipeCommands::Cost {
                recipe,
                zip,
                servings,
                stores,
                json,
            } => cmd_recipe_cost(
                &service,
                &recipe,
                zip.as_deref(),
                servings.as_deref(),
                stores.as_deref(),
                json,
            ),
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let (api_key, new_api_key) = if no_auth {
                (None, false)
            } else {
                let (key, new) = config.load_or_create_api_key()?;
                (Some(key), new)
            };
            server::start_server(service, port, &bind, api_key, new_api_key).await
        }
    }
}
