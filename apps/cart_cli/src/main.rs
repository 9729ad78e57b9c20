use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    CartClient, ClientOptions, CredentialSource, EnvCredential, RenderedCart, StaticCredential,
    SubmitPolicy,
};
use shared::{domain::CustomerDetails, protocol::CatalogProduct};
use storage::SqliteCartStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, normalize_api_base, normalize_database_url, Settings};

#[derive(Parser, Debug)]
#[command(name = "cart", about = "Storefront shopping cart")]
struct Cli {
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    /// Order credential; falls back to the configured token variable.
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    submit_policy: Option<SubmitPolicy>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the cart.
    Show,
    Add {
        product: String,
        price: u64,
    },
    Inc {
        index: usize,
    },
    Dec {
        index: usize,
    },
    Set {
        index: usize,
        /// Read like a form field: `-4` or `abc` become 1.
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    Clear,
    /// List the catalog.
    Catalog,
    /// Add the n-th catalog product (1-based) to the cart.
    Buy {
        number: usize,
    },
    Submit {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        address: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    apply_cli_overrides(&mut settings, &cli);

    let api_base = normalize_api_base(&settings.api_base)?;
    let database_url = normalize_database_url(&settings.database_url);
    let store = SqliteCartStore::with_key(&database_url, settings.cart_key.clone())
        .await
        .with_context(|| format!("failed to open cart store at '{database_url}'"))?;
    info!(%database_url, %api_base, policy = %settings.submit_policy, "cart store ready");

    let client = CartClient::open(
        Arc::new(store),
        ClientOptions {
            api_base,
            submit_policy: settings.submit_policy,
            request_timeout: settings.request_timeout(),
        },
    )
    .await;

    let rendered = match cli.command {
        Command::Show => client.latest(),
        Command::Add { product, price } => client.add(&product, price).await,
        Command::Inc { index } => match client.latest().row(index) {
            Some(row) => client.dispatch(row.increment, "").await,
            None => missing_row(&client, index),
        },
        Command::Dec { index } => match client.latest().row(index) {
            Some(row) => client.dispatch(row.decrement, "").await,
            None => missing_row(&client, index),
        },
        Command::Set { index, value } => match client.latest().row(index) {
            Some(row) => client.dispatch(row.quantity_input, &value).await,
            None => missing_row(&client, index),
        },
        Command::Clear => client.clear().await,
        Command::Catalog => {
            let products = client.catalog().await;
            if products.is_empty() {
                println!("(catalog unavailable or empty)");
            }
            for (position, product) in products.iter().enumerate() {
                println!("{:>3}. {}  ${}", position + 1, product.nombre, product.precio);
                if let Some(description) = &product.descripcion {
                    println!("     {description}");
                }
            }
            client.latest()
        }
        Command::Buy { number } => {
            let products = client.catalog().await;
            let product = pick_product(&products, number)?;
            let rendered = client.add_product(product).await;
            println!("{} added to the cart", product.nombre);
            rendered
        }
        Command::Submit {
            name,
            phone,
            address,
        } => {
            let credentials = credential_source(&cli.token, &settings);
            let customer = CustomerDetails::new(name, phone, address);
            match client.submit(&customer, credentials.as_ref()).await {
                Ok(receipt) => {
                    println!(
                        "Order sent: {} item(s), total ${} at {}",
                        receipt.item_count,
                        receipt.total,
                        receipt.submitted_at.to_rfc3339()
                    );
                    if receipt.discarded_edits {
                        println!("Changes made while the order was sending were cleared too.");
                    }
                    client.latest()
                }
                Err(err) => {
                    print_cart(&client.latest());
                    return Err(anyhow!(err).context("order was not sent"));
                }
            }
        }
    };

    print_cart(&rendered);
    Ok(())
}

fn apply_cli_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(v) = &cli.api_base {
        settings.api_base = v.clone();
    }
    if let Some(v) = &cli.database_url {
        settings.database_url = v.clone();
    }
    if let Some(v) = cli.submit_policy {
        settings.submit_policy = v;
    }
}

fn credential_source(token: &Option<String>, settings: &Settings) -> Box<dyn CredentialSource> {
    match token {
        Some(token) => Box::new(StaticCredential::new(token.clone())),
        None => Box::new(EnvCredential::new(settings.token_env.clone())),
    }
}

/// `number` is the 1-based position shown by `cart catalog`.
fn pick_product(products: &[CatalogProduct], number: usize) -> Result<&CatalogProduct> {
    number
        .checked_sub(1)
        .and_then(|position| products.get(position))
        .ok_or_else(|| anyhow!("catalog has no product number {number}"))
}

fn missing_row(client: &CartClient, index: usize) -> RenderedCart {
    println!("cart has no row {index}; nothing changed");
    client.latest()
}

fn print_cart(rendered: &RenderedCart) {
    println!("{rendered}");
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
