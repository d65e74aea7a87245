use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use food_core::{ApiClient, ClientConfig, FileStore, IdentityStore, User};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "food")]
#[command(about = "client for the food-ordering demo service", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reuse the stored identity or register a new user and store it
    Check,
    /// Register a new user without touching the stored identity
    CreateUser,
    /// Show a user's profile
    GetUser {
        #[arg(help = "User id, defaults to the stored one")]
        uid: Option<u32>,
    },
    /// List menus near the configured position
    Menu {
        #[arg(long, requires = "lng", allow_negative_numbers = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lng: Option<f64>,
    },
    /// Print a menu image as base64
    Image {
        #[arg(long, help = "Menu id, defaults to the configured demo menu")]
        mid: Option<u32>,
    },
    /// Update the stored user's name and payment card
    PutUser(PutUserArgs),
}

#[derive(Debug, Args)]
struct PutUserArgs {
    #[arg(long)]
    uid: Option<u32>,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long)]
    card_full_name: String,
    #[arg(long)]
    card_number: String,
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=12))]
    card_expire_month: u8,
    #[arg(long)]
    card_expire_year: u16,
    #[arg(long)]
    card_cvv: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .with_writer(std::io::stderr)
        .init();

    let client = Arc::new(ApiClient::from_config(&config)?);
    let store = FileStore::new(&config.store_path);

    // Ctrl-C tears down whatever call is in flight.
    tokio::spawn({
        let client = Arc::clone(&client);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                client.shutdown();
            }
        }
    });

    match cli.command {
        Commands::Check => {
            let identity = client.ensure_user(&store).await?;
            if identity.created {
                info!(uid = identity.uid, path = %store.path().display(), "user created and saved");
            } else {
                info!(uid = identity.uid, "user already exists");
            }
            println!("uid={}", identity.uid);
        }
        Commands::CreateUser => {
            let created = client.create_user().await?;
            println!("uid={}", created.uid);
        }
        Commands::GetUser { uid } => {
            let uid = resolve_uid(&client, &store, uid).await?;
            let user = client
                .get_user(uid)
                .await
                .ok_or_else(|| anyhow!("user {uid} not found"))?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Commands::Menu { lat, lng } => {
            adopt_stored_sid(&client, &store).await?;
            if let (Some(lat), Some(lng)) = (lat, lng) {
                client.set_location(food_core::Location { lat, lng }).await;
            }
            let menus = client
                .get_menu()
                .await
                .ok_or_else(|| anyhow!("could not fetch menus"))?;
            for menu in menus {
                println!(
                    "{:>4}  {:<24} {:>7.2}  {:>3} min  {}",
                    menu.mid, menu.name, menu.price, menu.delivery_time, menu.short_description
                );
            }
        }
        Commands::Image { mid } => {
            adopt_stored_sid(&client, &store).await?;
            let image = match mid {
                Some(mid) => client.get_menu_image(mid).await,
                None => client.get_image().await,
            };
            println!("{}", image.ok_or_else(|| anyhow!("no image available"))?);
        }
        Commands::PutUser(args) => {
            let uid = resolve_uid(&client, &store, args.uid).await?;
            let user = User {
                first_name: args.first_name,
                last_name: args.last_name,
                card_full_name: args.card_full_name,
                card_number: args.card_number,
                card_expire_month: args.card_expire_month,
                card_expire_year: args.card_expire_year,
                card_cvv: args.card_cvv,
                uid,
                last_oid: 0,
                order_status: String::new(),
            };
            let updated = client
                .put_user(uid, &user)
                .await
                .ok_or_else(|| anyhow!("update of user {uid} failed"))?;
            println!("uid={}", updated.uid);
        }
    }

    Ok(())
}

/// Prefer the stored token over the configured default.
async fn adopt_stored_sid(client: &ApiClient, store: &FileStore) -> anyhow::Result<()> {
    if let Some(sid) = store.load_sid().await? {
        client.set_sid(sid).await;
    }
    Ok(())
}

async fn resolve_uid(client: &ApiClient, store: &FileStore, uid: Option<u32>) -> anyhow::Result<u32> {
    adopt_stored_sid(client, store).await?;
    match uid {
        Some(uid) => Ok(uid),
        None => store
            .load_uid()
            .await?
            .context("no stored uid, run `food check` first or pass a uid"),
    }
}
