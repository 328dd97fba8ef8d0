//! Operator CLI: schema migrations, demo data and development tokens.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tracing::info;
use uuid::Uuid;

use storefront_api::{
    auth::{AuthConfig, AuthService},
    config::{self, AppConfig},
    db,
    entities::{
        coupon::{self, DiscountType},
        product, product_variant,
        promotion::{self, PromotionTarget, PromotionType},
        user::{self, UserRole},
    },
};

const DEMO_ADMIN_EMAIL: &str = "admin@storefront.local";
const DEMO_CUSTOMER_EMAIL: &str = "shopper@storefront.local";

#[derive(Parser)]
#[command(name = "storefront", about = "Storefront operator tooling", version)]
struct Cli {
    #[arg(long, global = true, help = "Override the configured database URL")]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Insert demo users, products, a coupon and a promotion
    Seed,
    /// Issue a bearer token for an existing user
    Token {
        #[arg(help = "User id to place in the token subject")]
        user_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), false);
    if let Some(url) = cli.database_url {
        cfg.database_url = url;
    }

    match cli.command {
        Commands::Migrate => {
            let db = connect(&cfg).await?;
            db::run_migrations(&db).await.context("migrations failed")?;
            println!("Migrations applied");
        }
        Commands::Seed => {
            let db = connect(&cfg).await?;
            db::run_migrations(&db).await.context("migrations failed")?;
            seed(&db).await?;
        }
        Commands::Token { user_id } => {
            let auth = AuthService::new(AuthConfig::from_app_config(&cfg));
            let token = auth
                .issue_token(user_id)
                .context("failed to issue token")?;
            println!("{}", token);
        }
    }

    Ok(())
}

async fn connect(cfg: &AppConfig) -> Result<DatabaseConnection> {
    db::establish_connection_from_app_config(cfg)
        .await
        .with_context(|| format!("failed to connect to {}", cfg.database_url))
}

async fn seed(db: &DatabaseConnection) -> Result<()> {
    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(DEMO_ADMIN_EMAIL))
        .one(db)
        .await?;
    if let Some(admin) = existing {
        println!("Demo data already present (admin {})", admin.id);
        return Ok(());
    }

    let now = Utc::now();
    let admin = insert_user(db, DEMO_ADMIN_EMAIL, "Store Admin", UserRole::Admin).await?;
    let shopper = insert_user(db, DEMO_CUSTOMER_EMAIL, "Demo Shopper", UserRole::Customer).await?;
    info!(admin = %admin.id, shopper = %shopper.id, "users created");

    let apparel = Uuid::new_v4();
    let mug = insert_product(db, "Enamel Mug", None, 1000, 50).await?;
    let tee = insert_product(db, "Logo Tee", Some(apparel), 2500, 0).await?;
    for (size, stock) in [("S", 10), ("M", 25), ("L", 5)] {
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(tee.id),
            sku: Set(format!("TEE-{}", size)),
            name: Set(format!("Logo Tee ({})", size)),
            price: Set(2500),
            stock: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;
    }
    info!(mug = %mug.id, tee = %tee.id, "catalog created");

    coupon::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set("SAVE10".to_string()),
        discount_type: Set(DiscountType::Percentage),
        discount_value: Set(1000),
        min_purchase_amount: Set(2000),
        max_discount_amount: Set(None),
        usage_limit: Set(Some(100)),
        times_used: Set(0),
        expires_at: Set(Some(now + Duration::days(90))),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;

    promotion::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Apparel week".to_string()),
        description: Set(Some("15% off apparel".to_string())),
        promotion_type: Set(PromotionType::PercentageDiscount),
        target_type: Set(PromotionTarget::Category),
        target_id: Set(Some(apparel)),
        discount_value: Set(1500),
        min_purchase_amount: Set(0),
        max_discount_amount: Set(None),
        start_date: Set(now),
        end_date: Set(now + Duration::days(7)),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;

    println!("Seeded demo data");
    println!("  admin    {} ({})", admin.id, admin.email);
    println!("  shopper  {} ({})", shopper.id, shopper.email);
    println!("  coupon   SAVE10 (10% off orders from 20.00)");
    Ok(())
}

async fn insert_user(
    db: &DatabaseConnection,
    email: &str,
    name: &str,
    role: UserRole,
) -> Result<user::Model> {
    Ok(user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        name: Set(name.to_string()),
        role: Set(role),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await?)
}

async fn insert_product(
    db: &DatabaseConnection,
    name: &str,
    category_id: Option<Uuid>,
    price: i64,
    stock: i32,
) -> Result<product::Model> {
    let now = Utc::now();
    Ok(product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        category_id: Set(category_id),
        price: Set(price),
        stock: Set(stock),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?)
}
