//! Seed the database with a sample catalog and users.
//!
//! Reads a YAML file of users and products and inserts whatever is not
//! there yet, so the command can be re-run safely. Products are written
//! straight through the repository and do not trigger the new product
//! fan-out.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use orchard_api::db::ProductRepository;
use orchard_api::models::NewProduct;
use orchard_api::store::ProductStore;
use orchard_core::{Email, Price, StockLevel, UserRole};

/// Top-level seed file.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    /// Whether to create a settings row with new product mail on.
    #[serde(default = "default_true")]
    pub subscribed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    pub price: Decimal,
    pub stock: u32,
    pub category: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
}

const fn default_true() -> bool {
    true
}

/// Counts reported after seeding.
#[derive(Debug, Default)]
struct SeedResult {
    inserted: usize,
    skipped: usize,
    errors: Vec<(String, String)>,
}

/// Check a seed file before touching the database. Returns one message per problem.
fn validate(seed: &SeedFile) -> Vec<String> {
    let mut errors = Vec::new();
    for user in &seed.users {
        if let Some(email) = &user.email {
            if Email::parse(email).is_err() {
                errors.push(format!("user {}: invalid email {email}", user.first_name));
            }
        }
    }
    for product in &seed.products {
        if product.name.trim().is_empty() || product.category.trim().is_empty() {
            errors.push(format!("product {:?}: name and category are required", product.name));
        }
        if Price::new(product.price).is_err() {
            errors.push(format!("product {}: negative price", product.name));
        }
        if i32::try_from(product.stock).is_err() {
            errors.push(format!("product {}: stock too large", product.name));
        }
    }
    errors
}

/// Seed users and products from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails validation,
/// or the database is unreachable.
pub async fn catalog(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading seed data from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let seed: SeedFile = serde_yaml::from_str(&content)?;

    info!(
        users = seed.users.len(),
        products = seed.products.len(),
        "Parsed seed file"
    );

    let errors = validate(&seed);
    if !errors.is_empty() {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = super::connect().await?;

    let users = seed_users(&pool, &seed.users).await?;
    let products = seed_products(&pool, seed.products).await?;

    // Print summary
    info!("Seeding complete!");
    info!("  Users inserted: {}, skipped: {}", users.inserted, users.skipped);
    info!(
        "  Products inserted: {}, skipped: {}",
        products.inserted, products.skipped
    );

    for (what, err) in users.errors.iter().chain(&products.errors) {
        error!("    - {what}: {err}");
    }

    Ok(())
}

async fn seed_users(
    pool: &sqlx::PgPool,
    users: &[SeedUser],
) -> Result<SeedResult, sqlx::Error> {
    let mut result = SeedResult::default();

    for user in users {
        let email = user
            .email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .ok()
            .flatten();

        // Accounts without an email never conflict on it; match them by name
        if email.is_none() {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM users WHERE email IS NULL AND first_name = $1 AND last_name = $2)",
            )
            .bind(&user.first_name)
            .bind(&user.last_name)
            .fetch_one(pool)
            .await?;
            if exists {
                result.skipped += 1;
                continue;
            }
        }

        let inserted: Option<i64> = sqlx::query_scalar(
            r"
            INSERT INTO users (first_name, last_name, email, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO NOTHING
            RETURNING id
            ",
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(email.as_ref())
        .bind(user.role)
        .fetch_optional(pool)
        .await?;

        let Some(user_id) = inserted else {
            result.skipped += 1;
            continue;
        };

        if user.subscribed {
            sqlx::query(
                "INSERT INTO user_notification_settings (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(user_id)
            .execute(pool)
            .await?;
        }
        result.inserted += 1;
    }

    Ok(result)
}

async fn seed_products(
    pool: &sqlx::PgPool,
    products: Vec<SeedProduct>,
) -> Result<SeedResult, sqlx::Error> {
    let repository = ProductRepository::new(pool.clone());
    let mut result = SeedResult::default();

    for product in products {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE name = $1)")
                .bind(&product.name)
                .fetch_one(pool)
                .await?;
        if exists {
            result.skipped += 1;
            continue;
        }

        let Ok(price) = Price::new(product.price) else {
            result.errors.push((product.name, "negative price".to_owned()));
            continue;
        };
        let name = product.name.clone();
        match repository
            .create(NewProduct {
                name: product.name,
                price,
                stock: StockLevel::new(product.stock),
                category: product.category,
                image_url: product.image_url,
                description: product.description,
            })
            .await
        {
            Ok(_) => result.inserted += 1,
            Err(e) => result.errors.push((name, e.to_string())),
        }
    }

    Ok(result)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_validate_seed_file() {
        let seed: SeedFile = serde_yaml::from_str(
            r"
users:
  - first_name: Ada
    email: ada@example.com
    role: admin
  - first_name: Oauth
    subscribed: false
products:
  - name: Mango
    price: '2.50'
    stock: 10
    category: Tropical
",
        )
        .unwrap();

        assert_eq!(seed.users.len(), 2);
        assert_eq!(seed.users[0].role, UserRole::Admin);
        assert!(seed.users[0].subscribed);
        assert!(!seed.users[1].subscribed);
        assert_eq!(seed.products[0].price, Decimal::new(250, 2));
        assert!(validate(&seed).is_empty());
    }

    #[test]
    fn test_validate_reports_bad_rows() {
        let seed = SeedFile {
            users: vec![SeedUser {
                first_name: "Bad".to_owned(),
                last_name: String::new(),
                email: Some("nope".to_owned()),
                role: UserRole::Customer,
                subscribed: true,
            }],
            products: vec![SeedProduct {
                name: String::new(),
                price: Decimal::new(-1, 0),
                stock: 1,
                category: "Citrus".to_owned(),
                image_url: None,
                description: None,
            }],
        };

        assert_eq!(validate(&seed).len(), 3);
    }
}
