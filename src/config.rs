//! Environment configuration. `.env` is loaded first when present.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::desk::{Actor, DeskSettings, Role};
use crate::domain::aggregates::{Product, ProductVariant, TransitionPolicy, Warehouse};
use crate::domain::value_objects::{Money, ProductId, UserId};
use crate::workflow::DuplicatePolicy;
use crate::{CoordinatorError, Result};

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub nats_url: Option<String>,
    pub payment_gateway_url: Option<String>,
    pub seed_file: Option<PathBuf>,
    pub fetch_timeout: Duration,
    pub desk: DeskSettings,
    pub tokens: TokenTable,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let port = parse_or(get("PORT"), "PORT", 8083)?;
        let timeout_ms: u64 = parse_or(get("FETCH_TIMEOUT_MS"), "FETCH_TIMEOUT_MS", 10_000)?;
        let duplicate_policy = get("REQUEST_DUPLICATE_POLICY")
            .map(DuplicatePolicy::from_str)
            .transpose()
            .map_err(CoordinatorError::Config)?
            .unwrap_or_default();
        let transition_policy = get("ADMIN_TRANSITION_POLICY")
            .map(TransitionPolicy::from_str)
            .transpose()
            .map_err(CoordinatorError::Config)?
            .unwrap_or_default();

        Ok(Self {
            port,
            nats_url: get("NATS_URL").map(str::to_string),
            payment_gateway_url: get("PAYMENT_GATEWAY_URL").map(str::to_string),
            seed_file: get("SEED_FILE").map(PathBuf::from),
            fetch_timeout: Duration::from_millis(timeout_ms),
            desk: DeskSettings { duplicate_policy, transition_policy },
            tokens: get("API_TOKENS").map(TokenTable::parse).transpose()?.unwrap_or_default(),
        })
    }
}

fn parse_or<T: FromStr>(value: Option<&str>, key: &str, default: T) -> Result<T> {
    match value {
        Some(v) => v.parse().map_err(|_| CoordinatorError::Config(format!("{key} has an invalid value `{v}`"))),
        None => Ok(default),
    }
}

/// Bearer tokens accepted by the HTTP surface: `token:role:userId,...`.
#[derive(Clone, Debug, Default)]
pub struct TokenTable(HashMap<String, Actor>);

impl TokenTable {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut table = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let [token, role, user] = parts[..] else {
                return Err(CoordinatorError::Config(format!("API_TOKENS entry `{entry}` is not token:role:userId")));
            };
            let role = match role.to_ascii_lowercase().as_str() {
                "admin" => Role::Admin,
                "customer" => Role::Customer,
                other => return Err(CoordinatorError::Config(format!("unknown role `{other}` in API_TOKENS"))),
            };
            table.insert(token.to_string(), Actor { user_id: UserId::new(user), role });
        }
        Ok(Self(table))
    }

    pub fn insert(&mut self, token: impl Into<String>, actor: Actor) { self.0.insert(token.into(), actor); }

    pub fn resolve(&self, token: &str) -> Option<&Actor> { self.0.get(token) }
}

/// Catalog and warehouse data loaded at startup.
#[derive(Debug, Default)]
pub struct Seed {
    pub products: Vec<Product>,
    pub warehouses: Vec<Warehouse>,
}

#[derive(Deserialize)]
struct SeedFile {
    #[serde(default)]
    products: Vec<SeedProduct>,
    #[serde(default)]
    warehouses: Vec<Warehouse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedProduct {
    id: ProductId,
    name: String,
    price: Money,
    #[serde(default)]
    variants: Vec<ProductVariant>,
}

impl SeedProduct {
    /// Builds the product one variant at a time so duplicate ids and color/size pairs are refused.
    fn build(self) -> Result<Product> {
        let mut product = Product::create(self.id, self.name, self.price);
        for variant in self.variants {
            product
                .add_variant(variant)
                .map_err(|e| CoordinatorError::Config(format!("seed product {}: {e}", product.id())))?;
        }
        Ok(product)
    }
}

impl Seed {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoordinatorError::Config(format!("cannot read seed file {}: {e}", path.display())))?;
        Self::from_json(&raw).map_err(|e| match e {
            CoordinatorError::Config(msg) => CoordinatorError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: SeedFile =
            serde_json::from_str(raw).map_err(|e| CoordinatorError::Config(format!("invalid seed file: {e}")))?;
        Ok(Self {
            products: file.products.into_iter().map(SeedProduct::build).collect::<Result<_>>()?,
            warehouses: file.warehouses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let c = Config::from_vars(&HashMap::new()).unwrap();
        assert_eq!(c.port, 8083);
        assert_eq!(c.fetch_timeout, Duration::from_secs(10));
        assert_eq!(c.desk.duplicate_policy, DuplicatePolicy::AnyExisting);
        assert_eq!(c.desk.transition_policy, TransitionPolicy::Permissive);
        assert!(c.nats_url.is_none());
    }

    #[test]
    fn test_policies_and_tokens() {
        let c = Config::from_vars(&vars(&[
            ("REQUEST_DUPLICATE_POLICY", "active-only"),
            ("ADMIN_TRANSITION_POLICY", "strict"),
            ("API_TOKENS", "t1:admin:A1, t2:customer:U7"),
        ]))
        .unwrap();
        assert_eq!(c.desk.duplicate_policy, DuplicatePolicy::ActiveOnly);
        assert_eq!(c.desk.transition_policy, TransitionPolicy::Strict);
        assert!(c.tokens.resolve("t1").unwrap().is_admin());
        assert_eq!(c.tokens.resolve("t2").unwrap().user_id.as_str(), "U7");
        assert!(c.tokens.resolve("t3").is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_vars(&vars(&[("PORT", "eighty")])).is_err());
        assert!(Config::from_vars(&vars(&[("REQUEST_DUPLICATE_POLICY", "sometimes")])).is_err());
        assert!(TokenTable::parse("justatoken").is_err());
        assert!(TokenTable::parse("t:root:U1").is_err());
    }

    #[test]
    fn test_seed_builds_products_through_variant_checks() {
        let seed = Seed::from_json(
            r#"{
                "products": [{
                    "id": "P1", "name": "Tee", "price": { "amount": "19.99", "currency": "USD" },
                    "variants": [
                        { "id": "V1", "color": "Red", "size": "M" },
                        { "id": "V2", "color": "Red", "size": "L" }
                    ]
                }],
                "warehouses": []
            }"#,
        )
        .unwrap();
        assert_eq!(seed.products.len(), 1);
        assert_eq!(seed.products[0].sizes(), vec!["M", "L"]);
    }

    #[test]
    fn test_seed_rejects_duplicate_combination() {
        let err = Seed::from_json(
            r#"{
                "products": [{
                    "id": "P1", "name": "Tee", "price": { "amount": "19.99", "currency": "USD" },
                    "variants": [
                        { "id": "V1", "color": "Red", "size": "M" },
                        { "id": "V2", "color": "Red", "size": "M" }
                    ]
                }]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, CoordinatorError::Config(msg) if msg.contains("Red/M")));
    }
}
