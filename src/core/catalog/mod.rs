//! Pokedex catalog metadata.
//!
//! Fetches species details from PokeAPI for prompt construction and
//! downloads official artwork sprites to the data directory. Details
//! are cached in memory for the life of the process; the reference API
//! is public and its data effectively immutable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://pokeapi.co/api/v2";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Entry not found: #{0}")]
    NotFound(i64),

    #[error("Malformed catalog response: {0}")]
    Parse(String),
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Species details used to render the summary prompt.
#[derive(Debug, Clone)]
pub struct CatalogDetails {
    pub id: i64,
    pub name: String,
    pub genus: String,
    pub flavor_text: String,
    pub types: Vec<String>,
    pub habitat: Option<String>,
}

/// Source of catalog metadata.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn details(&self, id: i64) -> CatalogResult<CatalogDetails>;
}

/// PokeAPI-backed catalog with an in-memory cache.
pub struct PokeApiCatalog {
    client: Client,
    base_url: String,
    cache: RwLock<HashMap<i64, CatalogDetails>>,
}

impl PokeApiCatalog {
    pub fn new(timeout: std::time::Duration) -> CatalogResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Point the catalog at a different endpoint. Used by tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_json(&self, path: &str, id: i64) -> CatalogResult<serde_json::Value> {
        let url = format!("{}/{}/{}", self.base_url, path, id);
        let resp = self.client.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(id));
        }
        let resp = resp.error_for_status()?;
        Ok(resp.json().await?)
    }

    /// Download the official artwork sprite into `dir`, returning the
    /// file path. Skips the download when the file already exists.
    pub async fn download_sprite(&self, id: i64, dir: &Path) -> CatalogResult<PathBuf> {
        let target = dir.join(format!("{}.png", id));
        if target.exists() {
            return Ok(target);
        }

        let pokemon = self.fetch_json("pokemon", id).await?;
        let sprite_url = pokemon["sprites"]["other"]["official-artwork"]["front_default"]
            .as_str()
            .ok_or_else(|| CatalogError::Parse(format!("No sprite URL for #{}", id)))?
            .to_string();

        let bytes = self
            .client
            .get(&sprite_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        tokio::fs::create_dir_all(dir).await?;
        let mut file = tokio::fs::File::create(&target).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        debug!(id, path = %target.display(), "Downloaded sprite");
        Ok(target)
    }
}

#[async_trait]
impl CatalogSource for PokeApiCatalog {
    async fn details(&self, id: i64) -> CatalogResult<CatalogDetails> {
        {
            let cache = self.cache.read().await;
            if let Some(details) = cache.get(&id) {
                return Ok(details.clone());
            }
        }

        let species = self.fetch_json("pokemon-species", id).await?;
        let pokemon = self.fetch_json("pokemon", id).await?;

        let name = species["name"]
            .as_str()
            .ok_or_else(|| CatalogError::Parse(format!("No name for #{}", id)))?
            .to_string();

        let genus = species["genera"]
            .as_array()
            .and_then(|genera| {
                genera.iter().find(|g| {
                    g["language"]["name"].as_str() == Some("en")
                })
            })
            .and_then(|g| g["genus"].as_str())
            .unwrap_or_default()
            .to_string();

        let flavor_text = species["flavor_text_entries"]
            .as_array()
            .and_then(|entries| {
                entries.iter().find(|e| {
                    e["language"]["name"].as_str() == Some("en")
                })
            })
            .and_then(|e| e["flavor_text"].as_str())
            .map(clean_flavor_text)
            .unwrap_or_default();

        let types = pokemon["types"]
            .as_array()
            .map(|types| {
                types
                    .iter()
                    .filter_map(|t| t["type"]["name"].as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let habitat = species["habitat"]["name"].as_str().map(str::to_string);

        let details = CatalogDetails {
            id,
            name,
            genus,
            flavor_text,
            types,
            habitat,
        };

        let mut cache = self.cache.write().await;
        cache.insert(id, details.clone());

        Ok(details)
    }
}

/// PokeAPI flavor text carries form feeds and hard line breaks from
/// the original game data.
fn clean_flavor_text(raw: &str) -> String {
    raw.replace(['\u{c}', '\n', '\r'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
