//! Sample media catalog
//!
//! Fetches the sample `videos.json` once at startup. The JSON groups videos
//! in categories; only the first category is used. A built-in copy of the
//! sample catalog is used when the fetch fails.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::MediaItem;

/// Default location of the sample catalog
pub const DEFAULT_CATALOG_URL: &str =
    "http://commondatastorage.googleapis.com/gtv-videos-bucket/sample/videos.json";

/// Root that relative thumbnail paths are resolved against
pub const DEFAULT_MEDIA_ROOT: &str =
    "http://commondatastorage.googleapis.com/gtv-videos-bucket/sample/";

/// Catalog JSON document
#[derive(Debug, Deserialize)]
struct CatalogResponse {
    categories: Vec<CatalogCategory>,
}

/// One category of the catalog document
#[derive(Debug, Deserialize)]
struct CatalogCategory {
    #[serde(default)]
    #[allow(dead_code)]
    name: String,
    videos: Vec<MediaItem>,
}

/// Read-only, ordered list of media items
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    items: Vec<MediaItem>,
}

impl Catalog {
    pub fn new(items: Vec<MediaItem>) -> Self {
        Self { items }
    }

    /// Parse a catalog document (`{"categories": [{"videos": [...]}]}`)
    pub fn from_json(json: &str) -> Result<Self> {
        let data: CatalogResponse =
            serde_json::from_str(json).context("Failed to parse catalog JSON")?;
        let category = data
            .categories
            .into_iter()
            .next()
            .context("Catalog has no categories")?;
        Ok(Self::new(category.videos))
    }

    pub fn get(&self, index: usize) -> Option<&MediaItem> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    /// The sample catalog shipped with the binary
    pub fn builtin() -> Self {
        const ROOT: &str = "http://commondatastorage.googleapis.com/gtv-videos-bucket/sample/";
        let item = |title: &str, subtitle: &str, file: Option<&str>, thumb: &str, desc: &str| {
            MediaItem {
                title: title.to_string(),
                subtitle: subtitle.to_string(),
                description: desc.to_string(),
                thumb: format!("images/{}", thumb),
                sources: file.map(|f| vec![format!("{}{}", ROOT, f)]).unwrap_or_default(),
            }
        };

        Self::new(vec![
            item(
                "Big Buck Bunny",
                "By Blender Foundation",
                Some("BigBuckBunny.mp4"),
                "BigBuckBunny.jpg",
                "Big Buck Bunny tells the story of a giant rabbit with a heart bigger than himself.",
            ),
            item(
                "Elephant Dream",
                "By Blender Foundation",
                Some("ElephantsDream.mp4"),
                "ElephantsDream.jpg",
                "The first Blender Open Movie from 2006",
            ),
            item(
                "For Bigger Blazes",
                "By Google",
                Some("ForBiggerBlazes.mp4"),
                "ForBiggerBlazes.jpg",
                "HBO GO now works with Chromecast.",
            ),
            item(
                "For Bigger Escape",
                "By Google",
                Some("ForBiggerEscapes.mp4"),
                "ForBiggerEscapes.jpg",
                "Introducing Chromecast. The easiest way to enjoy online video and music on your TV.",
            ),
            item(
                "For Bigger Fun",
                "By Google",
                Some("ForBiggerFun.mp4"),
                "ForBiggerFun.jpg",
                "Introducing Chromecast. The easiest way to enjoy online video and music on your TV.",
            ),
            item(
                "For Bigger Joyrides",
                "By Google",
                Some("ForBiggerJoyrides.mp4"),
                "ForBiggerJoyrides.jpg",
                "Introducing Chromecast. For the times that call for bigger joyrides.",
            ),
            item(
                "For Bigger Meltdowns",
                "By Google",
                Some("ForBiggerMeltdowns.mp4"),
                "ForBiggerMeltdowns.jpg",
                "Introducing Chromecast. For when you want to make Buster's big meltdowns even bigger.",
            ),
            item(
                "Sintel",
                "By Blender Foundation",
                Some("Sintel.mp4"),
                "Sintel.jpg",
                "Sintel is an independently produced short film, initiated by the Blender Foundation.",
            ),
            item(
                "Subaru Outback On Street And Dirt",
                "By Garage419",
                None,
                "SubaruOutbackOnStreetAndDirt.jpg",
                "Smoking Tire takes the all-new Subaru Outback to the highest point we can find.",
            ),
            item(
                "Tears of Steel",
                "By Blender Foundation",
                Some("TearsOfSteel.mp4"),
                "TearsOfSteel.jpg",
                "Tears of Steel was realized with crowd-funding by users of the open source 3D creation tool Blender.",
            ),
            item(
                "Volkswagen GTI Review",
                "By Garage419",
                Some("VolkswagenGTIReview.mp4"),
                "VolkswagenGTIReview.jpg",
                "The Smoking Tire heads out to Adams Motorsports Park in Riverside, CA.",
            ),
            item(
                "We Are Going On Bullrun",
                "By Garage419",
                Some("WeAreGoingOnBullrun.mp4"),
                "WeAreGoingOnBullrun.jpg",
                "The Smoking Tire is going on the 2010 Bullrun Live Rally in a 2011 Shelby GT500.",
            ),
            item(
                "What care can you get for a grand?",
                "By Garage419",
                Some("WhatCarCanYouGetForAGrand.mp4"),
                "WhatCarCanYouGetForAGrand.jpg",
                "The Smoking Tire meets up with Chris and Jorge from CarsForAGrand.com.",
            ),
        ])
    }
}

/// HTTP client for the catalog document
pub struct CatalogClient {
    url: String,
    client: reqwest::Client,
}

impl CatalogClient {
    /// Create a client for the default sample catalog
    pub fn new() -> Self {
        Self::with_url(DEFAULT_CATALOG_URL)
    }

    /// Create a client for a custom catalog URL (also used for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and parse the catalog
    pub async fn fetch(&self) -> Result<Catalog> {
        debug!(url = %self.url, "fetching catalog");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to fetch catalog")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Catalog returned HTTP {}", status);
        }

        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        Catalog::from_json(&text)
    }

    /// Fetch the catalog, falling back to the built-in copy on any failure
    pub async fn fetch_or_builtin(&self) -> Catalog {
        match self.fetch().await {
            Ok(catalog) if !catalog.is_empty() => catalog,
            Ok(_) => {
                warn!(url = %self.url, "catalog is empty, using built-in catalog");
                Catalog::builtin()
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "failed to load catalog, using built-in catalog");
                Catalog::builtin()
            }
        }
    }
}

impl Default for CatalogClient {
    fn default() -> Self {
        Self::new()
    }
}
