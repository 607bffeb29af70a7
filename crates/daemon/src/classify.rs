//! Request classification: an ordered rule table mapping each intercepted
//! request to exactly one caching route.
//!
//! Rules are evaluated in sequence and the first match wins. The order is
//! load-bearing: navigation is checked before extension matching so a
//! document request is never treated as a static asset, and the two remote
//! backend prefixes are checked before the generic same-origin JSON rule so
//! remote API calls get the size and freshness limits appropriate to their
//! volatility.

use std::time::Duration;

use qbank_core::{AppConfig, Error, StoreKind};
use regex::Regex;
use url::Url;

use crate::request::{InterceptedRequest, canonicalize};

/// Build-output file extensions served from the static-assets store.
const STATIC_ASSET_PATTERN: &str = r"(?i)\.(?:css|js|woff2?|png|jpg|jpeg|svg|gif|webp|ico)$";

/// Freshness window and entry cap for one bounded store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_age: Duration,
    pub max_entries: Option<usize>,
}

/// The strategy assignment for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Never intercepted; the page goes straight to the network.
    Bypass,
    /// Handled by the navigation fallback chain.
    Navigation,
    StaleWhileRevalidate { store: StoreKind },
    NetworkFirst { store: StoreKind, policy: CachePolicy },
    CacheFirst { store: StoreKind, policy: CachePolicy },
}

struct Rule {
    name: &'static str,
    matches: Box<dyn Fn(&InterceptedRequest) -> bool + Send + Sync>,
    route: Route,
}

/// Ordered rule table; first match wins, unmatched requests bypass.
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    pub fn new(config: &AppConfig) -> Result<Self, Error> {
        let origin = canonicalize(&config.origin)?;
        let rest_prefix = config.rest_prefix();
        let storage_prefix = config.storage_prefix();
        let static_assets = Regex::new(STATIC_ASSET_PATTERN).expect("static asset pattern is valid");

        let rest_policy = CachePolicy {
            max_age: Duration::from_secs(config.rest_max_age_secs),
            max_entries: Some(config.rest_max_entries),
        };
        let storage_policy = CachePolicy {
            max_age: Duration::from_secs(config.storage_max_age_secs),
            max_entries: Some(config.storage_max_entries),
        };

        let rules = vec![
            Rule {
                name: "non-get",
                matches: Box::new(|request| request.method != "GET"),
                route: Route::Bypass,
            },
            Rule {
                name: "navigation",
                matches: Box::new(|request| request.is_navigation()),
                route: Route::Navigation,
            },
            Rule {
                name: "static-asset",
                matches: {
                    let origin = origin.clone();
                    Box::new(move |request| {
                        same_origin(&origin, &request.url) && static_assets.is_match(request.url.path())
                    })
                },
                route: Route::StaleWhileRevalidate { store: StoreKind::Static },
            },
            Rule {
                name: "supabase-rest",
                matches: Box::new(move |request| request.url.as_str().starts_with(&rest_prefix)),
                route: Route::NetworkFirst { store: StoreKind::SupabaseRest, policy: rest_policy },
            },
            Rule {
                name: "supabase-storage",
                matches: Box::new(move |request| request.url.as_str().starts_with(&storage_prefix)),
                route: Route::CacheFirst { store: StoreKind::SupabaseStorage, policy: storage_policy },
            },
            Rule {
                name: "dynamic-json",
                matches: {
                    let origin = origin.clone();
                    Box::new(move |request| {
                        same_origin(&origin, &request.url) && accepts_json(request)
                    })
                },
                route: Route::NetworkFirst {
                    store: StoreKind::Dynamic,
                    policy: CachePolicy { max_age: Duration::from_secs(config.rest_max_age_secs), max_entries: None },
                },
            },
        ];

        Ok(Self { rules })
    }

    /// Assign a route to the request; unmatched requests bypass.
    pub fn classify(&self, request: &InterceptedRequest) -> Route {
        for rule in &self.rules {
            if (rule.matches)(request) {
                tracing::trace!(rule = rule.name, url = %request.url, "request classified");
                return rule.route;
            }
        }
        Route::Bypass
    }
}

fn same_origin(origin: &Url, url: &Url) -> bool {
    url.origin() == origin.origin()
}

fn accepts_json(request: &InterceptedRequest) -> bool {
    request
        .accept
        .as_deref()
        .is_some_and(|accept| accept.contains("application/json"))
}
