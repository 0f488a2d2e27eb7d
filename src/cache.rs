//! Content-addressed result cache.
//!
//! Each operator owns a directory under the cache root. Requests are
//! canonicalized by serializing to a `serde_json::Value` (object keys are
//! sorted by the default BTreeMap-backed map) and hashed with 128-bit xxh3;
//! the lower-hex hash names a `.json` file holding the exact prior response
//! body. Hits short-circuit computation; write failures are logged and
//! otherwise ignored. Invalidation is external directory deletion; there
//! is no TTL.

use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_128;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ResultCache {
    root: PathBuf,
}

impl ResultCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The cache file that would serve `request` for `operator`.
    pub fn entry_path(&self, operator: &str, request: &Value) -> PathBuf {
        let key = request.to_string();
        let hash = xxh3_128(key.as_bytes());
        self.root.join(operator).join(format!("{hash:032x}.json"))
    }

    /// Return the cached response for this request, if any.
    pub fn lookup(&self, operator: &str, request: &Value) -> Option<Value> {
        let path = self.entry_path(operator, request);
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(value) => {
                debug!("cache hit for {operator} at {}", path.display());
                Some(value)
            }
            Err(e) => {
                warn!("discarding unreadable cache entry {}: {e}", path.display());
                None
            }
        }
    }

    /// Best-effort write; failures never fail the query.
    pub fn store(&self, operator: &str, request: &Value, response: &Value) {
        let path = self.entry_path(operator, request);
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, response.to_string())
        };
        if let Err(e) = write() {
            warn!("failed to write cache entry {}: {e}", path.display());
        }
    }

    /// Serve `operator(request)` through the cache.
    ///
    /// Only successful responses are cached; errors always propagate
    /// uncached so a transient failure does not poison the entry.
    pub fn get_or_compute<Req, Resp>(
        &self,
        operator: &str,
        request: &Req,
        compute: impl FnOnce() -> Result<Resp>,
    ) -> Result<Resp>
    where
        Req: Serialize,
        Resp: Serialize + DeserializeOwned,
    {
        let request_value = serde_json::to_value(request)?;
        if let Some(hit) = self.lookup(operator, &request_value)
            && let Ok(response) = serde_json::from_value(hit)
        {
            return Ok(response);
        }

        let response = compute()?;
        self.store(operator, &request_value, &serde_json::to_value(&response)?);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize)]
    struct Req {
        k: u32,
        min_distance: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Resp {
        total: u32,
    }

    #[test]
    fn key_is_insensitive_to_field_order() {
        let cache = ResultCache::new("/tmp/cache");
        let a: Value = serde_json::from_str(r#"{"k": 5, "min_distance": 100.0}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"min_distance": 100.0, "k": 5}"#).unwrap();
        assert_eq!(cache.entry_path("frequent", &a), cache.entry_path("frequent", &b));
    }

    #[test]
    fn second_request_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        let req = Req { k: 5, min_distance: 100.0 };

        let mut calls = 0;
        for _ in 0..2 {
            let resp: Resp = cache
                .get_or_compute("frequent", &req, || {
                    calls += 1;
                    Ok(Resp { total: 3 })
                })
                .unwrap();
            assert_eq!(resp, Resp { total: 3 });
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn identical_requests_produce_identical_cache_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        let req = Req { k: 2, min_distance: 50.0 };

        let _: Resp = cache
            .get_or_compute("frequent", &req, || Ok(Resp { total: 9 }))
            .unwrap();
        let path = cache.entry_path("frequent", &serde_json::to_value(&req).unwrap());
        let first = std::fs::read(&path).unwrap();

        let _: Resp = cache
            .get_or_compute("frequent", &req, || Ok(Resp { total: 9 }))
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn errors_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());
        let req = Req { k: 1, min_distance: 1.0 };

        let err: Result<Resp> = cache.get_or_compute("frequent", &req, || {
            Err(crate::error::TaxitraceError::NotFound("no data".into()))
        });
        assert!(err.is_err());

        let resp: Resp = cache
            .get_or_compute("frequent", &req, || Ok(Resp { total: 1 }))
            .unwrap();
        assert_eq!(resp.total, 1);
    }
}
