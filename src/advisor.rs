//! Optional LLM advisor proxy.
//!
//! Wraps a Gemini-style HTTPS endpoint with a hard 30 s timeout, bounded
//! retries, and a small prompt-keyed response cache. Every failure mode
//! resolves to `None`; callers treat the advisor as a best-effort
//! enricher and never depend on it.

use crate::domain::now_ms;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const CACHE_TTL_MS: i64 = 5 * 60 * 1000;
const CACHE_CAP: usize = 50;

const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

struct CachedResponse {
    value: Value,
    inserted_at: i64,
}

pub struct Advisor {
    http: Client,
    endpoint: String,
    api_key: String,
    cache: Mutex<HashMap<String, CachedResponse>>,
}

impl Advisor {
    /// `None` when no API key is configured.
    pub fn from_key(api_key: Option<&str>) -> Option<Self> {
        let api_key = api_key?.trim().to_string();
        if api_key.is_empty() {
            return None;
        }
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build().ok()?;
        Some(Self {
            http,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Ask the model for a JSON verdict. Returns the first parseable JSON
    /// object embedded in the response text, or `None` on any failure.
    pub async fn call(&self, prompt: &str) -> Option<Value> {
        let key = prompt_key(prompt);

        if let Some(hit) = self.cache_get(&key).await {
            return Some(hit);
        }

        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            // Low temperature keeps the JSON shape deterministic.
            "generationConfig": {"temperature": 0.1}
        });

        let mut backoff = Duration::from_secs(1);
        for attempt in 1..=MAX_ATTEMPTS {
            match self.request(&body).await {
                Some(text) => {
                    let Some(parsed) = extract_json_object(&text) else {
                        debug!("advisor returned no parseable JSON object");
                        return None;
                    };
                    self.cache_put(key, parsed.clone()).await;
                    return Some(parsed);
                }
                None if attempt < MAX_ATTEMPTS => {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                None => {
                    warn!("advisor unavailable after {MAX_ATTEMPTS} attempts");
                }
            }
        }
        None
    }

    async fn request(&self, body: &Value) -> Option<String> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let response = match self.http.post(&url).json(body).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(status = %r.status(), "advisor request rejected");
                return None;
            }
            Err(e) => {
                debug!(error = %e, "advisor request failed");
                return None;
            }
        };
        let parsed: Value = response.json().await.ok()?;
        parsed["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
    }

    async fn cache_get(&self, key: &str) -> Option<Value> {
        let cache = self.cache.lock().await;
        let entry = cache.get(key)?;
        if now_ms() - entry.inserted_at < CACHE_TTL_MS {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    async fn cache_put(&self, key: String, value: Value) {
        let mut cache = self.cache.lock().await;
        if cache.len() >= CACHE_CAP && !cache.contains_key(&key) {
            // Evict the oldest insertion.
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, v)| v.inserted_at)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest);
            }
        }
        cache.insert(
            key,
            CachedResponse {
                value,
                inserted_at: now_ms(),
            },
        );
    }
}

fn prompt_key(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Locate the first balanced `{...}` span in free prose and decode it.
/// Brace counting ignores braces inside string literals.
fn extract_json_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..=i];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_object() {
        let parsed = extract_json_object(r#"{"verdict": "BUY", "confidence": 72}"#).unwrap();
        assert_eq!(parsed["verdict"], "BUY");
    }

    #[test]
    fn test_extract_object_from_prose() {
        let text = r#"Sure! Here is my analysis:
```json
{"verdict": "HOLD", "note": "flat {market}"}
```
Let me know if you need more."#;
        let parsed = extract_json_object(text).unwrap();
        assert_eq!(parsed["verdict"], "HOLD");
        assert_eq!(parsed["note"], "flat {market}");
    }

    #[test]
    fn test_extract_handles_nested_and_strings() {
        let text = r#"noise {"a": {"b": "}"}, "c": 1} trailing"#;
        let parsed = extract_json_object(text).unwrap();
        assert_eq!(parsed["c"], 1);
    }

    #[test]
    fn test_extract_none_on_garbage() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{unbalanced").is_none());
        assert!(extract_json_object("{not: valid json}").is_none());
    }

    #[test]
    fn test_disabled_without_key() {
        assert!(Advisor::from_key(None).is_none());
        assert!(Advisor::from_key(Some("")).is_none());
        assert!(Advisor::from_key(Some("  ")).is_none());
    }

    #[tokio::test]
    async fn test_cache_eviction_by_insert_time() {
        let advisor = Advisor::from_key(Some("test-key")).unwrap();
        for i in 0..CACHE_CAP {
            advisor
                .cache_put(format!("key-{i}"), json!({ "i": i }))
                .await;
        }
        // One more insert evicts exactly one entry.
        advisor.cache_put("key-new".to_string(), json!({})).await;
        let cache = advisor.cache.lock().await;
        assert_eq!(cache.len(), CACHE_CAP);
        assert!(cache.contains_key("key-new"));
    }

    #[tokio::test]
    async fn test_cache_ttl_expiry() {
        let advisor = Advisor::from_key(Some("test-key")).unwrap();
        let key = prompt_key("p");
        {
            let mut cache = advisor.cache.lock().await;
            cache.insert(
                key.clone(),
                CachedResponse {
                    value: json!({"stale": true}),
                    inserted_at: now_ms() - CACHE_TTL_MS - 1,
                },
            );
        }
        assert!(advisor.cache_get(&key).await.is_none());
    }
}
