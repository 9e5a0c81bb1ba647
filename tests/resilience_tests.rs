// tests/resilience_tests.rs

mod common;

use common::{TestWrapperBuilder, WEATHER_BACKUP, WEATHER_PRIMARY};
use farmguard_gateway::{config::ServiceKeys, DataSource, FetchError, ResultEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Forecast {
    city: String,
    temp_c: i32,
}

fn forecast(temp_c: i32) -> Forecast {
    Forecast {
        city: "Ludhiana".to_string(),
        temp_c,
    }
}

#[tokio::test]
async fn always_failing_operation_returns_fallback_after_two_attempts() {
    let wrapper = TestWrapperBuilder::new().build();
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = attempts.clone();
    let envelope = wrapper
        .fetch_with_resilience(
            "weather",
            move |_key| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<Forecast, _>(FetchError::status(503, "Service Unavailable"))
                }
            },
            forecast(0),
        )
        .await;

    assert!(!envelope.success);
    assert_eq!(envelope.data, forecast(0));
    assert_eq!(envelope.source, DataSource::Fallback);
    assert!(!envelope.cached);
    assert_eq!(envelope.error.as_deref(), Some("HTTP 503: Service Unavailable"));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn single_key_service_makes_one_attempt() {
    let wrapper = TestWrapperBuilder::new().build();
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = attempts.clone();
    let envelope = wrapper
        .fetch_with_resilience(
            "ai",
            move |_key| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<String, _>(FetchError::transport("connection refused"))
                }
            },
            "offline advice".to_string(),
        )
        .await;

    assert!(!envelope.success);
    assert_eq!(envelope.data, "offline advice");
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_attempt_success_reports_both_outcomes() {
    let wrapper = TestWrapperBuilder::new().build();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let log = seen.clone();
    let envelope = wrapper
        .fetch_with_resilience(
            "weather",
            move |key| {
                let log = log.clone();
                async move {
                    log.lock().push(key.clone());
                    if key == WEATHER_PRIMARY {
                        Err(FetchError::status(500, "Internal Server Error"))
                    } else {
                        Ok(forecast(31))
                    }
                }
            },
            forecast(0),
        )
        .await;

    assert!(envelope.success);
    assert_eq!(envelope.data, forecast(31));
    assert_eq!(envelope.source, DataSource::Live);
    assert!(envelope.error.is_none());
    assert_eq!(*seen.lock(), vec![WEATHER_PRIMARY, WEATHER_BACKUP]);

    let km = wrapper.key_manager();
    assert_eq!(km.failure_count("weather", WEATHER_PRIMARY), 1);
    assert_eq!(km.failure_count("weather", WEATHER_BACKUP), 0);
    assert!(km.status()["weather"].last_used.is_some());
}

#[tokio::test]
async fn rate_limited_key_is_skipped_on_next_call() {
    let wrapper = TestWrapperBuilder::new().build();

    let envelope = wrapper
        .fetch_with_resilience(
            "weather",
            |key| async move {
                if key == WEATHER_PRIMARY {
                    Err(FetchError::status(429, "Too Many Requests"))
                } else {
                    Ok(key)
                }
            },
            String::new(),
        )
        .await;
    assert_eq!(envelope.data, WEATHER_BACKUP);

    let km = wrapper.key_manager();
    assert!(km.is_blacklisted("weather", WEATHER_PRIMARY));
    assert_eq!(km.get_best_key("weather").as_deref(), Some(WEATHER_BACKUP));
}

#[tokio::test]
async fn missing_credentials_never_call_the_operation() {
    let wrapper = TestWrapperBuilder::new()
        .with_services(vec![ServiceKeys::new("market")])
        .build();
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = attempts.clone();
    let envelope = wrapper
        .fetch_with_resilience(
            "market",
            move |_key| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"wheat": 2275}))
                }
            },
            json!({"wheat": null}),
        )
        .await;

    assert!(!envelope.success);
    assert_eq!(envelope.data, json!({"wheat": null}));
    assert_eq!(
        envelope.error.as_deref(),
        Some("no credentials configured for service 'market'")
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_operation_times_out_and_retries() {
    let wrapper = TestWrapperBuilder::new()
        .with_timeout(Duration::from_millis(30))
        .build();

    let envelope = wrapper
        .fetch_with_resilience(
            "weather",
            |key| async move {
                if key == WEATHER_PRIMARY {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Ok(forecast(28))
            },
            forecast(0),
        )
        .await;

    assert!(envelope.success);
    assert_eq!(envelope.data, forecast(28));
    assert_eq!(
        wrapper.key_manager().failure_count("weather", WEATHER_PRIMARY),
        1
    );
}

#[tokio::test]
async fn per_call_timeout_overrides_default() {
    let wrapper = TestWrapperBuilder::new().build();

    let envelope = wrapper
        .fetch_with_timeout(
            "ai",
            |_key| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok("advice")
            },
            "fallback advice",
            Duration::from_millis(20),
        )
        .await;

    assert!(!envelope.success);
    assert_eq!(envelope.data, "fallback advice");
    assert!(envelope.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn fresh_cache_hit_skips_upstream() {
    let wrapper = TestWrapperBuilder::new().build();
    let attempts = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let counter = attempts.clone();
        wrapper
            .fetch_cached(
                "weather",
                "weather_30.90_75.85",
                move |_key| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(forecast(33))
                    }
                },
                forecast(0),
            )
            .await;
    }

    let envelope = wrapper
        .fetch_cached(
            "weather",
            "weather_30.90_75.85",
            |_key| async { Err::<Forecast, _>(FetchError::transport("unreachable")) },
            forecast(0),
        )
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(envelope.success);
    assert!(envelope.cached);
    assert_eq!(envelope.source, DataSource::Cache);
    assert_eq!(envelope.data, forecast(33));
}

#[tokio::test]
async fn stale_cache_is_preferred_over_fallback() {
    let wrapper = TestWrapperBuilder::new()
        .with_cache_ttl(Duration::from_millis(20))
        .build();

    let live = wrapper
        .fetch_cached(
            "weather",
            "weather_ludhiana",
            |_key| async { Ok(forecast(35)) },
            forecast(0),
        )
        .await;
    assert_eq!(live.source, DataSource::Live);

    tokio::time::sleep(Duration::from_millis(40)).await;

    let stale = wrapper
        .fetch_cached(
            "weather",
            "weather_ludhiana",
            |_key| async { Err::<Forecast, _>(FetchError::status(502, "Bad Gateway")) },
            forecast(0),
        )
        .await;

    assert!(!stale.success);
    assert!(stale.cached);
    assert_eq!(stale.source, DataSource::Cache);
    assert_eq!(stale.data, forecast(35));
    assert_eq!(stale.error.as_deref(), Some("HTTP 502: Bad Gateway"));
}

#[tokio::test]
async fn open_circuit_fails_fast() {
    let wrapper = TestWrapperBuilder::new().with_breaker_threshold(2).build();
    let attempts = Arc::new(AtomicUsize::new(0));

    let call = || {
        let counter = attempts.clone();
        move |_key: String| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(FetchError::transport("connection reset"))
            }
        }
    };

    wrapper.fetch_with_resilience("weather", call(), -1).await;
    wrapper.fetch_with_resilience("weather", call(), -1).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 4);

    let envelope = wrapper.fetch_with_resilience("weather", call(), -1).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert!(!envelope.success);
    assert_eq!(envelope.data, -1);
    assert_eq!(
        envelope.error.as_deref(),
        Some("circuit open for service 'weather'")
    );
}

#[test]
fn envelope_serializes_camel_case() {
    let envelope: ResultEnvelope<Vec<u32>> = ResultEnvelope::fallback(vec![2275], "offline");
    let value = serde_json::to_value(&envelope).unwrap();

    assert_eq!(value["success"], false);
    assert_eq!(value["data"], json!([2275]));
    assert_eq!(value["source"], "fallback");
    assert_eq!(value["cached"], false);
    assert_eq!(value["error"], "offline");
    assert!(value["timestamp"].is_string());
}

#[tokio::test]
async fn http_operation_rotates_past_rate_limited_key() {
    use farmguard_gateway::resilience::check_status;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("appid", WEATHER_PRIMARY))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("appid", WEATHER_BACKUP))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast(29)))
        .mount(&server)
        .await;

    let wrapper = TestWrapperBuilder::new().build();
    let client = reqwest::Client::new();
    let url = format!("{}/data/2.5/weather", server.uri());

    let envelope = wrapper
        .fetch_with_resilience(
            "weather",
            |key| {
                let request = client.get(&url).query(&[("appid", key)]);
                async move {
                    let response = check_status(request.send().await?)?;
                    Ok(response.json::<Forecast>().await?)
                }
            },
            forecast(0),
        )
        .await;

    assert!(envelope.success);
    assert_eq!(envelope.data, forecast(29));
    assert!(wrapper.key_manager().is_blacklisted("weather", WEATHER_PRIMARY));
}

#[tokio::test]
async fn http_client_timeout_reports_without_zero_duration() {
    use farmguard_gateway::resilience::check_status;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(forecast(30))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let wrapper = TestWrapperBuilder::new().build();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let url = format!("{}/data/2.5/weather", server.uri());

    let envelope = wrapper
        .fetch_with_resilience(
            "ai",
            |key| {
                let request = client.get(&url).bearer_auth(key);
                async move {
                    let response = check_status(request.send().await?)?;
                    Ok(response.json::<Forecast>().await?)
                }
            },
            forecast(0),
        )
        .await;

    assert!(!envelope.success);
    let error = envelope.error.unwrap();
    assert!(error.starts_with("request timed out:"), "{error}");
    assert!(!error.contains("0ns"));
}
