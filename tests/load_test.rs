//! Load testing for the gateway's admission path.

use std::time::{Duration, Instant};

use sec_gateway::Shutdown;

mod common;

use common::{spawn_gateway, Keys, TestDir};

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_rate_limit_exact_under_concurrency() {
    let dir = TestDir::new();
    let keys = Keys::new();
    let mut config = dir.config();
    config.rate_limit.requests_per_window = 50;
    config.rate_limit.window_secs = 300;

    let shutdown = Shutdown::new();
    let addr = spawn_gateway(config, keys.store.clone(), &shutdown).await;

    let concurrency = 20;
    let requests_per_task = 10;
    let client = client();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = format!("http://{}/api/files?path=reports/scan.txt", addr);
        let key = keys.viewer.clone();
        tasks.push(tokio::spawn(async move {
            let mut statuses = Vec::new();
            for _ in 0..requests_per_task {
                let res = client.get(&url).header("X-API-Key", &key).send().await.unwrap();
                statuses.push(res.status().as_u16());
            }
            statuses
        }));
    }

    let mut statuses = Vec::new();
    for task in tasks {
        statuses.extend(task.await.unwrap());
    }

    let admitted = statuses.iter().filter(|s| **s == 200).count();
    let limited = statuses.iter().filter(|s| **s == 429).count();
    assert_eq!(admitted, 50);
    assert_eq!(limited, concurrency * requests_per_task - 50);

    shutdown.trigger();
}

#[tokio::test]
async fn test_load_performance() {
    let dir = TestDir::new();
    let keys = Keys::new();
    let mut config = dir.config();
    config.rate_limit.requests_per_window = 100_000;

    let shutdown = Shutdown::new();
    let addr = spawn_gateway(config, keys.store.clone(), &shutdown).await;

    let concurrency = 20; // Reduced for consistency in debug mode
    let requests_per_task = 50;
    let total_requests = concurrency * requests_per_task;

    let client = client();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = format!("http://{}/api/files?path=reports/scan.txt", addr);
        let key = keys.viewer.clone();
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                if let Ok(res) = client.get(&url).header("X-API-Key", &key).send().await {
                    if res.status().is_success() {
                        latencies.push(req_start.elapsed());
                    }
                }
            }
            latencies
        }));
    }

    let mut all_latencies: Vec<Duration> = Vec::new();
    for task in tasks {
        all_latencies.extend(task.await.unwrap());
    }

    let duration = start.elapsed();
    let rps = total_requests as f64 / duration.as_secs_f64();

    assert_eq!(all_latencies.len(), total_requests, "every request should be admitted");

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p95 = all_latencies[(all_latencies.len() as f64 * 0.95) as usize];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("Requests/sec:   {:.2}", rps);
    println!("P50 Latency:    {:?}", p50);
    println!("P95 Latency:    {:?}", p95);
    println!("P99 Latency:    {:?}", p99);
    println!("-------------------------\n");

    shutdown.trigger();
}
