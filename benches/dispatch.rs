//! Benchmarks for gating and dispatch.
//!
//! Run with: cargo bench --bench dispatch

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use authservice::check::CheckRequest;
use authservice::config::{Config, TriggerRuleConfig};
use authservice::rules::TriggerRules;
use authservice::service::AuthService;

fn trigger_rules(yaml: &str) -> TriggerRules {
    let configs: Vec<TriggerRuleConfig> = serde_yaml::from_str(yaml).unwrap();
    TriggerRules::new(&configs).unwrap()
}

fn bench_trigger_rules(c: &mut Criterion) {
    let mut group = c.benchmark_group("trigger_rules");

    let prefix = trigger_rules(
        "- excluded_paths:\n    - prefix: /static\n    - exact: /healthz\n  included_paths:\n    - prefix: /api\n",
    );
    group.bench_function("prefix_hit", |b| {
        b.iter(|| black_box(prefix.matches_path("/api/v1/users")))
    });
    group.bench_function("excluded", |b| {
        b.iter(|| black_box(prefix.matches_path("/static/app.js")))
    });

    let regex = trigger_rules("- included_paths:\n    - regex: \"/api/v[0-9]+/.*\"\n");
    group.bench_function("regex_hit", |b| {
        b.iter(|| black_box(regex.matches_path("/api/v2/users/42")))
    });

    group.finish();
}

fn chains_config(count: usize) -> String {
    let mut yaml = String::from("chains:\n");
    for i in 0..count {
        yaml.push_str(&format!(
            "  - name: chain-{i}\n    match:\n      header: \":path\"\n      prefix: /svc{i}/\n    filters:\n      - type: passthrough\n"
        ));
    }
    yaml
}

fn bench_dispatch(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("dispatch");

    for count in [1usize, 10, 50] {
        let config = Config::from_yaml(&chains_config(count)).unwrap();
        let service = AuthService::new(&config).unwrap();
        let path = format!("/svc{}/resource", count - 1);

        group.bench_with_input(BenchmarkId::new("last_chain", count), &path, |b, path| {
            b.to_async(&runtime).iter(|| async {
                let request = CheckRequest::new("GET", "https", "example.com", path.as_str());
                black_box(service.check(request).await)
            })
        });
    }

    let config = Config::from_yaml(&chains_config(10)).unwrap();
    let service = AuthService::new(&config).unwrap();
    group.bench_function("no_match", |b| {
        b.to_async(&runtime).iter(|| async {
            let request = CheckRequest::new("GET", "https", "example.com", "/unmatched");
            black_box(service.check(request).await)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_trigger_rules, bench_dispatch);
criterion_main!(benches);
