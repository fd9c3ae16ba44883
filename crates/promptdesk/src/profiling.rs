use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use fastrace::collector::{Config as FastraceConfig, Reporter, SpanRecord};
use promptdesk_types::FunctionStats;

pub struct CollectingReporter {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

impl CollectingReporter {
    pub fn new() -> (Self, SpanCollector) {
        let spans = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                spans: spans.clone(),
            },
            SpanCollector { spans },
        )
    }
}

impl Reporter for CollectingReporter {
    fn report(&mut self, spans: Vec<SpanRecord>) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(spans);
    }
}

pub struct SpanCollector {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

impl SpanCollector {
    /// Drains the spans reported so far. Call `fastrace::flush()` first.
    pub fn collect_and_aggregate(&self) -> Vec<FunctionStats> {
        let spans = std::mem::take(&mut *self.spans.lock().unwrap_or_else(PoisonError::into_inner));
        compute_function_stats(&spans)
    }
}

/// Routes every finished span of this process into the returned collector.
pub fn install() -> SpanCollector {
    let (reporter, collector) = CollectingReporter::new();
    fastrace::set_reporter(reporter, FastraceConfig::default());
    collector
}

fn simplify_name(name: &str) -> String {
    let name = name.replace("::{{closure}}", "");
    match name.rfind("::") {
        Some(pos) => name[pos + 2..].to_string(),
        None => name,
    }
}

fn compute_function_stats(spans: &[SpanRecord]) -> Vec<FunctionStats> {
    let mut by_name: HashMap<String, Vec<u64>> = HashMap::new();

    for span in spans {
        by_name
            .entry(simplify_name(&span.name))
            .or_default()
            .push(span.duration_ns / 1000);
    }

    let mut stats: Vec<FunctionStats> = by_name
        .into_iter()
        .map(|(name, mut durations)| {
            durations.sort_unstable();
            let calls = durations.len() as u32;
            let total_us: u64 = durations.iter().sum();
            let avg_us = total_us / calls.max(1) as u64;
            let p90_idx = ((durations.len() as f64 * 0.9).ceil() as usize).saturating_sub(1);
            let p90_us = durations.get(p90_idx).copied().unwrap_or(0);
            let max_us = durations.last().copied().unwrap_or(0);

            FunctionStats {
                name,
                calls,
                total_us,
                avg_us,
                p90_us,
                max_us,
            }
        })
        .collect();

    stats.sort_by(|a, b| b.total_us.cmp(&a.total_us).then_with(|| a.name.cmp(&b.name)));
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastrace::prelude::*;
    use promptdesk_registry::UserRegistry;
    use promptdesk_store::MemoryStore;
    use promptdesk_types::NewUser;

    fn span(name: &'static str, duration_us: u64) -> SpanRecord {
        SpanRecord {
            name: name.into(),
            duration_ns: duration_us * 1000,
            ..Default::default()
        }
    }

    #[test]
    fn test_reporter_aggregates_spans_by_function() {
        let (mut reporter, collector) = CollectingReporter::new();
        reporter.report(vec![
            span("promptdesk_store::lmdb::LmdbStore::get", 10),
            span("promptdesk_store::lmdb::LmdbStore::get", 30),
        ]);
        reporter.report(vec![
            span("promptdesk_store::lmdb::LmdbStore::get::{{closure}}", 20),
            span("promptdesk_registry::registry::UserRegistry<S>::add_user", 500),
            span("users add", 800),
        ]);

        let stats = collector.collect_and_aggregate();
        let names: Vec<&str> = stats.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["users add", "add_user", "get"]);

        let get = &stats[2];
        assert_eq!(get.calls, 3);
        assert_eq!(get.total_us, 60);
        assert_eq!(get.avg_us, 20);
        assert_eq!(get.p90_us, 30);
        assert_eq!(get.max_us, 30);

        assert!(collector.collect_and_aggregate().is_empty());
    }

    #[test]
    fn test_installed_reporter_collects_registry_spans() {
        let collector = install();
        let registry = UserRegistry::new(MemoryStore::new());
        {
            let root = Span::root("users add", SpanContext::random());
            let _guard = root.set_local_parent();
            registry.initialize().unwrap();
            registry.add_user(NewUser::new("Ann", "ann@x.com")).unwrap();
        }
        fastrace::flush();

        let stats = collector.collect_and_aggregate();
        let find = |name: &str| stats.iter().find(|s| s.name == name);
        assert_eq!(find("users add").map(|s| s.calls), Some(1));
        assert_eq!(find("add_user").map(|s| s.calls), Some(1));
        assert_eq!(find("initialize").map(|s| s.calls), Some(1));
    }
}
