//! Built-in rule catalog
//!
//! Coefficients and fixed references are operational tuning constants. They are
//! maintained here as data; evaluators never hard-code them.

use super::descriptor::*;
use inspection_shared::Severity;

const THREAD_CPU: MetricSeries = MetricSeries::new("tikv_thread_cpu", &["name"]);
const STORE_STATUS: MetricSeries =
    MetricSeries::new("pd_scheduler_store_status", &["address", "store", "type"]);
const ASYNC_REQUEST_DURATION: MetricSeries =
    MetricSeries::new("tikv_storage_async_request_duration", &["type", "quantile"]);

const RAFTSTORE_COEFFICIENT: f64 = 0.8;
const READPOOL_COEFFICIENT: f64 = 0.9;
const SCHEDULER_WORKER_COEFFICIENT: f64 = 0.85;

const MICROS: f64 = 1_000_000.0;

pub(crate) fn config_sanity_rules() -> Vec<ConfigSanityRule> {
    vec![
        ConfigSanityRule {
            node_type: "tidb",
            key: "log.slow-threshold",
            bad_value: "0",
            severity: Severity::Warning,
            detail: "slow-threshold = 0 will record every query to slow log, it may affect performance",
        },
        ConfigSanityRule {
            node_type: "tikv",
            key: "raftstore.sync-log",
            bad_value: "false",
            severity: Severity::Warning,
            detail: "sync-log should be true to avoid recover region when the machine breaks down",
        },
    ]
}

pub(crate) fn load_items() -> Vec<LoadItem> {
    let cpu_load = |item: &'static str, metric_name: &'static str| LoadItem {
        item,
        device_category: "cpu",
        device_name: Some("cpu"),
        metric_name,
        comparator: Comparator::Gte,
        reference: LoadReference::LogicalCores { coefficient: 0.7 },
        detail: LoadDetail::CpuLoad,
    };

    vec![
        LoadItem {
            item: "virtual-memory-usage",
            device_category: "memory",
            device_name: Some("virtual"),
            metric_name: "used-percent",
            comparator: Comparator::Gt,
            reference: LoadReference::Fixed {
                value: 0.7,
                display: "< 0.7",
            },
            detail: LoadDetail::Empty,
        },
        LoadItem {
            item: "swap-memory-usage",
            device_category: "memory",
            device_name: Some("swap"),
            metric_name: "used-percent",
            comparator: Comparator::Gt,
            reference: LoadReference::Fixed {
                value: 0.0,
                display: "0",
            },
            detail: LoadDetail::Empty,
        },
        cpu_load("cpu-load1", "load1"),
        cpu_load("cpu-load5", "load5"),
        cpu_load("cpu-load15", "load15"),
        LoadItem {
            item: "disk-usage",
            device_category: "disk",
            device_name: None,
            metric_name: "used-percent",
            comparator: Comparator::Gt,
            reference: LoadReference::Fixed {
                value: 70.0,
                display: "< 70",
            },
            detail: LoadDetail::DiskUsage,
        },
    ]
}

fn pool_cpu(
    item: &'static str,
    thread_pattern: &'static str,
    config_key: Option<&'static str>,
    coefficient: f64,
) -> ThresholdItem {
    ThresholdItem {
        item,
        node_type: "tikv",
        series: THREAD_CPU,
        filter: Some(LabelFilter::like("name", thread_pattern)),
        aggregation: Aggregation::Max,
        unit_divisor: 1.0,
        comparator: Comparator::Gt,
        reference: match config_key {
            Some(key) => ReferenceSpec::Config { key, coefficient },
            None => ReferenceSpec::Fixed(0.0),
        },
        rendering: Rendering::Decimal {
            value: 2,
            reference: 2,
        },
        detail: ThresholdDetail::PoolCpu,
    }
}

fn max_duration(
    item: &'static str,
    node_type: &'static str,
    series: MetricSeries,
    filter: Option<LabelFilter>,
    unit_divisor: f64,
    budget: f64,
) -> ThresholdItem {
    ThresholdItem {
        item,
        node_type,
        series,
        filter,
        aggregation: Aggregation::Max,
        unit_divisor,
        comparator: Comparator::Gt,
        reference: ReferenceSpec::Fixed(budget),
        rendering: Rendering::Decimal {
            value: 3,
            reference: 3,
        },
        detail: ThresholdDetail::MaxDuration,
    }
}

fn min_hit_rate(item: &'static str, series: &'static str, minimum: f64) -> ThresholdItem {
    ThresholdItem {
        item,
        node_type: "tikv",
        series: MetricSeries::new(series, &["db"]),
        filter: None,
        aggregation: Aggregation::Min,
        unit_divisor: 1.0,
        comparator: Comparator::Lt,
        reference: ReferenceSpec::Fixed(minimum),
        rendering: Rendering::Decimal {
            value: 3,
            reference: 3,
        },
        detail: ThresholdDetail::MinHitRate,
    }
}

fn store_balance(item: &'static str, stat: &'static str, max_gap_percent: f64) -> ThresholdItem {
    ThresholdItem {
        item,
        node_type: "tikv",
        series: STORE_STATUS,
        filter: Some(LabelFilter::equals("type", stat)),
        aggregation: Aggregation::BalanceGap { label: "address" },
        unit_divisor: 1.0,
        comparator: Comparator::Gte,
        reference: ReferenceSpec::Fixed(max_gap_percent),
        rendering: Rendering::Percent,
        detail: ThresholdDetail::Balance { stat },
    }
}

pub(crate) fn threshold_items() -> Vec<ThresholdItem> {
    vec![
        // Thread pool saturation
        pool_cpu("apply-cpu", "apply_%", Some("raftstore.apply-pool-size"), RAFTSTORE_COEFFICIENT),
        pool_cpu("coprocessor-high-cpu", "cop_high%", Some("readpool.coprocessor.high-concurrency"), READPOOL_COEFFICIENT),
        pool_cpu("coprocessor-low-cpu", "cop_low%", Some("readpool.coprocessor.low-concurrency"), READPOOL_COEFFICIENT),
        pool_cpu("coprocessor-normal-cpu", "cop_normal%", Some("readpool.coprocessor.normal-concurrency"), READPOOL_COEFFICIENT),
        pool_cpu("grpc-cpu", "grpc%", Some("server.grpc-concurrency"), READPOOL_COEFFICIENT),
        pool_cpu("raftstore-cpu", "raftstore_%", Some("raftstore.store-pool-size"), RAFTSTORE_COEFFICIENT),
        pool_cpu("scheduler-worker-cpu", "sched_%", Some("storage.scheduler-worker-pool-size"), SCHEDULER_WORKER_COEFFICIENT),
        pool_cpu("split-check-cpu", "split_check", None, 0.0),
        pool_cpu("storage-readpool-high-cpu", "store_read_high%", Some("readpool.storage.high-concurrency"), READPOOL_COEFFICIENT),
        pool_cpu("storage-readpool-low-cpu", "store_read_low%", Some("readpool.storage.low-concurrency"), READPOOL_COEFFICIENT),
        pool_cpu("storage-readpool-normal-cpu", "store_read_norm%", Some("readpool.storage.normal-concurrency"), READPOOL_COEFFICIENT),
        // Latency budgets, in seconds
        max_duration(
            "tso-duration",
            "tidb",
            MetricSeries::new("pd_tso_wait_duration", &["quantile"]),
            None,
            1.0,
            0.05,
        ),
        max_duration(
            "get-token-duration",
            "tidb",
            MetricSeries::new("tidb_get_token_duration", &["quantile"]),
            None,
            MICROS,
            0.001,
        ),
        max_duration(
            "load-schema-duration",
            "tidb",
            MetricSeries::new("tidb_load_schema_duration", &["quantile"]),
            None,
            1.0,
            1.0,
        ),
        max_duration(
            "scheduler-cmd-duration",
            "tikv",
            MetricSeries::new("tikv_scheduler_command_duration", &["type", "quantile"]),
            None,
            1.0,
            0.1,
        ),
        max_duration(
            "handle-snapshot-duration",
            "tikv",
            MetricSeries::new("tikv_handle_snapshot_duration", &["type", "quantile"]),
            None,
            1.0,
            30.0,
        ),
        max_duration(
            "storage-write-duration",
            "tikv",
            ASYNC_REQUEST_DURATION,
            Some(LabelFilter::equals("type", "write")),
            1.0,
            0.1,
        ),
        max_duration(
            "storage-snapshot-duration",
            "tikv",
            ASYNC_REQUEST_DURATION,
            Some(LabelFilter::equals("type", "snapshot")),
            1.0,
            0.05,
        ),
        max_duration(
            "rocksdb-write-duration",
            "tikv",
            MetricSeries::new("tikv_engine_write_duration", &["type", "db"]),
            Some(LabelFilter::equals("type", "write_max")),
            MICROS,
            0.1,
        ),
        max_duration(
            "rocksdb-get-duration",
            "tikv",
            MetricSeries::new("tikv_engine_max_get_duration", &["type", "db"]),
            Some(LabelFilter::equals("type", "get_max")),
            MICROS,
            0.05,
        ),
        max_duration(
            "rocksdb-seek-duration",
            "tikv",
            MetricSeries::new("tikv_engine_max_seek_duration", &["type", "db"]),
            Some(LabelFilter::equals("type", "seek_max")),
            MICROS,
            0.05,
        ),
        // Block cache efficiency
        min_hit_rate("data-block-cache-hit", "tikv_block_data_cache_hit", 0.80),
        min_hit_rate("index-block-cache-hit", "tikv_block_index_cache_hit", 0.95),
        min_hit_rate("filter-block-cache-hit", "tikv_block_filter_cache_hit", 0.95),
        // Counts
        ThresholdItem {
            item: "scheduler-pending-cmd-count",
            node_type: "tikv",
            series: MetricSeries::new("tikv_scheduler_pending_commands", &[]),
            filter: None,
            aggregation: Aggregation::Max,
            unit_divisor: 1.0,
            comparator: Comparator::Gt,
            reference: ReferenceSpec::Fixed(1000.0),
            rendering: Rendering::Decimal {
                value: 3,
                reference: 3,
            },
            detail: ThresholdDetail::PendingCommands,
        },
        ThresholdItem {
            item: "region-count",
            node_type: "tikv",
            series: STORE_STATUS,
            filter: Some(LabelFilter::equals("type", "region_count")),
            aggregation: Aggregation::MaxByLabel { label: "address" },
            unit_divisor: 1.0,
            comparator: Comparator::Gt,
            reference: ReferenceSpec::Fixed(20000.0),
            rendering: Rendering::Decimal {
                value: 2,
                reference: 0,
            },
            detail: ThresholdDetail::RegionCount,
        },
        ThresholdItem {
            item: "region-health",
            node_type: "pd",
            series: MetricSeries::new("pd_region_health", &["type"]),
            filter: None,
            aggregation: Aggregation::SumOfMax {
                label: "type",
                values: &[
                    "extra-peer-region-count",
                    "learner-peer-region-count",
                    "pending-peer-region-count",
                ],
            },
            unit_divisor: 1.0,
            comparator: Comparator::Gt,
            reference: ReferenceSpec::Fixed(100.0),
            rendering: Rendering::Decimal {
                value: 2,
                reference: 0,
            },
            detail: ThresholdDetail::RegionHealth,
        },
        // Store balance across tikv instances
        store_balance("leader-score-balance", "leader_score", 5.0),
        store_balance("region-score-balance", "region_score", 5.0),
        store_balance("store-available-balance", "store_available", 20.0),
    ]
}

fn series(
    item: &'static str,
    node_type: &'static str,
    name: &'static str,
    labels: &'static [&'static str],
) -> ErrorSeries {
    ErrorSeries {
        item,
        node_type,
        series: MetricSeries::new(name, labels),
    }
}

pub(crate) fn error_series() -> Vec<ErrorSeries> {
    vec![
        series("critical-error", "tikv", "tikv_critical_error_total_count", &["type"]),
        series("panic-count", "tidb", "tidb_panic_count_total_count", &[]),
        series("binlog-error", "tidb", "tidb_binlog_error_total_count", &[]),
        series(
            "scheduler-is-busy",
            "tikv",
            "tikv_scheduler_is_busy_total_count",
            &["db", "type", "stage"],
        ),
        series("coprocessor-is-busy", "tikv", "tikv_coprocessor_is_busy_total_count", &["db"]),
        series("channel-is-full", "tikv", "tikv_channel_full_total_count", &["db", "type"]),
        series("tikv_engine_write_stall", "tikv", "tikv_engine_write_stall", &["reason"]),
    ]
}
