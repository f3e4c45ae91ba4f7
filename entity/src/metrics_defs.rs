//! Metrics definitions for the entity service.

use shared::metrics_defs::{MetricDef, MetricType};

pub const ENTITY_COUNT: MetricDef = MetricDef {
    name: "entity.count",
    metric_type: MetricType::Counter,
    description: "Entities processed. Tagged with status (created, deleted, failed).",
};

pub const ENTITY_CURRENT: MetricDef = MetricDef {
    name: "entity.current",
    metric_type: MetricType::Gauge,
    description: "Number of entities currently stored",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with status, route.",
};

pub const ALL_METRICS: &[MetricDef] = &[ENTITY_COUNT, ENTITY_CURRENT, REQUEST_DURATION];
