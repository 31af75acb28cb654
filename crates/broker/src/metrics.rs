// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! Thin wrappers over the `metrics` facade crate, naming the three
//! instruments from §6.3. The facade is a global recorder: calling these
//! with no recorder installed is a safe no-op, which is exactly the "safe
//! to call from arbitrary workers" contract §6.3 asks for.

use crate::types::OperationType;

pub fn record_accepted(op: OperationType) {
    metrics::counter!("operations_total", "type" => op.to_string()).increment(1);
}

pub fn record_failure(op: OperationType, code: &str) {
    metrics::counter!(
        "operation_failures_total",
        "type" => op.to_string(),
        "error" => code.to_owned(),
    )
    .increment(1);
}

pub fn record_latency_ms(op: OperationType, millis: f64) {
    metrics::histogram!("operation_latency_ms", "type" => op.to_string()).record(millis);
}
