//! Bounded-parallel execution of a homogeneous batch.
//!
//! Workers pull the next item index from a shared counter, so a degree of 1
//! processes items strictly in input order. Once any item fails no new item
//! is started, but operations already in flight run to completion.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use serde::Serialize;

use crate::error::{BatchFailureItem, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemStatus {
    Succeeded,
    Failed,
    NotStarted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub id: String,
    pub status: BatchItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub label: String,
    pub degree: usize,
    pub items: Vec<BatchItemResult>,
}

impl BatchReport {
    pub fn failures(&self) -> Vec<BatchFailureItem> {
        self.items
            .iter()
            .filter(|i| i.status == BatchItemStatus::Failed)
            .map(|i| BatchFailureItem {
                id: i.id.clone(),
                error: i.error.clone().unwrap_or_default(),
            })
            .collect()
    }
}

/// Run `op` once per item with at most `degree` operations in flight.
///
/// Returns the per-item report when every item succeeded, otherwise an
/// `external.batch_failed` error listing each failed item.
pub fn run_batch<T, F>(label: &str, items: &[T], degree: usize, op: F) -> Result<BatchReport>
where
    T: Display + Sync,
    F: Fn(&T) -> Result<()> + Sync,
{
    let degree = degree.max(1);
    let workers = degree.min(items.len());
    let next = AtomicUsize::new(0);
    let halted = AtomicBool::new(false);
    let slots: Mutex<Vec<Option<Result<()>>>> = Mutex::new(vec![None; items.len()]);

    log_status!("batch", "{}: {} item(s), degree {}", label, items.len(), degree);

    let panicked = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| loop {
                    if halted.load(Ordering::SeqCst) {
                        break;
                    }
                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    let Some(item) = items.get(idx) else {
                        break;
                    };
                    let result = op(item);
                    if result.is_err() {
                        halted.store(true, Ordering::SeqCst);
                    }
                    let mut guard = slots.lock().unwrap_or_else(|p| p.into_inner());
                    guard[idx] = Some(result);
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join())
            .filter(|joined| joined.is_err())
            .count()
    });

    if panicked > 0 {
        return Err(Error::internal_unexpected(format!(
            "{}: {} batch worker(s) panicked",
            label, panicked
        )));
    }

    let slots = slots.into_inner().unwrap_or_else(|p| p.into_inner());
    let results: Vec<BatchItemResult> = items
        .iter()
        .zip(slots)
        .map(|(item, slot)| match slot {
            Some(Ok(())) => BatchItemResult {
                id: item.to_string(),
                status: BatchItemStatus::Succeeded,
                error: None,
            },
            Some(Err(err)) => BatchItemResult {
                id: item.to_string(),
                status: BatchItemStatus::Failed,
                error: Some(err.message),
            },
            None => BatchItemResult {
                id: item.to_string(),
                status: BatchItemStatus::NotStarted,
                error: None,
            },
        })
        .collect();

    let report = BatchReport {
        label: label.to_string(),
        degree,
        items: results,
    };

    let failures = report.failures();
    if failures.is_empty() {
        Ok(report)
    } else {
        Err(Error::batch_failed(label, failures))
    }
}
