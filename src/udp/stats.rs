// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

/// Snapshot of the communication counters of a [`super::UdpEngine`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommunicationStatus {
    pub total_queries: u32,
    /// Queries that could not be sent or timed out.
    pub failed_queries: u32,
    pub total_controls: u32,
    pub failed_controls: u32,
    /// Mean round-trip time of the answered queries.
    pub avg_response_time: Duration,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    total_queries: AtomicU32,
    failed_queries: AtomicU32,
    total_controls: AtomicU32,
    failed_controls: AtomicU32,
    avg_response_time: Mutex<Duration>,
}

impl Counters {
    pub(crate) fn query_started(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn query_failed(&self) {
        self.failed_queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold the round-trip time of an answered query into the average.
    pub(crate) fn query_answered(&self, elapsed: Duration) {
        let count = self.total_queries.load(Ordering::Relaxed).max(1);
        let mut avg = self
            .avg_response_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *avg = avg
            .checked_mul(count - 1)
            .map_or(elapsed, |sum| sum.saturating_add(elapsed) / count);
    }

    pub(crate) fn control_sent(&self) {
        self.total_controls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn control_failed(&self) {
        self.failed_controls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CommunicationStatus {
        CommunicationStatus {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            total_controls: self.total_controls.load(Ordering::Relaxed),
            failed_controls: self.failed_controls.load(Ordering::Relaxed),
            avg_response_time: *self
                .avg_response_time
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_average() {
        let counters = Counters::default();
        counters.query_started();
        counters.query_answered(Duration::from_millis(30));
        assert_eq!(
            counters.snapshot().avg_response_time,
            Duration::from_millis(30)
        );

        counters.query_started();
        counters.query_answered(Duration::from_millis(10));
        assert_eq!(
            counters.snapshot().avg_response_time,
            Duration::from_millis(20)
        );
    }

    #[test]
    fn failed_queries_weigh_into_the_average() {
        let counters = Counters::default();
        counters.query_started();
        counters.query_failed();
        counters.query_started();
        counters.query_answered(Duration::from_millis(40));
        let status = counters.snapshot();
        assert_eq!(status.total_queries, 2);
        assert_eq!(status.failed_queries, 1);
        assert_eq!(status.avg_response_time, Duration::from_millis(20));
    }

    #[test]
    fn count_controls() {
        let counters = Counters::default();
        counters.control_sent();
        counters.control_sent();
        counters.control_failed();
        let status = counters.snapshot();
        assert_eq!(status.total_controls, 2);
        assert_eq!(status.failed_controls, 1);
        assert_eq!(status.total_queries, 0);
    }
}
