// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    collections::VecDeque,
    pin::pin,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::{
    sync::Notify,
    time::{timeout_at, Instant},
};

use crate::Response;

/// Maximum number of buffered responses.
pub(crate) const INBOX_CAPACITY: usize = 10;

/// Responses received by the datagram handler and not yet consumed.
///
/// When full the oldest response is evicted.
#[derive(Debug, Default)]
pub(crate) struct Inbox {
    queue: Mutex<VecDeque<Response>>,
    arrived: Notify,
}

impl Inbox {
    fn queue(&self) -> MutexGuard<'_, VecDeque<Response>> {
        // The queue stays consistent even if a holder panicked.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, response: Response) {
        {
            let mut queue = self.queue();
            if queue.len() >= INBOX_CAPACITY {
                queue.pop_front();
                log::debug!("Inbox full, dropped the oldest response");
            }
            queue.push_back(response);
        }
        self.arrived.notify_waiters();
    }

    pub(crate) fn pop(&self) -> Option<Response> {
        self.queue().pop_front()
    }

    pub(crate) fn clear(&self) {
        self.queue().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue().len()
    }

    /// Wait for the next response until `deadline`.
    pub(crate) async fn pop_until(&self, deadline: Instant) -> Option<Response> {
        loop {
            let mut arrived = pin!(self.arrived.notified());
            // Register before checking the queue to not miss a push in between.
            arrived.as_mut().enable();
            if let Some(response) = self.pop() {
                return Some(response);
            }
            if timeout_at(deadline, arrived).await.is_err() {
                return self.pop();
            }
        }
    }
}
