// BSD 3-Clause License
// Copyright (c) 2026, Virtual Cable S.L.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice,
//    this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice,
//    this list of conditions and the following disclaimer in the documentation
//    and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors
//    may be used to endorse or promote products derived from this software
//    without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS"
// AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
// IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE
// FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
// DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER
// CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY,
// OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

struct Inner {
    fired: AtomicBool,
    notify: Notify,
}

/// A cheap, clonable one-shot stop signal. Every clone observes the same
/// underlying flag; any clone can fire it, and any clone can wait on it.
/// Firing is idempotent and never un-fires.
#[derive(Clone)]
pub struct Trigger(Arc<Inner>);

impl Trigger {
    pub fn new() -> Self {
        Trigger(Arc::new(Inner {
            fired: AtomicBool::new(false),
            notify: Notify::new(),
        }))
    }

    pub fn trigger(&self) {
        self.0.fired.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.0.fired.load(Ordering::SeqCst)
    }

    /// Resolves once `trigger()` has been called on any clone. Safe to poll
    /// from multiple tasks/clones concurrently; resolves immediately if
    /// already triggered.
    pub async fn wait_async(&self) {
        loop {
            let notified = self.0.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
            if self.is_triggered() {
                return;
            }
        }
    }

    /// A fresh, independent `Trigger` that fires automatically when `self`
    /// fires (one-way link). Used by the auto-connector to derive a
    /// per-attempt cancellation signal from the caller's: cancelling the
    /// parent cancels every attempt, but cancelling one attempt (the winner
    /// closing out the losers) never reaches back to the parent.
    pub fn child(&self) -> Trigger {
        let child = Trigger::new();
        let parent = self.clone();
        let propagate_to = child.clone();
        tokio::spawn(async move {
            parent.wait_async().await;
            propagate_to.trigger();
        });
        child
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wait_resolves_after_fire() {
        let trigger = Trigger::new();
        let waiter = trigger.clone();
        let handle = tokio::spawn(async move {
            waiter.wait_async().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("wait_async should resolve after trigger")
            .unwrap();
    }

    #[tokio::test]
    async fn test_trigger_wait_resolves_immediately_if_already_fired() {
        let trigger = Trigger::new();
        trigger.trigger();
        tokio::time::timeout(Duration::from_millis(50), trigger.wait_async())
            .await
            .expect("already-fired trigger must resolve immediately");
    }

    #[tokio::test]
    async fn test_trigger_is_idempotent() {
        let trigger = Trigger::new();
        trigger.trigger();
        trigger.trigger();
        assert!(trigger.is_triggered());
    }

    #[tokio::test]
    async fn test_child_trigger_propagates_from_parent() {
        let parent = Trigger::new();
        let child = parent.child();
        assert!(!child.is_triggered());
        parent.trigger();
        tokio::time::timeout(Duration::from_secs(1), child.wait_async())
            .await
            .expect("child should observe parent trigger");
        assert!(child.is_triggered());
    }

    #[tokio::test]
    async fn test_child_trigger_does_not_propagate_to_parent() {
        let parent = Trigger::new();
        let child = parent.child();
        child.trigger();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!parent.is_triggered());
    }
}
