// src/engine/scheduler.rs
//
// Coalescing settings scheduler.
//
// Submissions overwrite a single pending slot and bump a settings version; the
// worker waits for a quiet window and then applies only the latest version.
// Intermediate snapshots are dropped, never queued.

use crate::config::EngineConfig;
use crate::engine::codec::LossyCodec;
use crate::engine::orchestrator::CompressionOutcome;
use crate::engine::session::ImageSession;
use crate::error::Result;
use crate::ops::CompressionSettings;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Result of one applied settings version.
#[derive(Debug)]
pub struct SchedulerEvent {
    pub version: u64,
    pub settings: CompressionSettings,
    pub result: Result<Arc<CompressionOutcome>>,
}

type Listener = Box<dyn FnMut(SchedulerEvent) + Send>;

#[derive(Debug)]
struct Pending {
    version: u64,
    settings: CompressionSettings,
    submitted_at: Instant,
}

#[derive(Debug, Default)]
struct Mailbox {
    pending: Option<Pending>,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Shared {
    mailbox: Mutex<Mailbox>,
    cvar: Condvar,
    version: AtomicU64,
}

pub struct SettingsScheduler {
    shared: Arc<Shared>,
    cancel: Box<dyn Fn() + Send + Sync>,
    worker: Option<JoinHandle<()>>,
}

impl SettingsScheduler {
    pub fn spawn<C>(session: Arc<ImageSession<C>>, config: &EngineConfig) -> Self
    where
        C: LossyCodec + 'static,
    {
        Self::spawn_with_listener(session, config.debounce, |_| {})
    }

    /// Spawn the worker; `listener` sees every applied version, including
    /// superseded and failed ones.
    pub fn spawn_with_listener<C, L>(
        session: Arc<ImageSession<C>>,
        debounce: Duration,
        listener: L,
    ) -> Self
    where
        C: LossyCodec + 'static,
        L: FnMut(SchedulerEvent) + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let worker_session = Arc::clone(&session);
        let listener: Listener = Box::new(listener);
        let worker = std::thread::Builder::new()
            .name("quality-lens-scheduler".to_string())
            .spawn(move || run_worker(worker_shared, worker_session, debounce, listener))
            .ok();
        if worker.is_none() {
            tracing::warn!("failed to spawn scheduler thread; submissions will be dropped");
        }

        Self {
            shared,
            cancel: Box::new(move || {
                session.cancel_in_flight();
            }),
            worker,
        }
    }

    /// Replace the pending snapshot and restart the quiet window.
    /// Any run still in flight becomes stale.
    pub fn submit(&self, settings: CompressionSettings) -> u64 {
        let version = self.shared.version.fetch_add(1, Ordering::AcqRel) + 1;
        {
            let mut mailbox = self.shared.mailbox.lock();
            if let Some(dropped) = mailbox.pending.replace(Pending {
                version,
                settings,
                submitted_at: Instant::now(),
            }) {
                tracing::trace!(dropped = dropped.version, version, "coalesced settings");
            }
        }
        (self.cancel)();
        self.shared.cvar.notify_all();
        version
    }

    /// Latest submitted settings version.
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::Acquire)
    }

    /// Stop the worker and wait for it. A pending snapshot is discarded.
    pub fn shutdown(&mut self) {
        {
            let mut mailbox = self.shared.mailbox.lock();
            mailbox.shutdown = true;
            mailbox.pending = None;
        }
        self.shared.cvar.notify_all();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::warn!("scheduler thread panicked");
            }
        }
    }
}

impl Drop for SettingsScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<C: LossyCodec>(
    shared: Arc<Shared>,
    session: Arc<ImageSession<C>>,
    debounce: Duration,
    mut listener: Listener,
) {
    loop {
        let next = {
            let mut mailbox = shared.mailbox.lock();
            loop {
                if mailbox.shutdown {
                    return;
                }
                let deadline = mailbox
                    .pending
                    .as_ref()
                    .map(|pending| pending.submitted_at + debounce);
                match deadline {
                    None => {
                        shared.cvar.wait(&mut mailbox);
                    }
                    Some(deadline) if Instant::now() >= deadline => break mailbox.pending.take(),
                    Some(deadline) => {
                        shared.cvar.wait_until(&mut mailbox, deadline);
                    }
                }
            }
        };
        let Some(pending) = next else {
            continue;
        };

        tracing::debug!(version = pending.version, "applying settings");
        let result = session.apply(pending.settings);
        if let Err(err) = &result {
            if err.is_user_visible() {
                tracing::debug!(version = pending.version, error = %err, "settings run failed");
            }
        }
        listener(SchedulerEvent {
            version: pending.version,
            settings: pending.settings,
            result,
        });
    }
}
