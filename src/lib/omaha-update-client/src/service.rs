// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::{
    delegate::OmahaDelegate,
    http_request::HttpRequest,
    state_machine::{self, timer::Timer, StateMachine, UpdateStatus},
};
use futures::lock::Mutex;
use log::info;
use std::cell::Cell;
use std::rc::Rc;
use std::time::SystemTime;

/// The host application's handle on the Omaha client.
///
/// Triggers (the start of a foreground session, or a scheduled wake-up) mark a job as pending;
/// a trigger that arrives while a job is already pending is coalesced into it.  The pending flag
/// is cleared when the job starts running, so at most one run of the state machine is ever
/// queued.
pub struct OmahaService<D, H>
where
    D: OmahaDelegate,
{
    state_machine: Mutex<StateMachine<D, H>>,
    storage: Rc<Mutex<D::Storage>>,
    official_build: bool,
    disabled: bool,
    job_pending: Cell<bool>,
}

impl<D, H> OmahaService<D, H>
where
    D: OmahaDelegate,
    H: HttpRequest,
{
    /// Only official builds talk to the server on their own.
    pub fn new(state_machine: StateMachine<D, H>, official_build: bool) -> Self {
        OmahaService {
            storage: state_machine.storage().clone(),
            disabled: state_machine.is_disabled(),
            state_machine: Mutex::new(state_machine),
            official_build,
            job_pending: Cell::new(false),
        }
    }

    pub fn state_machine(&self) -> &Mutex<StateMachine<D, H>> {
        &self.state_machine
    }

    pub fn is_job_pending(&self) -> bool {
        self.job_pending.get()
    }

    /// The user started using the application.  Returns whether a new job was queued.
    pub fn on_foreground_session_start(&self) -> bool {
        if !self.official_build || self.disabled {
            return false;
        }
        self.queue_job()
    }

    /// The wake-up the delegate scheduled has arrived.  Returns whether a new job was queued.
    pub fn on_scheduled_wakeup(&self) -> bool {
        self.queue_job()
    }

    fn queue_job(&self) -> bool {
        if self.job_pending.replace(true) {
            info!("Omaha job already pending");
            return false;
        }
        true
    }

    /// Run the state machine if a job is pending.  Returns whether it ran.
    pub async fn run_pending_job(&self) -> bool {
        if !self.job_pending.replace(false) {
            return false;
        }
        self.state_machine.lock().await.run().await;
        true
    }

    pub async fn check_for_updates(&self) -> UpdateStatus {
        self.state_machine.lock().await.check_for_updates().await
    }

    pub async fn is_probably_fresh_install(&self) -> bool {
        let storage = self.storage.lock().await;
        state_machine::is_probably_fresh_install(&*storage).await
    }

    /// Drive the service for as long as the state machine keeps itself scheduled.
    ///
    /// Starting counts as a foreground session.  After every run, `next_wakeup` reports the time
    /// the delegate was last asked to schedule (taking it), and the service sleeps until then.
    pub async fn serve<T: Timer>(
        &self,
        timer: &mut T,
        mut next_wakeup: impl FnMut() -> Option<SystemTime>,
    ) {
        self.on_foreground_session_start();
        loop {
            self.run_pending_job().await;
            let next = match next_wakeup() {
                Some(next) => next,
                None => {
                    info!("Nothing scheduled, stopping");
                    return;
                }
            };
            let now = self.state_machine.lock().await.now();
            timer.wait_until(now, next).await;
            self.on_scheduled_wakeup();
        }
    }
}
