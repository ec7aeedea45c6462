//! Process-wide registry of connected switches.
//!
//! The pool maps `DPID → (AuxID → session)` and is the sole owner of
//! [`Device`] instances. Writes are serialized behind one lock; readers get
//! snapshots. Removing the main (aux 0) session cancels every auxiliary
//! sharing the DPID and drops the device.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::device::Device;
use crate::openflow0x01::MAIN_CONNECTION;
use crate::session::SessionHandle;

struct PoolEntry {
    device: Arc<Device>,
    sessions: HashMap<u8, SessionHandle>,
}

#[derive(Default)]
pub struct Pool {
    inner: Mutex<HashMap<u64, PoolEntry>>,
}

impl Pool {
    pub fn new() -> Pool {
        Pool::default()
    }

    /// Register a session under `(device.id(), aux_id)`. A stale session
    /// already holding the slot is cancelled and displaced, so a switch that
    /// reconnects after a silent drop is not locked out.
    pub fn register(&self, device: Arc<Device>, aux_id: u8, session: SessionHandle) {
        let dpid = device.id();
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.entry(dpid).or_insert_with(|| PoolEntry {
            device: device.clone(),
            sessions: HashMap::new(),
        });
        if aux_id == MAIN_CONNECTION {
            entry.device = device;
        }
        if let Some(stale) = entry.sessions.insert(aux_id, session) {
            warn!(
                "displacing a stale session for switch {:016x} aux {}",
                dpid, aux_id
            );
            stale.cancel();
        }
        info!("switch {:016x} aux {} registered", dpid, aux_id);
    }

    /// Remove one session. Removing the main session cancels every
    /// remaining session for the DPID and destroys the device entry;
    /// removing an auxiliary leaves the others untouched.
    pub fn deregister(&self, dpid: u64, aux_id: u8) {
        let mut inner = self.inner.lock().unwrap();
        let Some(entry) = inner.get_mut(&dpid) else {
            return;
        };
        entry.sessions.remove(&aux_id);
        if aux_id == MAIN_CONNECTION {
            for (_, session) in entry.sessions.drain() {
                session.cancel();
            }
        }
        if entry.sessions.is_empty() {
            inner.remove(&dpid);
        }
        info!("switch {:016x} aux {} deregistered", dpid, aux_id);
    }

    pub fn device(&self, dpid: u64) -> Option<Arc<Device>> {
        self.inner
            .lock()
            .unwrap()
            .get(&dpid)
            .map(|e| e.device.clone())
    }

    /// Snapshot of every registered switch.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.inner
            .lock()
            .unwrap()
            .values()
            .map(|e| e.device.clone())
            .collect()
    }

    /// Snapshot of every session for a DPID, any aux id.
    pub fn sessions(&self, dpid: u64) -> Vec<SessionHandle> {
        self.inner
            .lock()
            .unwrap()
            .get(&dpid)
            .map(|e| e.sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
