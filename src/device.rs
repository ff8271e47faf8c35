//! Accelerator resource handles.
//!
//! A [`DeviceResourcePool`] hands out per-device handles. Index migration
//! borrows one through a [`ResourceScope`], which returns it to the pool
//! when dropped, whichever way the migrating call exits. Memory placed on a
//! device is charged against that device's budget through
//! [`DeviceAllocation`] guards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{IvfError, Result};

/// Memory accounting for one device.
#[derive(Debug)]
pub struct DeviceMemory {
    device_id: i64,
    budget: usize,
    used: AtomicUsize,
}

impl DeviceMemory {
    pub fn new(device_id: i64, budget: usize) -> Self {
        Self {
            device_id,
            budget,
            used: AtomicUsize::new(0),
        }
    }

    pub fn device_id(&self) -> i64 {
        self.device_id
    }

    /// Total bytes this device can hold.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Bytes currently allocated.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.budget.saturating_sub(self.used())
    }

    /// Reserve `bytes`, failing with [`IvfError::Allocation`] past the budget.
    pub fn allocate(self: &Arc<Self>, bytes: usize) -> Result<DeviceAllocation> {
        self.charge(bytes)?;
        Ok(DeviceAllocation {
            memory: Arc::clone(self),
            bytes,
        })
    }

    fn charge(&self, bytes: usize) -> Result<()> {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&total| total <= self.budget)
            })
            .map_err(|used| {
                IvfError::allocation(format!(
                    "device {} cannot allocate {bytes} bytes ({used} of {} in use)",
                    self.device_id, self.budget
                ))
            })?;
        Ok(())
    }
}

/// Bytes held on a device; released on drop.
#[derive(Debug)]
pub struct DeviceAllocation {
    memory: Arc<DeviceMemory>,
    bytes: usize,
}

impl DeviceAllocation {
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn memory(&self) -> &Arc<DeviceMemory> {
        &self.memory
    }

    /// Extend this allocation by `additional` bytes.
    pub fn grow(&mut self, additional: usize) -> Result<()> {
        self.memory.charge(additional)?;
        self.bytes += additional;
        Ok(())
    }
}

impl Drop for DeviceAllocation {
    fn drop(&mut self) {
        self.memory.used.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

/// A borrowed device handle.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    device_id: i64,
    slot: usize,
    memory: Arc<DeviceMemory>,
}

impl DeviceHandle {
    pub fn new(device_id: i64, slot: usize, memory: Arc<DeviceMemory>) -> Self {
        Self {
            device_id,
            slot,
            memory,
        }
    }

    pub fn device_id(&self) -> i64 {
        self.device_id
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn memory(&self) -> &Arc<DeviceMemory> {
        &self.memory
    }
}

/// A source of device handles.
pub trait DeviceResourcePool: Send + Sync + fmt::Debug {
    /// Take a free handle for `device_id`, or `None` if none is available.
    fn get_handle(&self, device_id: i64) -> Option<DeviceHandle>;

    /// Give back a handle obtained from [`get_handle`](Self::get_handle).
    fn release(&self, handle: DeviceHandle);
}

/// A handle held for the duration of one call.
#[derive(Debug)]
pub struct ResourceScope<'a> {
    pool: &'a dyn DeviceResourcePool,
    handle: DeviceHandle,
}

impl<'a> ResourceScope<'a> {
    /// Borrow a handle for `device_id` from `pool`.
    pub fn acquire(pool: &'a dyn DeviceResourcePool, device_id: i64) -> Result<Self> {
        match pool.get_handle(device_id) {
            Some(handle) => {
                debug!("Acquired handle {} on device {device_id}", handle.slot());
                Ok(Self { pool, handle })
            }
            None => Err(IvfError::resource_unavailable(format!(
                "no resource available for device {device_id}"
            ))),
        }
    }

    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }
}

impl Drop for ResourceScope<'_> {
    fn drop(&mut self) {
        debug!(
            "Released handle {} on device {}",
            self.handle.slot(),
            self.handle.device_id()
        );
        self.pool.release(self.handle.clone());
    }
}

/// Configuration for [`StandardResourcePool`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceResourceConfig {
    /// Device ids served by the pool.
    pub devices: Vec<i64>,
    /// Concurrent handles per device.
    pub handles_per_device: usize,
    /// Memory budget per device in bytes.
    pub memory_budget: usize,
}

impl Default for DeviceResourceConfig {
    fn default() -> Self {
        Self {
            devices: vec![0],
            handles_per_device: 2,
            memory_budget: 1 << 30,
        }
    }
}

#[derive(Debug)]
struct DeviceSlots {
    memory: Arc<DeviceMemory>,
    free: Mutex<Vec<usize>>,
}

/// In-process pool with a fixed number of handles per device.
#[derive(Debug)]
pub struct StandardResourcePool {
    devices: HashMap<i64, DeviceSlots>,
}

impl StandardResourcePool {
    pub fn new(config: DeviceResourceConfig) -> Self {
        let devices = config
            .devices
            .iter()
            .map(|&device_id| {
                let slots = DeviceSlots {
                    memory: Arc::new(DeviceMemory::new(device_id, config.memory_budget)),
                    free: Mutex::new((0..config.handles_per_device).rev().collect()),
                };
                (device_id, slots)
            })
            .collect();
        Self { devices }
    }

    /// Free handles for `device_id`.
    pub fn free_handles(&self, device_id: i64) -> usize {
        self.devices
            .get(&device_id)
            .map(|slots| slots.free.lock().len())
            .unwrap_or(0)
    }

    /// Memory accounting for `device_id`.
    pub fn memory(&self, device_id: i64) -> Option<&Arc<DeviceMemory>> {
        self.devices.get(&device_id).map(|slots| &slots.memory)
    }
}

impl Default for StandardResourcePool {
    fn default() -> Self {
        Self::new(DeviceResourceConfig::default())
    }
}

impl DeviceResourcePool for StandardResourcePool {
    fn get_handle(&self, device_id: i64) -> Option<DeviceHandle> {
        let slots = self.devices.get(&device_id)?;
        let slot = slots.free.lock().pop()?;
        Some(DeviceHandle::new(device_id, slot, Arc::clone(&slots.memory)))
    }

    fn release(&self, handle: DeviceHandle) {
        match self.devices.get(&handle.device_id) {
            Some(slots) => slots.free.lock().push(handle.slot),
            None => warn!("Released handle for unknown device {}", handle.device_id),
        }
    }
}
