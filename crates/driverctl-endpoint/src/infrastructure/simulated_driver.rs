//! In-memory driver runtime.
//!
//! `SimulatedDriver` stands in for a real driver when there is none to talk
//! to: in tests, and when exercising a tool against a configured set of
//! GPUs.  Lifecycle requests go through the same state machine the endpoint
//! uses to validate them, so the simulated status always follows the
//! protocol's rules.
//!
//! # Usage in tests
//!
//! ```ignore
//! let driver = Arc::new(SimulatedDriver::from_config(&DriverConfig {
//!     initial_status: DriverStatus::HaltedOnDeviceInit,
//!     ..DriverConfig::default()
//! }));
//! let use_case = HandleRequestUseCase::new(driver.clone(), CodecConfig::default());
//!
//! use_case.handle(&DriverControlPayload::StepDriverRequest { count: 1 }).unwrap();
//!
//! assert_eq!(driver.driver_status(), DriverStatus::LateDeviceInit);
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use driverctl_core::protocol::messages::{ClientInfo, DeviceClockMode};
use driverctl_core::{transition, DriverStatus, LifecycleRequest, ResultCode};
use tracing::{debug, info};

use crate::application::handle_request::{DeviceClocks, DriverRuntime};
use crate::infrastructure::config::{DriverConfig, GpuConfig};

struct SimulatedState {
    status: DriverStatus,
    gpus: Vec<GpuConfig>,
}

/// A driver runtime that keeps all state in memory.
pub struct SimulatedDriver {
    state: Mutex<SimulatedState>,
    client_info: ClientInfo,
}

impl SimulatedDriver {
    /// Creates a driver in `status` managing `gpus`.
    pub fn new(status: DriverStatus, gpus: Vec<GpuConfig>, client_info: ClientInfo) -> Self {
        Self {
            state: Mutex::new(SimulatedState { status, gpus }),
            client_info,
        }
    }

    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(
            config.initial_status,
            config.gpus.clone(),
            config.client.client_info(),
        )
    }

    /// Moves the driver to `status` without any lifecycle check.
    ///
    /// Models the driver reaching a checkpoint (or finishing initialization)
    /// on its own.
    pub fn set_status(&self, status: DriverStatus) {
        let mut state = self.state();
        info!(from = ?state.status, to = ?status, "simulated driver status changed");
        state.status = status;
    }

    // Every update is a single assignment, so a poisoned lock is still consistent.
    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, request: LifecycleRequest) -> Result<(), ResultCode> {
        let mut state = self.state();
        let next = transition(state.status, request).map_err(|e| {
            debug!(?request, error = %e, "simulated driver refused request");
            e.result_code()
        })?;
        debug!(?request, from = ?state.status, to = ?next, "simulated driver transition");
        state.status = next;
        Ok(())
    }

    fn with_gpu<T>(
        &self,
        gpu_index: u32,
        f: impl FnOnce(&mut GpuConfig) -> Result<T, ResultCode>,
    ) -> Result<T, ResultCode> {
        let index = usize::try_from(gpu_index).map_err(|_| ResultCode::InvalidParameter)?;
        let mut state = self.state();
        let gpu = state
            .gpus
            .get_mut(index)
            .ok_or(ResultCode::InvalidParameter)?;
        f(gpu)
    }
}

impl DriverRuntime for SimulatedDriver {
    fn driver_status(&self) -> DriverStatus {
        self.state().status
    }

    fn pause(&self) -> Result<(), ResultCode> {
        self.apply(LifecycleRequest::Pause)
    }

    fn resume(&self) -> Result<(), ResultCode> {
        self.apply(LifecycleRequest::Resume)
    }

    fn step(&self, count: u32) -> Result<(), ResultCode> {
        self.apply(LifecycleRequest::Step { count })
    }

    fn num_gpus(&self) -> u32 {
        u32::try_from(self.state().gpus.len()).unwrap_or(u32::MAX)
    }

    fn device_clock_mode(&self, gpu_index: u32) -> Result<DeviceClockMode, ResultCode> {
        self.with_gpu(gpu_index, |gpu| Ok(gpu.clock_mode))
    }

    fn set_device_clock_mode(
        &self,
        gpu_index: u32,
        mode: DeviceClockMode,
    ) -> Result<(), ResultCode> {
        self.with_gpu(gpu_index, |gpu| {
            if gpu.clocks_for(mode).is_none() {
                return Err(ResultCode::Unavailable);
            }
            gpu.clock_mode = mode;
            Ok(())
        })
    }

    fn device_clock(&self, gpu_index: u32) -> Result<DeviceClocks, ResultCode> {
        self.with_gpu(gpu_index, |gpu| {
            gpu.clocks_for(gpu.clock_mode).ok_or(ResultCode::Unavailable)
        })
    }

    fn max_device_clock(&self, gpu_index: u32) -> Result<DeviceClocks, ResultCode> {
        self.with_gpu(gpu_index, |gpu| Ok(gpu.max_clocks))
    }

    fn client_info(&self) -> ClientInfo {
        self.client_info.clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
