use ocl::enums::{DeviceInfo, DeviceInfoResult};
use ocl::{flags, Buffer, Context, Device, Kernel, Platform, Program, Queue};
use tracing::{debug, info};

use crate::cl_kernels::{NONCE_SEARCH, NONCE_SEARCH_KERNEL};
use crate::compute::{ComputeContext, ComputeError};
use crate::sha::Midstate;
use crate::types::WorkDims;

pub fn platforms() -> Result<Vec<Platform>, ComputeError> {
    let platforms = Platform::list();
    if platforms.is_empty() {
        return Err(ComputeError::NoPlatform);
    }
    Ok(platforms)
}

pub fn platform_names() -> Result<Vec<String>, ComputeError> {
    platforms()?
        .iter()
        .map(|p| p.name().map_err(|e| ComputeError::from(ocl::Error::from(e))))
        .collect()
}

fn select_platform(index: usize) -> Result<Platform, ComputeError> {
    let platforms = platforms()?;
    let count = platforms.len();
    platforms
        .into_iter()
        .nth(index)
        .ok_or(ComputeError::InvalidPlatform { index, count })
}

fn devices(platform: Platform) -> Result<Vec<Device>, ComputeError> {
    let devices = Device::list_all(platform)?;
    if devices.is_empty() {
        return Err(ComputeError::NoDevice);
    }
    Ok(devices)
}

pub fn device_names(platform_index: usize) -> Result<Vec<String>, ComputeError> {
    devices(select_platform(platform_index)?)?
        .iter()
        .map(|d| d.name().map_err(|e| ComputeError::from(ocl::Error::from(e))))
        .collect()
}

fn select_device(platform: Platform, index: usize) -> Result<Device, ComputeError> {
    let devices = devices(platform)?;
    let count = devices.len();
    devices
        .into_iter()
        .nth(index)
        .ok_or(ComputeError::InvalidDevice { index, count })
}

/// `CL_DEVICE_MAX_WORK_ITEM_SIZES` for the first three dimensions.
pub fn max_work_item_sizes(platform_index: usize, device_index: usize) -> Result<[usize; 3], ComputeError> {
    let device = select_device(select_platform(platform_index)?, device_index)?;
    match device.info(DeviceInfo::MaxWorkItemSizes).map_err(ocl::Error::from)? {
        DeviceInfoResult::MaxWorkItemSizes(sizes) => {
            let mut out = [1usize; 3];
            for (slot, size) in out.iter_mut().zip(sizes) {
                *slot = size;
            }
            Ok(out)
        }
        other => Err(ComputeError::OpenCl(format!("unexpected device info result: {other:?}"))),
    }
}

/// OpenCL backend: one context, queue and `nonce_search` kernel on a single
/// device, with a `found` flag buffer sized to the batch.
pub struct GpuExec {
    _ctx: Context,
    q: Queue,
    kernel: Kernel,
    found: Buffer<u8>,
    midstate: Option<Buffer<u32>>,
    results: Vec<u8>,
    dims: WorkDims,
}

impl GpuExec {
    pub fn new(platform_index: usize, device_index: usize, dims: WorkDims) -> Result<Self, ComputeError> {
        let platform = select_platform(platform_index)?;
        let device = select_device(platform, device_index)?;
        info!(
            platform = %platform.name().unwrap_or_default(),
            device = %device.name().unwrap_or_default(),
            "Setting up OpenCL miner"
        );

        let ctx = Context::builder().platform(platform).devices(device.clone()).build()?;
        let q = Queue::new(&ctx, device.clone(), None)?;
        let prog = Program::builder()
            .src(NONCE_SEARCH)
            .devices(device)
            .build(&ctx)
            .map_err(|e| ComputeError::Build(e.to_string()))?;

        let lanes = dims.batch_size() as usize;
        let found: Buffer<u8> = Buffer::builder()
            .queue(q.clone())
            .flags(flags::MEM_WRITE_ONLY)
            .len(lanes)
            .build()?;

        let kernel = Kernel::builder()
            .program(&prog).name(NONCE_SEARCH_KERNEL)
            .queue(q.clone())
            .global_work_size(dims.as_array())
            .arg_named("midstate", None::<&Buffer<u32>>)
            .arg_named("found", &found)
            .arg_named("cursor", &0u64)
            .arg_named("difficulty_mask", &0u32)
            .build()?;

        debug!(?dims, lanes, "OpenCL kernel ready");
        Ok(Self { _ctx: ctx, q, kernel, found, midstate: None, results: vec![0u8; lanes], dims })
    }
}

impl ComputeContext for GpuExec {
    fn batch_size(&self) -> u32 {
        self.dims.batch_size()
    }

    fn install_midstate(&mut self, midstate: &Midstate) -> Result<(), ComputeError> {
        // Drop (release) the old buffer before allocating its replacement.
        self.midstate = None;
        let buf: Buffer<u32> = Buffer::builder()
            .queue(self.q.clone())
            .flags(flags::MEM_READ_ONLY)
            .len(midstate.0.len())
            .copy_host_slice(&midstate.0)
            .build()?;
        self.kernel.set_arg("midstate", &buf)?;
        self.midstate = Some(buf);
        Ok(())
    }

    fn submit_batch(&mut self, cursor: u64, difficulty_mask: u32) -> Result<Vec<bool>, ComputeError> {
        if self.midstate.is_none() {
            return Err(ComputeError::NoMidstate);
        }
        self.kernel.set_arg("cursor", &cursor)?;
        self.kernel.set_arg("difficulty_mask", &difficulty_mask)?;

        unsafe { self.kernel.enq()?; }
        self.q.finish()?;

        self.found.read(&mut self.results).enq()?;
        Ok(self.results.iter().map(|&flag| flag == 1).collect())
    }
}
