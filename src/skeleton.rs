//! Skeleton character device
//!
//! The device-creation scaffolding of the driver without any GPIO logic:
//! `NumOfDevices` nodes named `iopin<minor>` that accept every write and
//! always read as end of file. Useful to check the class, region and node
//! handling on a platform before any register is touched.

use alloc::vec::Vec;
use log::{error, info, warn};

use crate::chrdev::{self, Cdev, DevT, Inode, Platform};
use crate::error::{Error, Result};
use crate::iopin::config::{parameters, parse_number};
use crate::iopin::device::node_name;
use crate::iopin::DRIVER_NAME;

/// Parameters of the skeleton module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkeletonParams {
    /// Number of devices to be created
    pub num_of_devices: u32,
}

impl Default for SkeletonParams {
    fn default() -> Self {
        SkeletonParams { num_of_devices: 1 }
    }
}

impl SkeletonParams {
    /// Parse `NumOfDevices=<n>`; missing means one device.
    pub fn parse(args: &str) -> Result<Self> {
        let mut params = SkeletonParams::default();
        for (key, value) in parameters(args) {
            match key {
                "NumOfDevices" => params.num_of_devices = parse_number(value)?,
                _ => {
                    warn!("[IOPin] Unknown parameter '{}'", key);
                    return Err(Error::InvalidArgument);
                }
            }
        }
        Ok(params)
    }
}

/// An open skeleton device.
#[derive(Debug)]
pub struct SkeletonFile {
    minor: u32,
}

impl SkeletonFile {
    pub fn minor(&self) -> u32 {
        self.minor
    }
}

/// Loaded skeleton module.
pub struct SkeletonModule<P: Platform> {
    platform: P,
    count: u32,
    region: Option<DevT>,
    class: Option<P::Class>,
    devices: Vec<Cdev>,
}

impl<P: Platform> SkeletonModule<P> {
    /// Register the region and class and create `count` nodes. Any failure
    /// releases everything acquired so far.
    pub fn init(platform: P, count: u32) -> Result<Self> {
        info!("[IOPin] Initing module...");

        if count == 0 {
            error!("[IOPin] No device requested");
            return Err(Error::InvalidArgument);
        }

        let mut module = SkeletonModule {
            platform,
            count,
            region: None,
            class: None,
            devices: Vec::new(),
        };

        if let Err(e) = module.acquire() {
            error!("[IOPin] Error registering driver - ret={}", e.to_errno());
            module.teardown();
            return Err(e);
        }

        info!("[IOPin] Initialized");
        Ok(module)
    }

    fn acquire(&mut self) -> Result<()> {
        let major = self.platform.alloc_chrdev_region(0, self.count, DRIVER_NAME)?;
        self.region = Some(DevT::new(major, 0));

        let class = self.platform.class_create(DRIVER_NAME)?;
        let class = self.class.insert(class);

        chrdev::reserve_array(&self.platform, &mut self.devices, self.count as usize)?;

        for minor in 0..self.count {
            let cdev = chrdev::construct_node(
                &self.platform,
                class,
                DevT::new(major, minor),
                &node_name(minor),
            )?;
            self.devices.push(cdev);
        }

        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(class) = self.class.as_ref() {
            while let Some(cdev) = self.devices.pop() {
                chrdev::destroy_node(&self.platform, class, cdev);
            }
        }
        self.devices = Vec::new();

        if let Some(class) = self.class.take() {
            self.platform.class_destroy(class);
        }

        if let Some(first) = self.region.take() {
            self.platform.unregister_chrdev_region(first, self.count);
        }
    }

    /// Unload the module.
    pub fn exit(mut self) {
        self.teardown();
        info!("[IOPin] Module removed");
    }

    pub fn major(&self) -> Option<u32> {
        self.region.map(DevT::major)
    }

    pub fn open(&self, inode: &Inode) -> Result<SkeletonFile> {
        let (major, minor) = (inode.rdev.major(), inode.rdev.minor());
        let Some(cdev) = self
            .devices
            .get(minor as usize)
            .filter(|_| Some(major) == self.major())
        else {
            warn!("[IOPin] No device found with Major={} and Minor={}", major, minor);
            return Err(Error::NoDevice);
        };

        if !cdev.matches(inode) {
            warn!("[IOPin] open: internal error");
            return Err(Error::NoDevice);
        }

        info!("[IOPin] Open on {}:{}", major, minor);
        Ok(SkeletonFile { minor })
    }

    pub fn release(&self, file: SkeletonFile) -> Result<()> {
        info!("[IOPin] Release on minor {}", file.minor);
        Ok(())
    }

    /// Always end of file.
    pub fn read(&self, file: &SkeletonFile, _buf: &mut [u8]) -> Result<usize> {
        info!("[IOPin] Read on minor {}", file.minor);
        Ok(0)
    }

    /// Swallow the buffer.
    pub fn write(&self, file: &SkeletonFile, buf: &[u8]) -> Result<usize> {
        info!("[IOPin] Write on minor {}", file.minor);
        Ok(buf.len())
    }
}

impl<P: Platform> Drop for SkeletonModule<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}
