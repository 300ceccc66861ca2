// Device registry persisted as a JSON array, rewritten whole on every change.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub mac: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("device with MAC {0} already exists")]
    Duplicate(String),
    #[error("device with MAC {0} not found")]
    NotFound(String),
    #[error("failed to access store file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse store file: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct DeviceStore {
    path: PathBuf,
    devices: RwLock<Vec<Device>>,
}

impl DeviceStore {
    /// Opens the registry at `path`. A missing or empty file is an empty registry.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let devices = read_devices(&path)?;
        debug!("loaded {} devices from {}", devices.len(), path.display());
        Ok(Self {
            path,
            devices: RwLock::new(devices),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the in-memory list with the file's current contents.
    pub fn reload(&self) -> Result<(), Error> {
        let devices = read_devices(&self.path)?;
        *self.write() = devices;
        Ok(())
    }

    pub fn list(&self) -> Vec<Device> {
        self.read().clone()
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    pub fn get_by_mac(&self, mac: &str) -> Option<Device> {
        self.read().iter().find(|d| d.mac == mac).cloned()
    }

    pub fn get_by_group(&self, group: &str) -> Vec<Device> {
        self.read()
            .iter()
            .filter(|d| d.group == group)
            .cloned()
            .collect()
    }

    /// Unique non-empty group names, sorted.
    pub fn groups(&self) -> Vec<String> {
        self.read()
            .iter()
            .filter(|d| !d.group.is_empty())
            .map(|d| d.group.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn add(&self, device: Device) -> Result<(), Error> {
        let mut devices = self.write();
        if devices.iter().any(|d| d.mac == device.mac) {
            return Err(Error::Duplicate(device.mac));
        }
        devices.push(device);
        if let Err(e) = write_devices(&self.path, &devices) {
            devices.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Replaces the device registered under `mac`. The stored MAC never changes.
    pub fn update(&self, mac: &str, mut updated: Device) -> Result<(), Error> {
        let mut devices = self.write();
        let idx = devices
            .iter()
            .position(|d| d.mac == mac)
            .ok_or_else(|| Error::NotFound(mac.to_string()))?;
        updated.mac = mac.to_string();
        let previous = std::mem::replace(&mut devices[idx], updated);
        if let Err(e) = write_devices(&self.path, &devices) {
            devices[idx] = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn delete(&self, mac: &str) -> Result<(), Error> {
        let mut devices = self.write();
        let idx = devices
            .iter()
            .position(|d| d.mac == mac)
            .ok_or_else(|| Error::NotFound(mac.to_string()))?;
        let removed = devices.remove(idx);
        if let Err(e) = write_devices(&self.path, &devices) {
            devices.insert(idx, removed);
            return Err(e);
        }
        Ok(())
    }

    // A poisoned lock still holds a consistent list: every mutation rolls back before returning.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Device>> {
        self.devices.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Device>> {
        self.devices.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_devices(path: &Path) -> Result<Vec<Device>, Error> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e.into()),
    };
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(vec![]);
    }
    Ok(serde_json::from_slice(&data)?)
}

fn write_devices(path: &Path, devices: &[Device]) -> Result<(), Error> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let data = serde_json::to_vec_pretty(devices)?;
    fs::write(path, data)?;
    Ok(())
}
