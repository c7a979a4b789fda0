//! Installed-system state: the dpkg status database and extended states.

use std::collections::{BTreeSet, HashMap};

use crate::error::{RaptError, Result};

/// What the administrator wants done with a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Want {
    Unknown,
    Install,
    Hold,
    Deinstall,
    Purge,
}

/// The dpkg error flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Ok,
    Reinstreq,
}

/// The installation status of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NotInstalled,
    Unpacked,
    HalfConfigured,
    HalfInstalled,
    ConfigFiles,
    Installed,
    TriggersAwaited,
    TriggersPending,
}

impl Status {
    /// Whether a version in this status counts as present on the system.
    pub fn is_present(self) -> bool {
        !matches!(self, Status::NotInstalled | Status::ConfigFiles)
    }

    /// Whether a version in this status may satisfy relations of other
    /// packages. Partially installed states may not.
    pub fn satisfies_relations(self) -> bool {
        matches!(
            self,
            Status::Installed | Status::TriggersAwaited | Status::TriggersPending
        )
    }
}

/// One package's row in the dpkg status database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstalledRecord {
    pub want: Want,
    pub flag: Flag,
    pub status: Status,
}

impl InstalledRecord {
    pub fn installed() -> Self {
        Self {
            want: Want::Install,
            flag: Flag::Ok,
            status: Status::Installed,
        }
    }

    /// Parse the `Status:` triplet, e.g. `install ok installed`.
    pub fn parse(package_name: &str, input: &str) -> Result<Self> {
        let mut parts = input.split_whitespace();
        let want = match parts.next() {
            Some("install") => Want::Install,
            Some("deinstall") => Want::Deinstall,
            Some("hold") => Want::Hold,
            Some("purge") => Want::Purge,
            Some("unknown") => Want::Unknown,
            _ => {
                return Err(RaptError::MalformedRecord(format!(
                    "malformed 'desired' status indicator for package '{}'",
                    package_name
                )))
            }
        };
        let flag = match parts.next() {
            Some("ok") => Flag::Ok,
            Some("reinstreq") => Flag::Reinstreq,
            _ => {
                return Err(RaptError::MalformedRecord(format!(
                    "malformed 'error' status indicator for package '{}'",
                    package_name
                )))
            }
        };
        let status = match parts.next() {
            Some("not-installed") => Status::NotInstalled,
            Some("unpacked") => Status::Unpacked,
            Some("half-configured") => Status::HalfConfigured,
            Some("half-installed") => Status::HalfInstalled,
            Some("config-files") => Status::ConfigFiles,
            Some("installed") => Status::Installed,
            Some("triggers-awaited") => Status::TriggersAwaited,
            Some("triggers-pending") => Status::TriggersPending,
            _ => {
                return Err(RaptError::MalformedRecord(format!(
                    "malformed 'status' status indicator for package '{}'",
                    package_name
                )))
            }
        };
        Ok(Self { want, flag, status })
    }
}

/// The parsed system state: per-package installed records plus the
/// auto-installed set from the extended states file.
#[derive(Debug, Clone, Default)]
pub struct SystemState {
    records: HashMap<String, InstalledRecord>,
    auto_installed: BTreeSet<String>,
}

impl SystemState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_record(&mut self, package_name: impl Into<String>, record: InstalledRecord) {
        self.records.insert(package_name.into(), record);
    }

    pub fn mark_auto_installed(&mut self, package_name: impl Into<String>) {
        self.auto_installed.insert(package_name.into());
    }

    pub fn installed_record(&self, package_name: &str) -> Option<&InstalledRecord> {
        self.records.get(package_name)
    }

    pub fn is_automatically_installed(&self, package_name: &str) -> bool {
        self.auto_installed.contains(package_name)
    }

    /// Packages whose dpkg flag requests a reinstall.
    pub fn reinstall_required_package_names(&self) -> Vec<String> {
        let mut result: Vec<String> = self
            .records
            .iter()
            .filter(|(_, record)| record.flag == Flag::Reinstreq)
            .map(|(name, _)| name.clone())
            .collect();
        result.sort();
        result
    }
}
