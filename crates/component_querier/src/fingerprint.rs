//! Host fingerprint sent along with every query.
//!
//! Sources, in order of preference:
//! 1. `/etc/machine-id`, then `/var/lib/dbus/machine-id`
//! 2. hostname + first non-loopback MAC address from `/sys/class/net`
//! 3. hostname alone

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use sha2::{Digest, Sha256};
#[cfg(target_os = "linux")]
use std::{fs, path::Path};

/// Fingerprint of the local machine.
///
/// Stays the same across address changes, so a responder can tell which
/// host is asking.
pub fn host_fingerprint() -> i32 {
    let hostname = hostname::get_hostname().unwrap_or_else(|| String::from("Anonymous-host"));
    fingerprint_from(
        read_machine_id().as_ref().map(String::as_str),
        &hostname,
        first_mac().as_ref().map(String::as_str),
    )
}

pub(crate) fn fingerprint_from(machine_id: Option<&str>, hostname: &str, mac: Option<&str>) -> i32 {
    match (machine_id, mac) {
        (Some(id), _) => {
            debug!("host fingerprint from machine id");
            digest_i32(&[id.as_bytes()])
        }
        (None, Some(mac)) => {
            debug!("host fingerprint from hostname and mac {}", mac);
            digest_i32(&[hostname.as_bytes(), mac.as_bytes()])
        }
        (None, None) => {
            debug!("host fingerprint from hostname only");
            digest_i32(&[hostname.as_bytes()])
        }
    }
}

fn digest_i32(parts: &[&[u8]]) -> i32 {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.input(b"\0");
        }
        hasher.input(part);
    }
    let digest = hasher.result();
    LittleEndian::read_i32(&digest[..4])
}

fn valid_machine_id(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.len() >= 16 {
        Some(trimmed.to_string())
    } else {
        None
    }
}

#[cfg(target_os = "linux")]
fn read_machine_id() -> Option<String> {
    ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok())
        .filter_map(|content| valid_machine_id(&content))
        .next()
}

#[cfg(not(target_os = "linux"))]
fn read_machine_id() -> Option<String> {
    None
}

fn valid_mac(content: &str) -> Option<String> {
    let mac = content.trim();
    if mac.is_empty() || mac == "00:00:00:00:00:00" {
        None
    } else {
        Some(mac.to_lowercase())
    }
}

#[cfg(target_os = "linux")]
fn first_mac() -> Option<String> {
    let entries = fs::read_dir(Path::new("/sys/class/net")).ok()?;
    // read_dir order is unspecified
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "lo")
        .collect();
    names.sort();

    names.iter().find_map(|name| {
        fs::read_to_string(Path::new("/sys/class/net").join(name).join("address"))
            .ok()
            .and_then(|content| valid_mac(&content))
    })
}

#[cfg(not(target_os = "linux"))]
fn first_mac() -> Option<String> {
    None
}
