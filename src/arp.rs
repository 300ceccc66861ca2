// Reads the kernel ARP table to suggest devices for import.
//
// /proc/net/arp looks like:
//
// IP address       HW type     Flags       HW address            Mask     Device
// 192.168.1.1      0x1         0x2         aa:bb:cc:dd:ee:ff     *        eth0

use crate::wol::mac;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

pub const DEFAULT_ARP_PATH: &str = "/proc/net/arp";
const INCOMPLETE_FLAGS: &str = "0x0";
const IGNORED_MACS: [&str; 2] = ["00:00:00:00:00:00", "ff:ff:ff:ff:ff:ff"];

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub ip: String,
    pub mac: String,
    pub device: String,
    #[serde(skip)]
    pub flags: String,
}

/// Parses complete entries with usable hardware addresses from `path`.
pub fn parse_path(path: impl AsRef<Path>) -> io::Result<Vec<Entry>> {
    parse(BufReader::new(File::open(path)?))
}

pub fn parse(reader: impl BufRead) -> io::Result<Vec<Entry>> {
    let mut entries = vec![];
    // The first line is the column header.
    for line in reader.lines().skip(1) {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(entry) = parse_line(line).filter(is_usable) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn parse_line(line: &str) -> Option<Entry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 6 {
        return None;
    }
    Some(Entry {
        ip: fields[0].to_string(),
        flags: fields[2].to_string(),
        mac: fields[3].to_string(),
        device: fields[5].to_string(),
    })
}

fn is_usable(entry: &Entry) -> bool {
    mac::is_colon_form(&entry.mac)
        && !IGNORED_MACS.iter().any(|m| m.eq_ignore_ascii_case(&entry.mac))
        && entry.flags != INCOMPLETE_FLAGS
}

/// Entries seen on real interfaces, skipping loopback.
pub fn local_entries(path: impl AsRef<Path>) -> io::Result<Vec<Entry>> {
    Ok(parse_path(path)?
        .into_iter()
        .filter(|e| !e.device.is_empty() && e.device != "lo")
        .collect())
}

pub fn by_device(path: impl AsRef<Path>, device: &str) -> io::Result<Vec<Entry>> {
    Ok(parse_path(path)?
        .into_iter()
        .filter(|e| e.device == device)
        .collect())
}

pub fn by_ip(path: impl AsRef<Path>, ip: &str) -> io::Result<Option<Entry>> {
    Ok(parse_path(path)?.into_iter().find(|e| e.ip == ip))
}

/// Matches regardless of separators and case, so `AABB.CCDD.EEFF` finds `aa:bb:cc:dd:ee:ff`.
pub fn find_by_mac(path: impl AsRef<Path>, mac: &str) -> io::Result<Vec<Entry>> {
    let wanted = hex_digits(mac);
    Ok(parse_path(path)?
        .into_iter()
        .filter(|e| hex_digits(&e.mac) == wanted)
        .collect())
}

/// Unique interface names, sorted.
pub fn devices(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    Ok(parse_path(path)?
        .into_iter()
        .filter(|e| !e.device.is_empty())
        .map(|e| e.device)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect())
}

fn hex_digits(mac: &str) -> String {
    mac.chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
