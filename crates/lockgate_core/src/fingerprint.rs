use sha2::{Digest, Sha256};

use crate::activation;

/// The identifying attributes of a machine. Unavailable sources are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineIdentity {
    pub platform_id: String,
    pub primary_mac: String,
    pub hostname: String,
}

impl MachineIdentity {
    pub fn new(
        platform_id: impl Into<String>,
        primary_mac: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            platform_id: platform_id.into(),
            primary_mac: primary_mac.into(),
            hostname: hostname.into(),
        }
    }

    /// Read the identity of the current machine. Never fails; a source that
    /// cannot be read contributes an empty string.
    pub fn collect() -> Self {
        let identity = Self {
            platform_id: get_platform_id(),
            primary_mac: get_primary_mac(),
            hostname: get_hostname(),
        };
        log::debug!(
            "machine identity sources: platform_id={} mac={} hostname={}",
            present(&identity.platform_id),
            present(&identity.primary_mac),
            present(&identity.hostname),
        );
        identity
    }

    /// SHA-256 over `platform_id|primary_mac|hostname`.
    pub fn digest(&self) -> [u8; 32] {
        let combined = format!("{}|{}|{}", self.platform_id, self.primary_mac, self.hostname);
        Sha256::digest(combined.as_bytes()).into()
    }

    /// Activation code for this identity.
    pub fn activation_code(&self) -> String {
        activation::encode(&self.digest())
    }

    /// Hex form of the truncated digest, as bound into license claims.
    pub fn fingerprint_hex(&self) -> String {
        hex::encode(&self.digest()[..activation::CODE_BYTES])
    }
}

/// Activation code (`XXXX-XXXX-XXXX-XXXX`) of the current machine.
pub fn generate_fingerprint() -> String {
    MachineIdentity::collect().activation_code()
}

/// Hex fingerprint of the current machine, the form compared during
/// verification.
pub fn local_fingerprint_hex() -> String {
    MachineIdentity::collect().fingerprint_hex()
}

fn present(value: &str) -> &'static str {
    if value.is_empty() {
        "missing"
    } else {
        "present"
    }
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default()
}

// ---- Platform-specific implementations ----

// First readable, non-blank file among `paths`, trimmed.
#[cfg(any(target_os = "linux", target_os = "macos", test))]
fn first_file_id<P: AsRef<std::path::Path>>(paths: &[P]) -> String {
    paths
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

#[cfg(target_os = "linux")]
fn get_platform_id() -> String {
    first_file_id(&["/etc/machine-id", "/var/lib/dbus/machine-id"])
}

#[cfg(target_os = "linux")]
fn get_primary_mac() -> String {
    const IFF_LOOPBACK: u32 = 0x8;

    let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
        return String::new();
    };

    let read = |dir: &std::path::Path, file: &str| {
        std::fs::read_to_string(dir.join(file))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    // (ifindex, mac) so the result follows kernel enumeration order.
    let mut candidates: Vec<(u32, String)> = Vec::new();
    for entry in entries.flatten() {
        let dir = entry.path();
        let flags = u32::from_str_radix(read(&dir, "flags").trim_start_matches("0x"), 16)
            .unwrap_or_default();
        if flags & IFF_LOOPBACK != 0 {
            continue;
        }
        if read(&dir, "addr_len") == "0" {
            continue;
        }
        let mac = read(&dir, "address").to_lowercase();
        if mac.is_empty() {
            continue;
        }
        let index = read(&dir, "ifindex").parse().unwrap_or(u32::MAX);
        candidates.push((index, mac));
    }

    candidates.sort();
    candidates
        .into_iter()
        .next()
        .map(|(_, mac)| mac)
        .unwrap_or_default()
}

#[cfg(target_os = "macos")]
fn get_platform_id() -> String {
    let host_id = first_file_id(&["/etc/hostid"]);
    if !host_id.is_empty() {
        return host_id;
    }
    command_output("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"])
        .and_then(|output| {
            output
                .lines()
                .find(|l| l.contains("IOPlatformUUID"))
                .and_then(|l| l.split('"').nth(3))
                .map(|s| s.trim().to_string())
        })
        .unwrap_or_default()
}

#[cfg(target_os = "macos")]
fn get_primary_mac() -> String {
    // ifconfig lists interfaces in index order; lo0 carries no ether line.
    command_output("ifconfig", &["-a"])
        .and_then(|output| {
            output
                .lines()
                .map(str::trim)
                .find_map(|l| l.strip_prefix("ether "))
                .map(|mac| mac.trim().to_lowercase())
        })
        .unwrap_or_default()
}

#[cfg(target_os = "windows")]
fn get_platform_id() -> String {
    command_output("wmic", &["csproduct", "get", "UUID"])
        .and_then(|output| {
            output
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty() && !l.contains("UUID"))
                .map(String::from)
        })
        .unwrap_or_default()
}

#[cfg(target_os = "windows")]
fn get_primary_mac() -> String {
    use windows::Win32::NetworkManagement::IpHelper::{
        GetAdaptersAddresses, GAA_FLAG_SKIP_ANYCAST, GAA_FLAG_SKIP_MULTICAST,
        IP_ADAPTER_ADDRESSES_LH,
    };
    use windows::Win32::Networking::WinSock::AF_UNSPEC;

    const IF_TYPE_SOFTWARE_LOOPBACK: u32 = 24;
    const ERROR_BUFFER_OVERFLOW: u32 = 111;

    let mut buf_len: u32 = 15000;
    let mut buffer: Vec<u8>;

    loop {
        buffer = vec![0u8; buf_len as usize];
        let ret = unsafe {
            GetAdaptersAddresses(
                AF_UNSPEC.0 as u32,
                GAA_FLAG_SKIP_ANYCAST | GAA_FLAG_SKIP_MULTICAST,
                None,
                Some(buffer.as_mut_ptr() as *mut IP_ADAPTER_ADDRESSES_LH),
                &mut buf_len,
            )
        };
        if ret == 0 {
            break;
        }
        if ret == ERROR_BUFFER_OVERFLOW {
            continue;
        }
        log::debug!("GetAdaptersAddresses failed with error {}", ret);
        return String::new();
    }

    let mut adapter = buffer.as_ptr() as *const IP_ADAPTER_ADDRESSES_LH;
    while !adapter.is_null() {
        let a = unsafe { &*adapter };
        let phys_len = a.PhysicalAddressLength as usize;
        if a.IfType != IF_TYPE_SOFTWARE_LOOPBACK && phys_len > 0 {
            return a.PhysicalAddress[..phys_len]
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(":");
        }
        adapter = a.Next;
    }
    String::new()
}

#[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
fn get_platform_id() -> String {
    String::new()
}

#[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
fn get_primary_mac() -> String {
    String::new()
}

#[cfg(any(target_os = "windows", target_os = "macos"))]
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    std::process::Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
}
