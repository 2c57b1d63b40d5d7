// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Port ownership lookup and process control for the Port Guard.
//
// Finding which process listens on a port is OS specific:
//
//   - Linux:   match the LISTEN entries of /proc/net/tcp{,6} against the
//              socket inodes in /proc/<pid>/fd.
//   - Windows: the IP Helper owner-PID listener table (IPv4 and IPv6).
//   - others:  not supported; the holder is reported as unknown.
//
// Process names, executables and termination go through `sysinfo`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::{Pid, ProcessStatus, Signal, System};
use tracing::{debug, warn};

use printrelay_core::types::PortConflict;

/// How long a politely signalled process gets before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// Poll interval while waiting for a process to exit.
const EXIT_POLL: Duration = Duration::from_millis(100);

/// What the Port Guard needs to know about the processes on this machine.
pub trait ProcessInspector: Send + Sync {
    /// The process listening on `port`, if it can be identified.
    fn listener_on(&self, port: u16) -> Option<PortConflict>;

    /// Whether `conflict` is an earlier copy of this server.
    fn is_stale_instance(&self, conflict: &PortConflict) -> bool;

    /// Stop process `pid`. Returns `true` once it is gone.
    fn terminate(&self, pid: u32) -> bool;
}

/// Inspector backed by the real process table.
#[derive(Debug, Clone)]
pub struct SystemInspector {
    own_pid: u32,
    own_exe: Option<PathBuf>,
    own_name: Option<String>,
}

impl Default for SystemInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemInspector {
    /// Identify stale instances by this executable's path and name.
    pub fn new() -> Self {
        let own_exe = std::env::current_exe()
            .ok()
            .map(|exe| exe.canonicalize().unwrap_or(exe));
        let own_name = own_exe.as_deref().and_then(executable_name);
        Self {
            own_pid: std::process::id(),
            own_exe,
            own_name,
        }
    }

    fn describe(&self, pid: u32) -> PortConflict {
        let mut system = System::new();
        let spid = Pid::from_u32(pid);
        system.refresh_process(spid);
        match system.process(spid) {
            Some(process) => PortConflict {
                pid,
                process_name: process.name().to_string(),
                exe: process.exe().map(Path::to_path_buf),
            },
            None => PortConflict {
                pid,
                process_name: "unknown".into(),
                exe: None,
            },
        }
    }
}

impl ProcessInspector for SystemInspector {
    fn listener_on(&self, port: u16) -> Option<PortConflict> {
        let pid = listening_pid(port)?;
        let conflict = self.describe(pid);
        debug!(port, pid, name = %conflict.process_name, "port holder identified");
        Some(conflict)
    }

    fn is_stale_instance(&self, conflict: &PortConflict) -> bool {
        // Never ourselves: a listener in this process is not stale.
        if conflict.pid == self.own_pid {
            return false;
        }

        if let (Some(own), Some(theirs)) = (&self.own_exe, &conflict.exe) {
            let theirs = theirs.canonicalize().unwrap_or_else(|_| theirs.clone());
            if *own == theirs {
                return true;
            }
        }

        match (&self.own_name, executable_name(Path::new(&conflict.process_name))) {
            (Some(own), Some(theirs)) => own.eq_ignore_ascii_case(&theirs),
            _ => false,
        }
    }

    fn terminate(&self, pid: u32) -> bool {
        if pid == self.own_pid {
            warn!(pid, "refusing to terminate the current process");
            return false;
        }

        let spid = Pid::from_u32(pid);
        let mut system = System::new();
        if !is_alive(&mut system, spid) {
            return true;
        }

        let signalled = system
            .process(spid)
            .and_then(|process| process.kill_with(Signal::Term))
            .unwrap_or(false);
        if signalled {
            let mut waited = Duration::ZERO;
            while waited < TERMINATE_GRACE {
                std::thread::sleep(EXIT_POLL);
                waited += EXIT_POLL;
                if !is_alive(&mut system, spid) {
                    return true;
                }
            }
            warn!(pid, "process ignored termination request; killing");
        }

        if let Some(process) = system.process(spid) {
            process.kill();
        }
        std::thread::sleep(EXIT_POLL);
        !is_alive(&mut system, spid)
    }
}

fn is_alive(system: &mut System, pid: Pid) -> bool {
    if !system.refresh_process(pid) {
        return false;
    }
    system
        .process(pid)
        .is_some_and(|process| process.status() != ProcessStatus::Zombie)
}

/// Executable file name without directory or `.exe` suffix.
fn executable_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let name = name
        .strip_suffix(".exe")
        .or_else(|| name.strip_suffix(".EXE"))
        .unwrap_or(name);
    Some(name.to_string())
}

#[cfg(target_os = "linux")]
fn listening_pid(port: u16) -> Option<u32> {
    use std::fs;

    let inodes: Vec<u64> = ["/proc/net/tcp", "/proc/net/tcp6"]
        .iter()
        .filter_map(|table| fs::read_to_string(table).ok())
        .flat_map(|table| listening_inodes(&table, port))
        .collect();
    if inodes.is_empty() {
        return None;
    }

    for entry in fs::read_dir("/proc").ok()?.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        // Other users' fd tables are unreadable without privileges.
        let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        for fd in fds.flatten() {
            let Ok(target) = fs::read_link(fd.path()) else {
                continue;
            };
            if socket_inode(&target).is_some_and(|inode| inodes.contains(&inode)) {
                return Some(pid);
            }
        }
    }
    None
}

#[cfg(windows)]
fn listening_pid(port: u16) -> Option<u32> {
    use windows_sys::Win32::NetworkManagement::IpHelper::{
        MIB_TCP6ROW_OWNER_PID, MIB_TCP6TABLE_OWNER_PID, MIB_TCPROW_OWNER_PID,
        MIB_TCPTABLE_OWNER_PID,
    };
    use windows_sys::Win32::Networking::WinSock::{AF_INET, AF_INET6};

    if let Some(buffer) = owner_pid_table(AF_INET as u32) {
        let table = buffer.as_ptr().cast::<MIB_TCPTABLE_OWNER_PID>();
        // SAFETY: the call succeeded, so the header and `dwNumEntries` rows are valid.
        let found = unsafe {
            let count = (*table).dwNumEntries as usize;
            let rows = std::ptr::addr_of!((*table).table).cast::<MIB_TCPROW_OWNER_PID>();
            (0..count)
                .map(|index| &*rows.add(index))
                .find(|row| u16::from_be(row.dwLocalPort as u16) == port)
                .map(|row| row.dwOwningPid)
        };
        if found.is_some() {
            return found;
        }
    }

    let buffer = owner_pid_table(AF_INET6 as u32)?;
    let table = buffer.as_ptr().cast::<MIB_TCP6TABLE_OWNER_PID>();
    // SAFETY: as above, for the IPv6 row layout.
    unsafe {
        let count = (*table).dwNumEntries as usize;
        let rows = std::ptr::addr_of!((*table).table).cast::<MIB_TCP6ROW_OWNER_PID>();
        (0..count)
            .map(|index| &*rows.add(index))
            .find(|row| u16::from_be(row.dwLocalPort as u16) == port)
            .map(|row| row.dwOwningPid)
    }
}

/// Raw listener table with owner PIDs for one address family.
#[cfg(windows)]
fn owner_pid_table(family: u32) -> Option<Vec<u64>> {
    use std::ptr;

    use windows_sys::Win32::NetworkManagement::IpHelper::{
        GetExtendedTcpTable, TCP_TABLE_OWNER_PID_LISTENER,
    };

    let mut size = 0u32;
    // SAFETY: a null table with size 0 asks for the required size.
    unsafe {
        GetExtendedTcpTable(
            ptr::null_mut(),
            &mut size,
            0,
            family,
            TCP_TABLE_OWNER_PID_LISTENER,
            0,
        );
    }
    if size == 0 {
        return None;
    }

    // u64 storage keeps the table aligned.
    let mut buffer = vec![0u64; (size as usize).div_ceil(8)];
    // SAFETY: `buffer` holds at least `size` bytes.
    let rc = unsafe {
        GetExtendedTcpTable(
            buffer.as_mut_ptr().cast(),
            &mut size,
            0,
            family,
            TCP_TABLE_OWNER_PID_LISTENER,
            0,
        )
    };
    (rc == 0).then_some(buffer)
}

#[cfg(not(any(target_os = "linux", windows)))]
fn listening_pid(_port: u16) -> Option<u32> {
    None
}

/// Socket inodes of LISTEN entries for `port` in a /proc/net/tcp table.
#[cfg(any(target_os = "linux", test))]
fn listening_inodes(table: &str, port: u16) -> Vec<u64> {
    const TCP_LISTEN: &str = "0A";

    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let local = fields.get(1)?;
            let state = fields.get(3)?;
            let inode: u64 = fields.get(9)?.parse().ok()?;
            let (_, port_hex) = local.rsplit_once(':')?;
            let local_port = u16::from_str_radix(port_hex, 16).ok()?;
            (local_port == port && *state == TCP_LISTEN && inode != 0).then_some(inode)
        })
        .collect()
}

/// Inode from a `socket:[12345]` fd link target.
#[cfg(any(target_os = "linux", test))]
fn socket_inode(target: &Path) -> Option<u64> {
    target
        .to_str()?
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}
