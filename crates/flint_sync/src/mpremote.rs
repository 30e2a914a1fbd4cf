//! Device access through the `mpremote` tool.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use flint_common::DevicePath;

use crate::error::TransportError;
use crate::transport::{DeviceTransport, RemoteDigest, RemoteEntry};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

static UPLOAD_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Prints `D <path>` or `F <size> <mtime> <path>` for everything below `/`.
const LIST_SCRIPT: &str = "import os
def w(d):
    for e in os.ilistdir(d):
        p = '/' + e[0] if d == '/' else d + '/' + e[0]
        if e[1] & 0x4000:
            print('D', p)
            w(p)
        else:
            s = os.stat(p)
            print('F', s[6], s[8], p)
w('/')
";

/// Drives `mpremote` as a subprocess, one invocation per operation.
///
/// MicroPython cannot hash files cheaply, so entries carry size and mtime.
/// Renames run as a small script on the device.
#[derive(Debug, Clone)]
pub struct MpremoteTransport {
    program: String,
    port: Option<String>,
}

impl MpremoteTransport {
    /// Connects to `port`, or lets `mpremote` pick the first device.
    pub fn new(port: Option<String>) -> Self {
        Self {
            program: "mpremote".to_string(),
            port,
        }
    }

    /// Uses another executable in place of `mpremote`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn run(
        &self,
        op: &'static str,
        path: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let mut command = Command::new(&self.program);
        if let Some(port) = &self.port {
            command.arg("connect").arg(port);
        }
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        tracing::debug!(program = %self.program, ?args, "running");

        let mut child = command.spawn().map_err(|e| TransportError::Io {
            path: self.program.clone(),
            source: e,
        })?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(TransportError::Timeout {
                        op,
                        path: path.to_string(),
                        after: timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(TransportError::Io {
                        path: self.program.clone(),
                        source: e,
                    })
                }
            }
        };

        let stdout = String::from_utf8_lossy(&stdout.join().unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr.join().unwrap_or_default()).into_owned();
        // mpremote reports device exceptions on stdout and exits non-zero.
        if !status.success() || stdout.contains("Traceback") {
            return Err(classify(path, &format!("{}\n{}", stderr.trim(), stdout.trim())));
        }
        Ok(stdout)
    }

    fn exec(
        &self,
        op: &'static str,
        path: &str,
        script: String,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        self.run(op, path, &["exec".to_string(), script], timeout)
    }

    fn fs(
        &self,
        op: &'static str,
        path: &DevicePath,
        command: &str,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let args = [
            "fs".to_string(),
            command.to_string(),
            remote_arg(path),
        ];
        self.run(op, path.as_str(), &args, timeout).map(|_| ())
    }
}

impl MpremoteTransport {
    /// Soft-resets the device and imports `module`, returning what it printed.
    ///
    /// A module that raises fails with [`TransportError::Device`] carrying the
    /// last line of the traceback.
    pub fn run_module(&self, module: &str, timeout: Duration) -> Result<String, TransportError> {
        let args = [
            "soft-reset".to_string(),
            "exec".to_string(),
            format!("import {module}"),
        ];
        self.run("run", module, &args, timeout)
    }

    /// Installs `package` (`name@version`) from a `mip` index into the host
    /// directory `into`, mounted on the device for the duration of the call.
    pub fn mip_install(
        &self,
        package: &str,
        index: &str,
        into: &Path,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let args = [
            "mount".to_string(),
            "-l".to_string(),
            into.display().to_string(),
            "+".to_string(),
            "mip".to_string(),
            "--no-mpy".to_string(),
            "--index".to_string(),
            index.to_string(),
            "--target".to_string(),
            "/remote".to_string(),
            "install".to_string(),
            package.to_string(),
        ];
        self.run("install", package, &args, timeout).map(|_| ())
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn remote_arg(path: &DevicePath) -> String {
    format!(":/{path}")
}

/// Quotes a string as a Python literal.
fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn classify(path: &str, output: &str) -> TransportError {
    let output = output.trim();
    if output.contains("ENOENT") || output.contains("Errno 2]") || output.contains("No such file") {
        TransportError::NotFound {
            path: path.to_string(),
        }
    } else if output.contains("ENOTEMPTY") || output.contains("Errno 39]") {
        TransportError::NotEmpty {
            path: path.to_string(),
        }
    } else {
        TransportError::Device {
            reason: output.lines().last().unwrap_or("mpremote failed").to_string(),
        }
    }
}

fn parse_listing(output: &str) -> Vec<RemoteEntry> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        let entry = match line.split_once(' ') {
            Some(("D", rest)) => device_path(rest).map(RemoteEntry::dir),
            Some(("F", rest)) => parse_file(rest),
            _ => None,
        };
        match entry {
            Some(entry) => entries.push(entry),
            None if !line.trim().is_empty() => tracing::debug!(line, "ignoring listing line"),
            None => {}
        }
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

fn parse_file(rest: &str) -> Option<RemoteEntry> {
    let mut parts = rest.splitn(3, ' ');
    let size: u64 = parts.next()?.parse().ok()?;
    let mtime: u64 = parts.next()?.parse().ok()?;
    let path = device_path(parts.next()?)?;
    Some(RemoteEntry::file(path, size, RemoteDigest::SizeMtime { size, mtime }))
}

fn device_path(raw: &str) -> Option<DevicePath> {
    DevicePath::new(raw.trim_start_matches('/')).ok()
}

impl DeviceTransport for MpremoteTransport {
    fn name(&self) -> &str {
        "mpremote"
    }

    fn list_files(&mut self, timeout: Duration) -> Result<Vec<RemoteEntry>, TransportError> {
        let output = self.exec("list", "/", LIST_SCRIPT.to_string(), timeout)?;
        Ok(parse_listing(&output))
    }

    fn stat(
        &mut self,
        path: &DevicePath,
        timeout: Duration,
    ) -> Result<Option<RemoteEntry>, TransportError> {
        let script = format!(
            "import os\ntry:\n    s = os.stat({p})\n    print('D' if s[0] & 0x4000 else 'F', s[6], s[8])\nexcept OSError:\n    print('N')\n",
            p = py_str(&format!("/{path}"))
        );
        let output = self.exec("stat", path.as_str(), script, timeout)?;
        let line = output.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
        let mut parts = line.split(' ');
        match parts.next() {
            Some("N") => Ok(None),
            Some("D") => Ok(Some(RemoteEntry::dir(path.clone()))),
            Some("F") => {
                let size = parts.next().and_then(|s| s.parse().ok());
                let mtime = parts.next().and_then(|s| s.parse().ok());
                match (size, mtime) {
                    (Some(size), Some(mtime)) => Ok(Some(RemoteEntry::file(
                        path.clone(),
                        size,
                        RemoteDigest::SizeMtime { size, mtime },
                    ))),
                    _ => Err(TransportError::Device {
                        reason: format!("unexpected stat output '{line}'"),
                    }),
                }
            }
            _ => Err(TransportError::Device {
                reason: format!("unexpected stat output '{line}'"),
            }),
        }
    }

    fn write_file(
        &mut self,
        path: &DevicePath,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let upload = std::env::temp_dir().join(format!(
            "flint-upload-{}-{}",
            std::process::id(),
            UPLOAD_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&upload, data).map_err(|e| TransportError::Io {
            path: upload.display().to_string(),
            source: e,
        })?;
        let args = [
            "fs".to_string(),
            "cp".to_string(),
            upload.display().to_string(),
            remote_arg(path),
        ];
        let result = self.run("write", path.as_str(), &args, timeout).map(|_| ());
        let _ = std::fs::remove_file(&upload);
        result
    }

    fn delete_file(&mut self, path: &DevicePath, timeout: Duration) -> Result<(), TransportError> {
        self.fs("delete", path, "rm", timeout)
    }

    fn create_dir(&mut self, path: &DevicePath, timeout: Duration) -> Result<(), TransportError> {
        self.fs("mkdir", path, "mkdir", timeout)
    }

    fn delete_dir(&mut self, path: &DevicePath, timeout: Duration) -> Result<(), TransportError> {
        self.fs("rmdir", path, "rmdir", timeout)
    }

    fn supports_rename(&self) -> bool {
        true
    }

    fn rename(
        &mut self,
        from: &DevicePath,
        to: &DevicePath,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let script = format!(
            "import os\ntry:\n    os.remove({to})\nexcept OSError:\n    pass\nos.rename({from}, {to})\n",
            from = py_str(&format!("/{from}")),
            to = py_str(&format!("/{to}")),
        );
        self.exec("rename", to.as_str(), script, timeout).map(|_| ())
    }
}
