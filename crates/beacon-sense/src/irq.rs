use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Blocks on the kernel's edge notification for a sysfs GPIO value file
/// (`POLLPRI` once `edge` is set), so an idle line costs no reads.
#[cfg(target_os = "linux")]
pub(crate) struct EdgeIrq {
    fd: tokio::io::unix::AsyncFd<File>,
    rt: tokio::runtime::Runtime,
}

#[cfg(target_os = "linux")]
impl EdgeIrq {
    pub(crate) fn open(value: &Path) -> io::Result<Self> {
        use tokio::io::{unix::AsyncFd, Interest};

        let rt = tokio::runtime::Builder::new_current_thread().enable_io().enable_time().build()?;
        let file = File::open(value)?;
        let fd = {
            let _guard = rt.enter();
            AsyncFd::with_interest(file, Interest::PRIORITY)?
        };
        Ok(Self { fd, rt })
    }

    /// True if an edge was signalled within `timeout`.
    pub(crate) fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        use std::io::{Read, Seek, SeekFrom};
        use tokio::io::Interest;

        let fd = &self.fd;
        self.rt.block_on(async {
            let Ok(ready) = tokio::time::timeout(timeout, fd.ready(Interest::PRIORITY)).await else {
                return Ok(false);
            };
            let mut guard = ready?;
            // the notification stays pending until the file is read again
            let mut f: &File = guard.get_inner();
            f.seek(SeekFrom::Start(0))?;
            f.read_to_end(&mut Vec::with_capacity(4))?;
            guard.clear_ready();
            Ok::<_, io::Error>(true)
        })
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) struct EdgeIrq;

#[cfg(not(target_os = "linux"))]
impl EdgeIrq {
    pub(crate) fn open(_value: &Path) -> io::Result<Self> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "gpio edge interrupts need linux"))
    }

    pub(crate) fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
        std::thread::sleep(timeout);
        Ok(false)
    }
}
