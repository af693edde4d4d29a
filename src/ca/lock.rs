//! The CA-wide lock serializing all mutations.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use log::trace;

use crate::commons::error::Error;
use crate::commons::util::file;
use crate::constants::LOCK_POLL_INTERVAL;

//------------ AuthorityLock -------------------------------------------------

/// An advisory lock on a file in the CA directory.
///
/// Every acquisition opens the lock file anew, so the lock excludes other
/// threads of this process as well as other processes.
#[derive(Clone, Debug)]
pub struct AuthorityLock {
    path: PathBuf,
    timeout: Duration,
}

impl AuthorityLock {
    pub fn new(path: &Path, timeout: Duration) -> Self {
        AuthorityLock {
            path: path.to_path_buf(),
            timeout,
        }
    }

    /// Runs `op` while holding the lock.
    ///
    /// Fails with [`Error::LockTimeout`] if the lock cannot be acquired
    /// within the timeout.
    pub fn run<F, T>(&self, op: F) -> Result<T, Error>
    where
        F: FnOnce() -> Result<T, Error>,
    {
        if let Some(parent) = self.path.parent() {
            file::create_dir(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|err| Error::io(format!("failed to open lock file '{}'", self.path.display()), err))?;
        let mut lock = fd_lock::RwLock::new(lock_file);

        let deadline = Instant::now() + self.timeout;
        loop {
            match lock.try_write() {
                Ok(_guard) => {
                    trace!("Acquired lock '{}'", self.path.display());
                    return op();
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    return Err(Error::io(
                        format!("cannot get file lock '{}'", self.path.display()),
                        err,
                    ));
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::LockTimeout(self.timeout));
            }
            thread::sleep(LOCK_POLL_INTERVAL);
        }
    }
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::{Arc, Barrier};

    use super::*;
    use crate::commons::test;

    #[test]
    fn times_out_while_held() {
        test::test_under_tmp(|dir| {
            let path = dir.join(".lock");
            let holder = AuthorityLock::new(&path, Duration::from_secs(5));
            let waiter = AuthorityLock::new(&path, Duration::from_millis(50));

            let (held_tx, held_rx) = mpsc::channel();
            let release = Arc::new(Barrier::new(2));
            let release_in_holder = release.clone();

            let handle = thread::spawn(move || {
                holder
                    .run(|| {
                        held_tx.send(()).unwrap();
                        release_in_holder.wait();
                        Ok(())
                    })
                    .unwrap();
            });

            held_rx.recv().unwrap();
            let err = waiter.run(|| Ok(())).unwrap_err();
            assert!(matches!(err, Error::LockTimeout(_)));
            assert!(!err.is_fatal());

            release.wait();
            handle.join().unwrap();
            assert_eq!(waiter.run(|| Ok(42)).unwrap(), 42);
        });
    }

    #[test]
    fn passes_errors_through() {
        test::test_under_tmp(|dir| {
            let lock = AuthorityLock::new(&dir.join("ca/.lock"), Duration::from_secs(1));
            let res: Result<(), Error> = lock.run(|| Err(Error::NotFound("FFFFFF".into())));
            assert!(matches!(res, Err(Error::NotFound(_))));
        });
    }
}
