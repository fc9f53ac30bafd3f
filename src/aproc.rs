//! Background process output, drained between keystrokes
//!
//! Each registered proc is a readable pipe, a callback and a deadline. One
//! [`AsyncProcMultiplexer::drain`] pass waits (bounded) on the terminal and
//! every pipe at once. Live input always wins: if the terminal is readable
//! the pass returns immediately without touching any proc.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::editor::ViewId;

/// Bytes read from a ready pipe per pass
pub const READ_CHUNK: usize = 1024;

/// Ceiling on one multiplex wait
pub const DEFAULT_WAIT: Duration = Duration::from_secs(1);

const READY: libc::c_short = libc::POLLIN | libc::POLLHUP | libc::POLLERR;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProcId(u64);

/// What a proc callback is told
#[derive(Debug, Clone, Copy)]
pub struct ProcEvent<'a> {
    pub id: ProcId,
    /// View the proc reports to, e.g. the menu listing its output
    pub invoker: Option<ViewId>,
    /// A chunk of output; `None` on the final closed event
    pub data: Option<&'a [u8]>,
    pub is_error: bool,
    pub is_eof: bool,
    /// Last event for this proc; it is destroyed right after
    pub is_closed: bool,
}

/// Callback receiving proc output together with caller context
pub type ProcCallback<C> = Box<dyn FnMut(&mut C, &ProcEvent<'_>)>;

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// Terminal input is pending (or the wait failed): go read a key
    ReadInput,
    /// Nothing for the terminal yet; loop and drain again
    CallAgain,
}

struct AsyncProc<C> {
    id: ProcId,
    pipe: File,
    child: Option<Child>,
    callback: ProcCallback<C>,
    deadline: Instant,
    done: bool,
    invoker: Option<ViewId>,
}

impl<C> AsyncProc<C> {
    fn event<'a>(&self, data: Option<&'a [u8]>) -> ProcEvent<'a> {
        ProcEvent {
            id: self.id,
            invoker: self.invoker,
            data,
            is_error: false,
            is_eof: false,
            is_closed: false,
        }
    }
}

impl<C> Drop for AsyncProc<C> {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            // Already exited is fine; we only need it reaped
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Registry of background procs whose pipes are drained cooperatively
pub struct AsyncProcMultiplexer<C> {
    procs: Vec<AsyncProc<C>>,
    next_id: u64,
}

impl<C> AsyncProcMultiplexer<C> {
    pub fn new() -> Self {
        Self {
            procs: Vec::new(),
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    pub fn contains(&self, id: ProcId) -> bool {
        self.procs.iter().any(|p| p.id == id)
    }

    /// Take ownership of a readable pipe until it closes or `timeout` passes
    pub fn register(&mut self, pipe: OwnedFd, timeout: Duration, callback: ProcCallback<C>) -> ProcId {
        self.insert(File::from(pipe), None, timeout, callback)
    }

    /// Run `sh -c <cmd>` and register its stdout.
    ///
    /// The child is killed and reaped when the proc is destroyed.
    pub fn spawn_shell(
        &mut self,
        cmd: &str,
        timeout: Duration,
        callback: ProcCallback<C>,
    ) -> io::Result<ProcId> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(io::ErrorKind::Other, "child has no stdout pipe"));
        };

        let id = self.insert(File::from(OwnedFd::from(stdout)), Some(child), timeout, callback);
        tracing::debug!("Spawned async proc {:?}: {}", id, cmd);
        Ok(id)
    }

    fn insert(
        &mut self,
        pipe: File,
        child: Option<Child>,
        timeout: Duration,
        callback: ProcCallback<C>,
    ) -> ProcId {
        let id = ProcId(self.next_id);
        self.next_id += 1;
        let now = Instant::now();
        self.procs.push(AsyncProc {
            id,
            pipe,
            child,
            callback,
            // Absurd timeouts saturate to "never" rather than overflowing
            deadline: now.checked_add(timeout).unwrap_or(now + Duration::from_secs(u32::MAX as u64)),
            done: false,
            invoker: None,
        });
        id
    }

    /// Tie a proc to the view that shows its output
    pub fn set_invoker(&mut self, id: ProcId, view: ViewId) -> bool {
        self.find_mut(id).map(|p| p.invoker = Some(view)).is_some()
    }

    pub fn invoker(&self, id: ProcId) -> Option<ViewId> {
        self.procs.iter().find(|p| p.id == id)?.invoker
    }

    /// Mark a proc done; it is closed on the next drain pass
    pub fn finish(&mut self, id: ProcId) -> bool {
        self.find_mut(id).map(|p| p.done = true).is_some()
    }

    /// Destroy a proc immediately, without a closed callback
    pub fn cancel(&mut self, id: ProcId) -> bool {
        let before = self.procs.len();
        self.procs.retain(|p| p.id != id);
        let removed = self.procs.len() != before;
        if removed {
            tracing::debug!("Cancelled async proc {:?}", id);
        }
        removed
    }

    /// Destroy every proc reporting to `view`
    pub fn cancel_for_view(&mut self, view: ViewId) {
        self.procs.retain(|p| p.invoker != Some(view));
    }

    fn find_mut(&mut self, id: ProcId) -> Option<&mut AsyncProc<C>> {
        self.procs.iter_mut().find(|p| p.id == id)
    }

    /// One multiplex pass over `input_fd` and every proc pipe.
    ///
    /// A failed wait is logged and treated as "read input"; a timed out
    /// wait is "call again". Otherwise each ready pipe is read once and
    /// procs that hit EOF, an error, their done flag or their deadline get
    /// a final closed callback and are destroyed.
    pub fn drain(&mut self, ctx: &mut C, input_fd: Option<RawFd>, wait: Duration) -> Drain {
        let mut fds: Vec<libc::pollfd> = Vec::with_capacity(self.procs.len() + 1);
        if let Some(fd) = input_fd {
            fds.push(pollfd(fd));
        }
        fds.extend(self.procs.iter().map(|p| pollfd(p.pipe.as_raw_fd())));

        let timeout_ms = wait.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        // SAFETY: `fds` is a live, exclusively borrowed buffer of `fds.len()` pollfds
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        let now = Instant::now();

        if rc < 0 {
            let err = io::Error::last_os_error();
            // A signal landing during the wait is not a failure
            if err.kind() != io::ErrorKind::Interrupted {
                tracing::warn!("Async proc wait failed: {}", err);
            }
            return Drain::ReadInput;
        }

        let offset = usize::from(input_fd.is_some());
        if rc > 0 && input_fd.is_some() && fds[0].revents & READY != 0 {
            return Drain::ReadInput;
        }

        let mut buf = [0u8; READ_CHUNK];
        let mut closed = Vec::new();
        for (i, p) in self.procs.iter_mut().enumerate() {
            let revents = fds[offset + i].revents;
            let mut is_eof = false;
            let mut is_error = revents & libc::POLLNVAL != 0;

            if rc > 0 && revents & READY != 0 && !is_error {
                match p.pipe.read(&mut buf) {
                    Ok(0) => is_eof = true,
                    Ok(n) => {
                        let ev = p.event(Some(&buf[..n]));
                        (p.callback)(ctx, &ev);
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        tracing::warn!("Async proc {:?} read failed: {}", p.id, e);
                        is_error = true;
                    }
                }
            }

            let expired = now >= p.deadline;
            if is_eof || is_error || p.done || expired {
                tracing::debug!(
                    "Closing async proc {:?} (eof: {}, error: {}, done: {}, expired: {})",
                    p.id,
                    is_eof,
                    is_error,
                    p.done,
                    expired
                );
                let ev = ProcEvent {
                    is_error,
                    is_eof,
                    is_closed: true,
                    ..p.event(None)
                };
                (p.callback)(ctx, &ev);
                closed.push(i);
            }
        }

        for i in closed.into_iter().rev() {
            self.procs.remove(i);
        }
        Drain::CallAgain
    }
}

impl<C> Default for AsyncProcMultiplexer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for AsyncProcMultiplexer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncProcMultiplexer")
            .field("procs", &self.procs.iter().map(|p| p.id).collect::<Vec<_>>())
            .finish()
    }
}

fn pollfd(fd: RawFd) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::FromRawFd;

    fn pipe() -> (OwnedFd, File) {
        let mut fds = [0 as libc::c_int; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0, "pipe() failed");
        unsafe { (OwnedFd::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) }
    }

    fn log_events() -> ProcCallback<Vec<String>> {
        Box::new(|log: &mut Vec<String>, ev: &ProcEvent<'_>| {
            if let Some(data) = ev.data {
                log.push(format!("data:{}", String::from_utf8_lossy(data)));
            }
            if ev.is_closed {
                log.push(format!("closed eof={} err={}", ev.is_eof, ev.is_error));
            }
        })
    }

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_live_input_preempts_procs() {
        let (term_read, mut term_write) = pipe();
        let (proc_read, mut proc_write) = pipe();
        term_write.write_all(b"k").unwrap();
        proc_write.write_all(b"output").unwrap();

        let mut mux = AsyncProcMultiplexer::new();
        mux.register(proc_read, Duration::from_secs(60), log_events());

        let mut log = Vec::new();
        let outcome = mux.drain(&mut log, Some(term_read.as_raw_fd()), SHORT);
        assert_eq!(outcome, Drain::ReadInput);
        assert!(log.is_empty());
        assert_eq!(mux.len(), 1);
    }

    #[test]
    fn test_data_then_eof_closes() {
        let (proc_read, mut proc_write) = pipe();
        proc_write.write_all(b"hello").unwrap();
        drop(proc_write);

        let mut mux = AsyncProcMultiplexer::new();
        mux.register(proc_read, Duration::from_secs(60), log_events());

        let mut log = Vec::new();
        assert_eq!(mux.drain(&mut log, None, SHORT), Drain::CallAgain);
        assert_eq!(log, vec!["data:hello"]);
        assert_eq!(mux.len(), 1);

        assert_eq!(mux.drain(&mut log, None, SHORT), Drain::CallAgain);
        assert_eq!(log, vec!["data:hello", "closed eof=true err=false"]);
        assert!(mux.is_empty());
    }

    #[test]
    fn test_quiet_pipe_times_out() {
        let (proc_read, _proc_write) = pipe();
        let mut mux = AsyncProcMultiplexer::new();
        mux.register(proc_read, Duration::from_secs(60), log_events());

        let mut log = Vec::new();
        assert_eq!(mux.drain(&mut log, None, SHORT), Drain::CallAgain);
        assert!(log.is_empty());
        assert_eq!(mux.len(), 1);
    }

    #[test]
    fn test_deadline_closes_proc() {
        let (proc_read, _proc_write) = pipe();
        let mut mux = AsyncProcMultiplexer::new();
        mux.register(proc_read, Duration::ZERO, log_events());

        let mut log = Vec::new();
        mux.drain(&mut log, None, SHORT);
        assert_eq!(log, vec!["closed eof=false err=false"]);
        assert!(mux.is_empty());
    }

    #[test]
    fn test_finish_and_cancel() {
        let (a_read, _a_write) = pipe();
        let (b_read, _b_write) = pipe();
        let mut mux = AsyncProcMultiplexer::new();
        let a = mux.register(a_read, Duration::from_secs(60), log_events());
        let b = mux.register(b_read, Duration::from_secs(60), log_events());

        assert!(mux.finish(a));
        assert!(mux.cancel(b));
        assert!(!mux.cancel(b));

        let mut log = Vec::new();
        mux.drain(&mut log, None, SHORT);
        // Only the finished proc reports; the cancelled one is silent
        assert_eq!(log, vec!["closed eof=false err=false"]);
        assert!(mux.is_empty());
    }

    #[test]
    fn test_invoker_is_reported() {
        let (proc_read, mut proc_write) = pipe();
        proc_write.write_all(b"x").unwrap();

        let mut mux: AsyncProcMultiplexer<Vec<Option<ViewId>>> = AsyncProcMultiplexer::new();
        let id = mux.register(
            proc_read,
            Duration::from_secs(60),
            Box::new(|seen: &mut Vec<Option<ViewId>>, ev: &ProcEvent<'_>| {
                seen.push(ev.invoker)
            }),
        );
        let view = ViewId::from_raw(7);
        assert!(mux.set_invoker(id, view));
        assert_eq!(mux.invoker(id), Some(view));

        let mut seen = Vec::new();
        mux.drain(&mut seen, None, SHORT);
        assert_eq!(seen, vec![Some(view)]);

        mux.cancel_for_view(view);
        assert!(mux.is_empty());
    }

    #[test]
    fn test_spawn_shell_collects_output() {
        let mut mux = AsyncProcMultiplexer::new();
        mux.spawn_shell("printf hi", Duration::from_secs(10), log_events())
            .unwrap();

        let mut log = Vec::new();
        for _ in 0..50 {
            if mux.is_empty() {
                break;
            }
            mux.drain(&mut log, None, Duration::from_millis(100));
        }
        assert!(mux.is_empty());
        assert_eq!(log.first().map(String::as_str), Some("data:hi"));
        assert_eq!(log.last().map(String::as_str), Some("closed eof=true err=false"));
    }

    #[test]
    fn test_signal_during_wait_reads_input() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let (read, _write) = pipe();
        let mut mux = AsyncProcMultiplexer::new();
        mux.register(read, Duration::from_secs(60), log_events());

        let caught = Arc::new(AtomicBool::new(false));
        let sig = signal_hook::flag::register(libc::SIGUSR1, Arc::clone(&caught)).unwrap();
        let waiter = unsafe { libc::pthread_self() };
        let kicker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            unsafe { libc::pthread_kill(waiter, libc::SIGUSR1) };
        });

        let mut log = Vec::new();
        let started = Instant::now();
        let outcome = mux.drain(&mut log, None, Duration::from_secs(5));
        kicker.join().unwrap();
        signal_hook::low_level::unregister(sig);

        assert!(caught.load(Ordering::SeqCst));
        assert_eq!(outcome, Drain::ReadInput);
        assert!(started.elapsed() < Duration::from_secs(5));
        // Nothing closed, nothing read
        assert!(log.is_empty());
        assert_eq!(mux.len(), 1);
    }
}
