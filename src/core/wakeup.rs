//! Wakeup Policy: cara writer membangunkan reader yang menunggu
//!
//! Reader yang menunggu ring kosong selalu memakai loop polling dengan
//! batas waktu (satu quantum per putaran), jadi stop signal terlihat paling
//! lambat satu quantum kemudian apa pun policy-nya. Policy hanya menentukan
//! primitive tidur di tiap putaran dan apakah writer perlu mengirim sinyal.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::thread;
use std::time::Duration;

/// Quantum default: 1 ms per putaran
pub const DEFAULT_QUANTUM: Duration = Duration::from_millis(1);

pub trait WakeupPolicy: Send + Sync + fmt::Display {
    /// Dipanggil writer setelah publish record, atau saat ring penuh supaya
    /// reader yang tidur tidak membuat pipe macet.
    fn wake(&self);

    /// Tidur paling lama `period`. Boleh kembali lebih cepat.
    fn wait(&self, period: Duration);

    /// Lama satu putaran loop tunggu reader
    fn quantum(&self) -> Duration;
}

/// Tanpa wakeup: reader polling + sleep, `wake()` no-op.
///
/// Tidak ada sinkronisasi sama sekali di jalur writer. Latency tambahan
/// paling banyak satu quantum. Satu-satunya policy yang berlaku lintas
/// proses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepWakeup {
    quantum: Duration,
}

impl SleepWakeup {
    pub const fn new(quantum: Duration) -> Self {
        Self { quantum }
    }

    /// Varian granularitas mikrodetik
    pub const fn micros(us: u64) -> Self {
        Self::new(Duration::from_micros(us))
    }
}

impl Default for SleepWakeup {
    fn default() -> Self {
        Self::new(DEFAULT_QUANTUM)
    }
}

impl WakeupPolicy for SleepWakeup {
    #[inline(always)]
    fn wake(&self) {}

    #[inline(always)]
    fn wait(&self, period: Duration) {
        thread::sleep(period);
    }

    #[inline(always)]
    fn quantum(&self) -> Duration {
        self.quantum
    }
}

impl fmt::Display for SleepWakeup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No Wakeup Policy (sleep {:?})", self.quantum)
    }
}

/// Mutex + condition variable. Hanya untuk satu proses.
///
/// `wake()` menyalakan flag pending lalu notify, sehingga sinyal yang
/// dikirim sebelum reader mulai menunggu tidak hilang.
#[derive(Debug)]
pub struct CondvarWakeup {
    pending: Mutex<bool>,
    signal: Condvar,
    quantum: Duration,
}

impl CondvarWakeup {
    pub fn new(quantum: Duration) -> Self {
        Self {
            pending: Mutex::new(false),
            signal: Condvar::new(),
            quantum,
        }
    }
}

impl Default for CondvarWakeup {
    fn default() -> Self {
        Self::new(DEFAULT_QUANTUM)
    }
}

impl WakeupPolicy for CondvarWakeup {
    fn wake(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.signal.notify_one();
    }

    fn wait(&self, period: Duration) {
        let mut pending = self.pending.lock();
        if !*pending {
            let _ = self.signal.wait_for(&mut pending, period);
        }
        *pending = false;
    }

    fn quantum(&self) -> Duration {
        self.quantum
    }
}

impl fmt::Display for CondvarWakeup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condvar Wakeup Policy (timeout {:?})", self.quantum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_sleep_policy_quantum() {
        assert_eq!(SleepWakeup::default().quantum(), DEFAULT_QUANTUM);
        assert_eq!(SleepWakeup::micros(10).quantum(), Duration::from_micros(10));
        assert!(SleepWakeup::default().to_string().starts_with("No Wakeup Policy"));
    }

    #[test]
    fn test_condvar_pending_wake_is_not_lost() {
        let policy = CondvarWakeup::new(Duration::from_secs(5));
        policy.wake();

        let start = Instant::now();
        policy.wait(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_condvar_wait_times_out() {
        let policy = CondvarWakeup::default();
        let start = Instant::now();
        policy.wait(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_condvar_wakes_sleeping_thread() {
        let policy = Arc::new(CondvarWakeup::new(Duration::from_secs(5)));
        let sleeper = {
            let policy = Arc::clone(&policy);
            thread::spawn(move || {
                let start = Instant::now();
                policy.wait(Duration::from_secs(5));
                start.elapsed()
            })
        };

        thread::sleep(Duration::from_millis(50));
        policy.wake();

        let slept = sleeper.join().unwrap();
        assert!(slept < Duration::from_secs(4));
    }
}
