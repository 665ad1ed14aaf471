//! Reset-surviving crash context.
//!
//! [`RetainedState`] lives in RTC slow memory on the ESP32-S3: it keeps its
//! contents across software, panic and watchdog resets and is lost on a
//! power cycle.  It is a plain fixed-layout value; the only writer is the
//! [`CrashRecorder`](super::crash::CrashRecorder).
//!
//! String fields are [`BoundedStr`]s: fixed buffers that always keep a
//! trailing NUL and truncate (on a UTF-8 boundary) instead of overrunning.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Written on first use so uninitialised RTC RAM is recognised.
pub const RETAINED_MAGIC: u32 = 0x5345_4E54;

// ───────────────────────────────────────────────────────────────
// BoundedStr
// ───────────────────────────────────────────────────────────────

/// Fixed-capacity, NUL-terminated string of at most `N - 1` bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct BoundedStr<const N: usize> {
    buf: [u8; N],
}

impl<const N: usize> BoundedStr<N> {
    /// Longest content that fits alongside the terminator.
    pub const CAPACITY: usize = N - 1;

    pub const fn new() -> Self {
        Self { buf: [0; N] }
    }

    pub fn from_str_truncating(s: &str) -> Self {
        let mut b = Self::new();
        b.set(s);
        b
    }

    /// Replace the contents.  Returns `true` if `s` had to be truncated.
    pub fn set(&mut self, s: &str) -> bool {
        let mut len = s.len().min(Self::CAPACITY);
        while !s.is_char_boundary(len) {
            len -= 1;
        }
        self.buf[..len].copy_from_slice(&s.as_bytes()[..len]);
        self.buf[len..].fill(0);
        len < s.len()
    }

    /// Replace the contents with `a`, a space, then `b`.  Returns `true`
    /// if the joined string was truncated.
    pub fn set_joined(&mut self, a: &str, b: &str) -> bool {
        let truncated_a = self.set(a);
        if truncated_a {
            return true;
        }
        let mut len = self.len();
        for part in [" ", b] {
            let room = Self::CAPACITY - len;
            let mut take = part.len().min(room);
            while !part.is_char_boundary(take) {
                take -= 1;
            }
            self.buf[len..len + take].copy_from_slice(&part.as_bytes()[..take]);
            len += take;
            if take < part.len() {
                return true;
            }
        }
        false
    }

    pub fn clear(&mut self) {
        self.buf.fill(0);
    }

    /// Content bytes, up to the first NUL.
    pub fn len(&self) -> usize {
        self.buf.iter().position(|&b| b == 0).unwrap_or(Self::CAPACITY)
    }

    pub fn is_empty(&self) -> bool {
        self.buf[0] == 0
    }

    /// The stored text.  Falls back to the longest valid UTF-8 prefix if
    /// the region holds garbage.
    pub fn as_str(&self) -> &str {
        let bytes = &self.buf[..self.len()];
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        }
    }

    /// Raw storage including the terminator.
    pub fn as_bytes_with_nul(&self) -> &[u8; N] {
        &self.buf
    }
}

impl<const N: usize> Default for BoundedStr<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for BoundedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for BoundedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> Serialize for BoundedStr<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, const N: usize> Deserialize<'de> for BoundedStr<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_str_truncating(&s))
    }
}

// ───────────────────────────────────────────────────────────────
// RetainedState
// ───────────────────────────────────────────────────────────────

/// Field widths including the NUL terminator.
pub const REASON_LEN: usize = 64;
pub const SCREEN_LEN: usize = 32;
pub const CALL_LEN: usize = 128;

/// Crash context that survives a software-triggered reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct RetainedState {
    pub magic: u32,
    /// Set by the panic hook (or [`CrashRecorder::mark_crash`]); cleared
    /// once the recorder has consumed it on the next boot.
    ///
    /// [`CrashRecorder::mark_crash`]: super::crash::CrashRecorder::mark_crash
    pub has_pending_crash: bool,
    /// Lifetime crash counter.  Only ever increases.
    pub crash_count: u32,
    pub last_crash_reason: BoundedStr<REASON_LEN>,
    pub last_screen: BoundedStr<SCREEN_LEN>,
    /// `"<service> <endpoint>"` of the most recent outbound call.
    pub last_call: BoundedStr<CALL_LEN>,
    pub last_call_ms: u32,
    pub last_crash_uptime_ms: u32,
    pub watchdog_timeout: bool,
}

impl RetainedState {
    /// The first-ever power-on state (apart from the magic word).
    pub const ZEROED: Self = Self {
        magic: 0,
        has_pending_crash: false,
        crash_count: 0,
        last_crash_reason: BoundedStr::new(),
        last_screen: BoundedStr::new(),
        last_call: BoundedStr::new(),
        last_call_ms: 0,
        last_crash_uptime_ms: 0,
        watchdog_timeout: false,
    };

    pub const fn new() -> Self {
        let mut s = Self::ZEROED;
        s.magic = RETAINED_MAGIC;
        s
    }

    pub fn is_valid(&self) -> bool {
        self.magic == RETAINED_MAGIC
    }

    /// Reset to the initial state if the region does not carry the magic
    /// word.  Returns `true` if it had to be reset.
    pub fn validate_or_reset(&mut self) -> bool {
        if self.is_valid() {
            return false;
        }
        *self = Self::new();
        true
    }
}

impl Default for RetainedState {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// RTC slow-memory placement (ESP32 only)
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod rtc {
    use core::sync::atomic::{AtomicBool, Ordering};

    use super::RetainedState;

    // `.rtc.data` is loaded from the image on power-on and left alone on
    // software / panic / watchdog resets.
    #[unsafe(link_section = ".rtc.data")]
    static mut RETAINED: RetainedState = RetainedState::ZEROED;

    static TAKEN: AtomicBool = AtomicBool::new(false);

    /// Hand out the retained region exactly once per boot.
    pub fn take() -> Option<&'static mut RetainedState> {
        if TAKEN.swap(true, Ordering::AcqRel) {
            return None;
        }
        // SAFETY: guarded by TAKEN, so at most one `&mut` is ever created.
        Some(unsafe { &mut *(&raw mut RETAINED) })
    }

    /// Raw pointer for the panic hook.  Only dereferenced on the thread
    /// that holds the `take()` reference, while it unwinds.
    pub fn raw() -> *mut RetainedState {
        &raw mut RETAINED
    }
}

#[cfg(target_os = "espidf")]
pub use rtc::{raw as retained_raw, take as take_retained};
