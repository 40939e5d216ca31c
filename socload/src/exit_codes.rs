#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more workers were unreachable; the summary covers only the
    /// workers that reported.
    PartialResults = 10,

    /// Invalid CLI/scenario/options (bad flags, invalid durations, bad host
    /// URL, malformed scenario file, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, worker spawn failures, unexpected
    /// invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
