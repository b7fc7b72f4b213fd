use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationPolicy {
    /// `counter mod len`, any pool size.
    #[default]
    Modulo,
    /// `counter & 1`, strict alternation over a pool of two.
    Parity,
}

impl RotationPolicy {
    pub fn from_config(value: &str) -> Result<Self, String> {
        let mode = value.trim().to_lowercase();
        match mode.as_str() {
            "modulo" | "round-robin" | "round_robin" | "rr" => Ok(Self::Modulo),
            "parity" => Ok(Self::Parity),
            _ => Err(format!("unsupported rotation: {value}")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RotationPolicy::Modulo => "modulo",
            RotationPolicy::Parity => "parity",
        }
    }
}

/// Process-wide round-robin counter.
///
/// Selection is one `fetch_add`; the value before the increment picks the
/// index, so the first request lands on backend 0. Wrapping on overflow only
/// perturbs the order once, never the index bounds.
#[derive(Debug, Default)]
pub struct Rotation {
    counter: AtomicUsize,
    policy: RotationPolicy,
}

impl Rotation {
    pub fn new(policy: RotationPolicy) -> Self {
        Self {
            counter: AtomicUsize::new(0),
            policy,
        }
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    /// Picks the next index into a pool of `len` backends.
    ///
    /// Returns `None` without touching the counter when the pool is empty.
    pub fn next(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }

        let ticket = self.counter.fetch_add(1, Ordering::Relaxed);
        let index = match self.policy {
            RotationPolicy::Parity if len == 2 => ticket & 1,
            _ => ticket % len,
        };
        Some(index)
    }

    /// Number of selections performed so far (modulo wrap-around).
    pub fn selections(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}
