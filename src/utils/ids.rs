use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Generate an opaque token such as `rule-3f9a0c1d2b4e5f60`.
///
/// Falls back to a clock-and-counter mix when the OS entropy source is
/// unavailable; tokens only need to be unique within one profile.
pub fn random_token(prefix: &str) -> String {
    let mut bytes = [0u8; 8];
    let value = match getrandom::fill(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes),
        Err(_) => fallback_entropy(),
    };
    format!("{prefix}-{value:016x}")
}

fn fallback_entropy() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    nanos ^ count.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_carry_prefix_and_differ() {
        let tokens: HashSet<_> = (0..64).map(|_| random_token("tab")).collect();
        assert_eq!(tokens.len(), 64);
        assert!(tokens.iter().all(|t| t.starts_with("tab-") && t.len() == 20));
    }
}
