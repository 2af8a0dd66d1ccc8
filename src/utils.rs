use crate::types::AppError;
use std::sync::atomic::{AtomicU64, Ordering};

pub fn now_ms() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

static ID_SEQ: AtomicU64 = AtomicU64::new(1);

/// Mint a process-unique id with a readable prefix (`lock-…`, `quote-…`).
pub fn new_id(prefix: &str) -> String {
    let seq = ID_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", prefix, now_ms(), seq)
}

/// Parse a human-unit decimal string ("1.5") into raw base units.
///
/// All trade math runs on raw integers; floats only appear at the wire edge.
pub fn parse_amount(s: &str, decimals: u8) -> Result<u128, AppError> {
    let s = s.trim();
    if s.is_empty() || s == "." {
        return Err(AppError::Validation("amount must be a decimal number".into()));
    }
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(AppError::Validation(format!(
            "amount must be a non-negative decimal number, got: {s}"
        )));
    }
    if frac_part.len() > decimals as usize {
        return Err(AppError::Validation(format!(
            "amount has more than {decimals} decimal places"
        )));
    }
    let scale = 10u128
        .checked_pow(decimals as u32)
        .ok_or_else(|| AppError::Validation("token decimals out of range".into()))?;
    let int_val: u128 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse()
            .map_err(|_| AppError::Validation("amount integer part too large".into()))?
    };
    let mut frac_val: u128 = 0;
    if !frac_part.is_empty() {
        frac_val = frac_part
            .parse()
            .map_err(|_| AppError::Validation("amount fraction too large".into()))?;
        frac_val *= 10u128.pow((decimals as usize - frac_part.len()) as u32);
    }
    int_val
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or_else(|| AppError::Validation("amount overflows".into()))
}

/// Format raw base units as a human-unit float (wire edge only).
pub fn format_amount(raw: u128, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}
