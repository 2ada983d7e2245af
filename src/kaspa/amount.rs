use thiserror::Error;

/// 1 KAS = 10^8 sompi.
pub const SOMPI_PER_KAS: u64 = 100_000_000;

const DECIMALS: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("invalid KAS amount '{0}'")]
    Invalid(String),
    #[error("KAS amount '{0}' has more than 8 decimals")]
    TooPrecise(String),
    #[error("KAS amount '{0}' overflows")]
    Overflow(String),
}

/// Convert a decimal KAS string ("30", "0.0003") to sompi.
pub fn kas_to_sompi(kas: &str) -> Result<u64, AmountError> {
    let trimmed = kas.trim();
    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !is_digits(whole) || !is_digits(frac) {
        return Err(AmountError::Invalid(kas.to_string()));
    }
    if frac.len() > DECIMALS {
        return Err(AmountError::TooPrecise(kas.to_string()));
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| AmountError::Overflow(kas.to_string()))?
    };
    let frac: u64 = format!("{:0<width$}", frac, width = DECIMALS)
        .parse()
        .map_err(|_| AmountError::Invalid(kas.to_string()))?;

    whole
        .checked_mul(SOMPI_PER_KAS)
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(|| AmountError::Overflow(kas.to_string()))
}
