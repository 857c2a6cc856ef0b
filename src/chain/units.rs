//! Integer <-> float boundary conversions.
//!
//! Token amounts and prices live on-chain as base-18 fixed point and stay
//! integer (`U256`/`u128`) everywhere inside the chain client. Conversion
//! to floating-point whole units happens only here, at the boundary.

use alloy::primitives::U256;

/// 1e18, the base-18 fixed-point scale.
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Wei per gwei. The divisor is spelled out because a mis-scaled gas
/// reading propagates into every network-stats payload.
pub const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Exact gwei conversion: `gwei = wei / 1e9`.
pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / WEI_PER_GWEI as f64
}

/// Base-18 integer amount to whole tokens.
pub fn wad_to_tokens(amount: U256) -> f64 {
    // Split into whole and fractional parts so values far above 2^53 wei
    // keep their integer component exact.
    let wad = U256::from(WAD);
    let whole = amount / wad;
    let frac = amount % wad;
    let whole_f = u128::try_from(whole).map(|v| v as f64).unwrap_or(f64::MAX);
    let frac_f = u128::try_from(frac).unwrap_or(0) as f64 / WAD as f64;
    whole_f + frac_f
}

/// Whole tokens (or a native-unit price) to base-18 fixed point.
/// Negative and non-finite inputs clamp to zero.
pub fn tokens_to_wad(tokens: f64) -> U256 {
    if !tokens.is_finite() || tokens <= 0.0 {
        return U256::ZERO;
    }
    let whole = tokens.trunc();
    let frac = tokens - whole;
    let whole_part = U256::from(whole as u128) * U256::from(WAD);
    let frac_part = U256::from((frac * WAD as f64) as u128);
    whole_part + frac_part
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wei_to_gwei_exact() {
        assert_eq!(wei_to_gwei(1_000_000_000), 1.0);
        assert_eq!(wei_to_gwei(52_500_000_000), 52.5);
        assert_eq!(wei_to_gwei(0), 0.0);
        // Regression guard: the divisor is 1e9, not 1e18.
        assert_eq!(wei_to_gwei(WAD), 1_000_000_000.0);
    }

    #[test]
    fn test_wad_round_trip() {
        let one_token = U256::from(WAD);
        assert_eq!(wad_to_tokens(one_token), 1.0);
        assert_eq!(tokens_to_wad(1.0), one_token);

        let half = U256::from(WAD / 2);
        assert_eq!(wad_to_tokens(half), 0.5);
    }

    #[test]
    fn test_large_amounts_keep_magnitude() {
        // 1 billion tokens
        let amount = U256::from(WAD) * U256::from(1_000_000_000u64);
        let tokens = wad_to_tokens(amount);
        assert!((tokens - 1e9).abs() / 1e9 < 1e-9);
    }

    #[test]
    fn test_tokens_to_wad_rejects_garbage() {
        assert_eq!(tokens_to_wad(-1.0), U256::ZERO);
        assert_eq!(tokens_to_wad(f64::NAN), U256::ZERO);
        assert_eq!(tokens_to_wad(f64::INFINITY), U256::ZERO);
    }

    #[test]
    fn test_fractional_price_scaling() {
        // A sub-unit price like 0.000052 native must survive scaling.
        let scaled = tokens_to_wad(0.000052);
        let back = wad_to_tokens(scaled);
        assert!((back - 0.000052).abs() < 1e-12);
    }
}
