// Quote Engine - proposed rate and monthly payment for a single offer
//
// Larger principal and longer term map to a lower rate inside the offer's
// advertised rate range. Ratios are not clamped: a request outside the
// offer's ranges extrapolates.

use crate::entities::Offer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    /// `min == max` on a range used as a divisor
    #[error("Offer has a zero-width {min_field}..{max_field} range")]
    DegenerateRange {
        min_field: &'static str,
        max_field: &'static str,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// ============================================================================
// QUOTE REQUEST
// ============================================================================

/// Client parameters for a quote
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    /// Requested credit amount
    pub price: u64,

    /// Down payment, percent of price (0-100)
    #[serde(default)]
    pub deposit: f64,

    /// Loan term, years
    pub term: u32,
}

// ============================================================================
// FORMULAS
// ============================================================================

/// Interpolated rate for `price` and `term` within the offer's ranges.
///
/// Returns `rate_max` at (payment_min, term_min) and `rate_min` at
/// (payment_max, term_max).
pub fn proposed_rate(offer: &Offer, price: u64, term: u32) -> Result<f64, QuoteError> {
    if offer.payment_max <= offer.payment_min {
        return Err(QuoteError::DegenerateRange {
            min_field: "payment_min",
            max_field: "payment_max",
        });
    }
    if offer.term_max <= offer.term_min {
        return Err(QuoteError::DegenerateRange {
            min_field: "term_min",
            max_field: "term_max",
        });
    }

    let ratio_money = (price as f64 - offer.payment_min as f64)
        / (offer.payment_max as f64 - offer.payment_min as f64);
    let ratio_time = (term as f64 - offer.term_min as f64)
        / (offer.term_max as f64 - offer.term_min as f64);
    let mean_ratio = (ratio_money + ratio_time) / 2.0;

    Ok(offer.rate_min + (offer.rate_max - offer.rate_min) * (1.0 - mean_ratio))
}

/// Fixed-rate annuity installment.
///
/// A rate too small to compound in `f64` degrades to linear amortization;
/// a zero term is rejected.
pub fn monthly_payment(price: u64, deposit: f64, term: u32, rate: f64) -> Result<f64, QuoteError> {
    if term == 0 {
        return Err(QuoteError::InvalidRequest(
            "term must be at least one year".to_string(),
        ));
    }

    let n_months = f64::from(term) * 12.0;
    let credit_amount = price as f64 * (1.0 - deposit / 100.0);
    let linear = credit_amount / n_months;

    if rate == 0.0 {
        return Ok(linear);
    }

    let monthly_rate = rate / 12.0 / 100.0;
    // (1 + r)^n - 1 without cancellation for tiny r
    let accrued = (n_months * monthly_rate.ln_1p()).exp_m1();

    if accrued.is_infinite() {
        // growth / (growth - 1) -> 1
        return Ok(credit_amount * monthly_rate);
    }
    if !accrued.is_normal() {
        return Ok(linear);
    }

    let payment = credit_amount * monthly_rate * (accrued + 1.0) / accrued;
    Ok(if payment.is_finite() { payment } else { linear })
}

/// Rate and payment for one offer, computed together
pub fn quote(offer: &Offer, request: &QuoteRequest) -> Result<(f64, f64), QuoteError> {
    let rate = proposed_rate(offer, request.price, request.term)?;
    let payment = monthly_payment(request.price, request.deposit, request.term, rate)?;
    Ok((rate, payment))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(term: (u32, u32), rate: (f64, f64), payment: (u64, u64)) -> Offer {
        Offer {
            id: 1,
            bank_name: "Test Bank".to_string(),
            rate_min: rate.0,
            rate_max: rate.1,
            term_min: term.0,
            term_max: term.1,
            payment_min: payment.0,
            payment_max: payment.1,
        }
    }

    fn reference_offer() -> Offer {
        offer((5, 30), (6.0, 12.0), (1_000_000, 10_000_000))
    }

    #[test]
    fn test_proposed_rate_midpoint_example() {
        // ratio_money = 0.5, ratio_time = 0.48, mean = 0.49
        let rate = proposed_rate(&reference_offer(), 5_500_000, 17).unwrap();
        assert!((rate - 9.06).abs() < 1e-9, "got {}", rate);
    }

    #[test]
    fn test_proposed_rate_at_range_corners() {
        let o = reference_offer();

        let at_min = proposed_rate(&o, o.payment_min, o.term_min).unwrap();
        let at_max = proposed_rate(&o, o.payment_max, o.term_max).unwrap();

        assert!((at_min - o.rate_max).abs() < 1e-12);
        assert!((at_max - o.rate_min).abs() < 1e-12);
    }

    #[test]
    fn test_proposed_rate_non_increasing_in_price_and_term() {
        let o = reference_offer();

        let mut previous = f64::INFINITY;
        for price in (1_000_000..=10_000_000).step_by(500_000) {
            let rate = proposed_rate(&o, price, 15).unwrap();
            assert!(rate <= previous, "rate rose at price {}", price);
            previous = rate;
        }

        let mut previous = f64::INFINITY;
        for term in 5..=30 {
            let rate = proposed_rate(&o, 4_000_000, term).unwrap();
            assert!(rate <= previous, "rate rose at term {}", term);
            previous = rate;
        }
    }

    #[test]
    fn test_proposed_rate_extrapolates_outside_range() {
        let o = reference_offer();

        // Below both minimums the rate exceeds rate_max
        let rate = proposed_rate(&o, 0, 0).unwrap();
        assert!(rate > o.rate_max);
    }

    #[test]
    fn test_proposed_rate_rejects_zero_width_ranges() {
        let flat_payment = offer((5, 30), (6.0, 12.0), (2_000_000, 2_000_000));
        assert_eq!(
            proposed_rate(&flat_payment, 2_000_000, 10),
            Err(QuoteError::DegenerateRange {
                min_field: "payment_min",
                max_field: "payment_max",
            })
        );

        let flat_term = offer((10, 10), (6.0, 12.0), (1_000_000, 3_000_000));
        assert_eq!(
            proposed_rate(&flat_term, 2_000_000, 10),
            Err(QuoteError::DegenerateRange {
                min_field: "term_min",
                max_field: "term_max",
            })
        );
    }

    #[test]
    fn test_monthly_payment_standard_annuity() {
        // 800 000 credit at 12% over 10 years
        let payment = monthly_payment(1_000_000, 20.0, 10, 12.0).unwrap();
        assert!((payment - 11_477.675_872).abs() < 1e-3, "got {}", payment);
    }

    #[test]
    fn test_monthly_payment_zero_rate_is_linear() {
        let payment = monthly_payment(1_200_000, 0.0, 10, 0.0).unwrap();
        assert_eq!(payment, 1_200_000.0 / 120.0);

        let with_deposit = monthly_payment(1_200_000, 50.0, 5, 0.0).unwrap();
        assert_eq!(with_deposit, 600_000.0 / 60.0);
    }

    #[test]
    fn test_vanishing_rate_stays_finite() {
        // Proposed rate lands around 5e-15 %, below what 1 + r can represent
        let o = offer((5, 30), (0.0, 12.0), (0, 1_000_000_000_000_000));
        let request = QuoteRequest {
            price: 999_999_999_999_999,
            deposit: 0.0,
            term: 30,
        };

        let (rate, payment) = quote(&o, &request).unwrap();
        assert!(rate > 0.0 && rate < 1e-12, "got rate {}", rate);
        assert!(payment.is_finite(), "got payment {}", payment);

        let linear = request.price as f64 / 360.0;
        assert!((payment - linear).abs() / linear < 1e-9, "got {}", payment);
    }

    #[test]
    fn test_monthly_payment_small_rate_close_to_linear() {
        let payment = monthly_payment(1_200_000, 0.0, 10, 1e-9).unwrap();
        assert!(payment.is_finite());
        assert!((payment - 10_000.0).abs() < 1e-3, "got {}", payment);
    }

    #[test]
    fn test_monthly_payment_zero_term_is_invalid() {
        let result = monthly_payment(1_000_000, 10.0, 0, 8.0);
        assert!(matches!(result, Err(QuoteError::InvalidRequest(_))));
    }

    #[test]
    fn test_full_deposit_means_no_payment() {
        let payment = monthly_payment(3_000_000, 100.0, 20, 6.0).unwrap();
        assert_eq!(payment, 0.0);
    }

    #[test]
    fn test_quote_combines_rate_and_payment() {
        let request = QuoteRequest {
            price: 5_500_000,
            deposit: 10.0,
            term: 17,
        };
        let (rate, payment) = quote(&reference_offer(), &request).unwrap();

        let expected = monthly_payment(5_500_000, 10.0, 17, rate).unwrap();
        assert!((rate - 9.06).abs() < 1e-9);
        assert_eq!(payment, expected);
    }
}
