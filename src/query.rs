// Query Service - eligibility filter, quote annotation, ordering, pagination

use crate::entities::Offer;
use crate::error::{CalcError, Result};
use crate::quote::{monthly_payment, proposed_rate, QuoteRequest};
use crate::schema::validate_quote_request;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Hard ceiling on requested page size
pub const MAX_PAGE_SIZE: usize = 100;

// ============================================================================
// SORT KEYS
// ============================================================================

/// Fields an offer listing may be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    RateMin,
    RateMax,
    TermMin,
    TermMax,
    PaymentMin,
    PaymentMax,
    Payment,
    Rate,
}

impl SortKey {
    pub const ALL: [SortKey; 9] = [
        SortKey::Id,
        SortKey::RateMin,
        SortKey::RateMax,
        SortKey::TermMin,
        SortKey::TermMax,
        SortKey::PaymentMin,
        SortKey::PaymentMax,
        SortKey::Payment,
        SortKey::Rate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Id => "id",
            SortKey::RateMin => "rate_min",
            SortKey::RateMax => "rate_max",
            SortKey::TermMin => "term_min",
            SortKey::TermMax => "term_max",
            SortKey::PaymentMin => "payment_min",
            SortKey::PaymentMax => "payment_max",
            SortKey::Payment => "payment",
            SortKey::Rate => "rate",
        }
    }

    /// Value of this key on a record; `None` when the record was not quoted
    fn value(&self, record: &QuotedOffer) -> Option<f64> {
        let offer = &record.offer;
        match self {
            SortKey::Id => Some(offer.id as f64),
            SortKey::RateMin => Some(offer.rate_min),
            SortKey::RateMax => Some(offer.rate_max),
            SortKey::TermMin => Some(f64::from(offer.term_min)),
            SortKey::TermMax => Some(f64::from(offer.term_max)),
            SortKey::PaymentMin => Some(offer.payment_min as f64),
            SortKey::PaymentMax => Some(offer.payment_max as f64),
            SortKey::Payment => record.payment,
            SortKey::Rate => record.rate,
        }
    }
}

impl FromStr for SortKey {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self> {
        SortKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = SortKey::ALL.iter().map(|k| k.as_str()).collect();
                CalcError::invalid_field(
                    "order",
                    format!("Unknown sort key '{}', expected one of: {}", s, allowed.join(", ")),
                    "Query",
                )
            })
    }
}

/// A sort key plus direction, parsed from `rate` / `-rate` style strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub key: SortKey,
    pub descending: bool,
}

impl FromStr for SortOrder {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        Ok(SortOrder {
            key: name.parse()?,
            descending,
        })
    }
}

// ============================================================================
// QUERY PARAMETERS
// ============================================================================

/// Raw list-endpoint parameters as they arrive on the query string
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "server", into_params(parameter_in = Query))]
pub struct ListParams {
    /// Requested credit amount
    pub price: Option<u64>,
    /// Down payment, percent of price
    pub deposit: Option<f64>,
    /// Loan term, years
    pub term: Option<u32>,
    /// Sort key, `-` prefix for descending
    pub order: Option<String>,
    /// 1-based page number; omit to get every result
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

/// Requested page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

/// Validated query, ready to run against a set of offers
#[derive(Debug, Clone, PartialEq)]
pub struct OfferQuery {
    pub quote: Option<QuoteRequest>,
    pub order: Option<SortOrder>,
    pub page: Option<PageRequest>,
}

impl ListParams {
    pub fn into_query(self, default_page_size: usize) -> Result<OfferQuery> {
        let quote = match (self.price, self.term) {
            (Some(price), Some(term)) => {
                let request = QuoteRequest {
                    price,
                    deposit: self.deposit.unwrap_or(0.0),
                    term,
                };
                validate_quote_request(&request)?;
                Some(request)
            }
            (None, None) if self.deposit.is_none() => None,
            _ => {
                return Err(CalcError::InvalidRequest(
                    "price and term must be given together".to_string(),
                ))
            }
        };

        let order = self
            .order
            .as_deref()
            .filter(|o| !o.trim().is_empty())
            .map(str::parse::<SortOrder>)
            .transpose()?;

        let page = match self.page {
            Some(0) => {
                return Err(CalcError::invalid_field("page", "Pages start at 1", "Query"))
            }
            Some(page) => Some(PageRequest {
                page,
                page_size: self
                    .page_size
                    .unwrap_or(default_page_size)
                    .clamp(1, MAX_PAGE_SIZE),
            }),
            None => None,
        };

        Ok(OfferQuery { quote, order, page })
    }
}

// ============================================================================
// ANNOTATED RECORD
// ============================================================================

/// Offer representation, optionally augmented with quote results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotedOffer {
    #[serde(flatten)]
    pub offer: Offer,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

impl From<Offer> for QuotedOffer {
    fn from(offer: Offer) -> Self {
        QuotedOffer {
            offer,
            payment: None,
            rate: None,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub page: usize,
    pub page_size: usize,
    pub results: Vec<T>,
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Offers whose payment and term ranges both contain the request
pub fn find_eligible(offers: impl IntoIterator<Item = Offer>, price: u64, term: u32) -> Vec<Offer> {
    offers
        .into_iter()
        .filter(|offer| offer.covers(price, term))
        .collect()
}

/// Attach the monthly payment, and the proposed rate when ordering by rate
pub fn annotate(offer: Offer, request: &QuoteRequest, order: Option<&SortOrder>) -> Result<QuotedOffer> {
    let rate = proposed_rate(&offer, request.price, request.term)?;
    let payment = monthly_payment(request.price, request.deposit, request.term, rate)?;
    let show_rate = matches!(order, Some(o) if o.key == SortKey::Rate);

    Ok(QuotedOffer {
        offer,
        payment: Some(payment),
        rate: show_rate.then_some(rate),
    })
}

/// Stable sort by the given order; fails if any record lacks the key
pub fn sort(records: &mut [QuotedOffer], order: &SortOrder) -> Result<()> {
    if let Some(missing) = records.iter().find(|r| order.key.value(r).is_none()) {
        return Err(CalcError::invalid_field(
            "order",
            format!(
                "Offer {} has no '{}' value; pass price and term to sort by it",
                missing.offer.id,
                order.key.as_str()
            ),
            "Query",
        ));
    }

    let key = order.key;
    records.sort_by(|a, b| {
        let (x, y) = (key.value(a), key.value(b));
        let ordering = match (x, y) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        };
        if order.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });

    Ok(())
}

/// Slice one page out of an ordered result set
pub fn paginate<T>(records: Vec<T>, page: &PageRequest) -> Result<Page<T>> {
    let count = records.len();
    let start = page.page.saturating_sub(1).saturating_mul(page.page_size);
    if start >= count {
        return Err(CalcError::NotFound("Invalid page.".to_string()));
    }

    let results = records.into_iter().skip(start).take(page.page_size).collect();
    Ok(Page {
        count,
        page: page.page,
        page_size: page.page_size,
        results,
    })
}

/// Filter, annotate and order `offers` for a query.
///
/// An empty result is reported as `NotFound`.
pub fn run(offers: Vec<Offer>, query: &OfferQuery) -> Result<Vec<QuotedOffer>> {
    let mut records = match &query.quote {
        Some(request) => find_eligible(offers, request.price, request.term)
            .into_iter()
            .map(|offer| annotate(offer, request, query.order.as_ref()))
            .collect::<Result<Vec<_>>>()?,
        None => offers.into_iter().map(QuotedOffer::from).collect(),
    };

    if records.is_empty() {
        return Err(CalcError::no_offers());
    }

    match &query.order {
        Some(order) => sort(&mut records, order)?,
        None => records.sort_by_key(|r| r.offer.id),
    }

    Ok(records)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(id: i64, term: (u32, u32), rate: (f64, f64), payment: (u64, u64)) -> Offer {
        Offer {
            id,
            bank_name: format!("Bank {}", id),
            rate_min: rate.0,
            rate_max: rate.1,
            term_min: term.0,
            term_max: term.1,
            payment_min: payment.0,
            payment_max: payment.1,
        }
    }

    fn catalog() -> Vec<Offer> {
        vec![
            offer(1, (5, 30), (6.0, 12.0), (1_000_000, 10_000_000)),
            offer(2, (1, 10), (4.0, 8.0), (500_000, 3_000_000)),
            offer(3, (10, 25), (7.0, 9.0), (2_000_000, 6_000_000)),
        ]
    }

    fn request(price: u64, term: u32) -> QuoteRequest {
        QuoteRequest {
            price,
            deposit: 10.0,
            term,
        }
    }

    #[test]
    fn test_sort_order_parsing() {
        let asc: SortOrder = "payment".parse().unwrap();
        assert_eq!(asc.key, SortKey::Payment);
        assert!(!asc.descending);

        let desc: SortOrder = "-rate".parse().unwrap();
        assert_eq!(desc.key, SortKey::Rate);
        assert!(desc.descending);

        assert!("bank_name".parse::<SortOrder>().is_err());
        assert!("--rate".parse::<SortOrder>().is_err());
    }

    #[test]
    fn test_find_eligible_only_returns_covering_offers() {
        let eligible = find_eligible(catalog(), 2_500_000, 10);
        let ids: Vec<i64> = eligible.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let eligible = find_eligible(catalog(), 8_000_000, 20);
        let ids: Vec<i64> = eligible.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1]);

        for price in (0..12_000_000).step_by(750_000) {
            for term in 0..35 {
                for o in find_eligible(catalog(), price, term) {
                    assert!(o.payment_min <= price && price <= o.payment_max);
                    assert!(o.term_min <= term && term <= o.term_max);
                }
            }
        }
    }

    #[test]
    fn test_find_eligible_empty_is_not_an_error() {
        assert!(find_eligible(catalog(), 50_000_000, 10).is_empty());
    }

    #[test]
    fn test_annotate_includes_rate_only_for_rate_order() {
        let o = catalog().remove(0);
        let req = request(5_500_000, 17);

        let plain = annotate(o.clone(), &req, None).unwrap();
        assert!(plain.payment.is_some());
        assert!(plain.rate.is_none());

        let by_payment: SortOrder = "-payment".parse().unwrap();
        assert!(annotate(o.clone(), &req, Some(&by_payment)).unwrap().rate.is_none());

        let by_rate: SortOrder = "-rate".parse().unwrap();
        let rated = annotate(o, &req, Some(&by_rate)).unwrap();
        assert!((rated.rate.unwrap() - 9.06).abs() < 1e-9);
    }

    #[test]
    fn test_annotated_json_shape() {
        let by_rate: SortOrder = "rate".parse().unwrap();
        let record = annotate(catalog().remove(0), &request(5_500_000, 17), Some(&by_rate)).unwrap();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["id"], 1);
        assert_eq!(json["bank_name"], "Bank 1");
        assert!(json["payment"].is_number());
        assert!(json["rate"].is_number());

        let bare = serde_json::to_value(QuotedOffer::from(catalog().remove(0))).unwrap();
        assert!(bare.get("payment").is_none());
        assert!(bare.get("rate").is_none());
    }

    #[test]
    fn test_sort_is_stable() {
        // Offers 1 and 3 share rate_max; their input order must survive both directions
        let mut records: Vec<QuotedOffer> = vec![
            offer(3, (1, 2), (1.0, 9.0), (1, 2)),
            offer(1, (1, 2), (1.0, 9.0), (1, 2)),
            offer(2, (1, 2), (1.0, 5.0), (1, 2)),
        ]
        .into_iter()
        .map(QuotedOffer::from)
        .collect();

        sort(&mut records, &"rate_max".parse().unwrap()).unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.offer.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        sort(&mut records, &"-rate_max".parse().unwrap()).unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.offer.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_sort_by_missing_value_fails_fast() {
        let mut records: Vec<QuotedOffer> = catalog().into_iter().map(QuotedOffer::from).collect();
        let result = sort(&mut records, &"payment".parse().unwrap());
        assert!(matches!(result, Err(CalcError::Validation(_))));
    }

    #[test]
    fn test_run_orders_by_proposed_rate() {
        let query = OfferQuery {
            quote: Some(request(2_500_000, 10)),
            order: Some("rate".parse().unwrap()),
            page: None,
        };

        let records = run(catalog(), &query).unwrap();
        let rates: Vec<f64> = records.iter().map(|r| r.rate.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert!(rates.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_run_without_quote_orders_by_id() {
        let mut offers = catalog();
        offers.reverse();
        let query = OfferQuery {
            quote: None,
            order: None,
            page: None,
        };

        let ids: Vec<i64> = run(offers, &query).unwrap().iter().map(|r| r.offer.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_run_with_no_match_is_not_found() {
        let query = OfferQuery {
            quote: Some(request(50_000_000, 10)),
            order: None,
            page: None,
        };
        assert!(matches!(run(catalog(), &query), Err(CalcError::NotFound(_))));
    }

    #[test]
    fn test_run_reports_zero_width_offer() {
        // Stored without going through validation
        let mut offers = catalog();
        offers.push(offer(4, (10, 10), (5.0, 7.0), (1_000_000, 4_000_000)));
        let query = OfferQuery {
            quote: Some(request(2_500_000, 10)),
            order: None,
            page: None,
        };

        let result = run(offers, &query);
        assert!(matches!(
            result,
            Err(CalcError::Quote(crate::quote::QuoteError::DegenerateRange {
                min_field: "term_min",
                max_field: "term_max",
            }))
        ));
    }

    #[test]
    fn test_list_params_require_price_and_term_together() {
        let params = ListParams {
            price: Some(1_000_000),
            ..Default::default()
        };
        assert!(matches!(params.into_query(20), Err(CalcError::InvalidRequest(_))));

        let params = ListParams {
            deposit: Some(10.0),
            ..Default::default()
        };
        assert!(params.into_query(20).is_err());

        let query = ListParams::default().into_query(20).unwrap();
        assert!(query.quote.is_none());
    }

    #[test]
    fn test_list_params_defaults_and_page_size_cap() {
        let params = ListParams {
            price: Some(1_000_000),
            term: Some(10),
            page: Some(2),
            page_size: Some(1_000),
            ..Default::default()
        };
        let query = params.into_query(20).unwrap();

        assert_eq!(query.quote.unwrap().deposit, 0.0);
        assert_eq!(
            query.page,
            Some(PageRequest {
                page: 2,
                page_size: MAX_PAGE_SIZE
            })
        );
    }

    #[test]
    fn test_paginate() {
        let records: Vec<i32> = (1..=5).collect();
        let page = paginate(records.clone(), &PageRequest { page: 2, page_size: 2 }).unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(page.results, vec![3, 4]);

        let last = paginate(records.clone(), &PageRequest { page: 3, page_size: 2 }).unwrap();
        assert_eq!(last.results, vec![5]);

        let past_end = paginate(records, &PageRequest { page: 4, page_size: 2 });
        assert!(matches!(past_end, Err(CalcError::NotFound(_))));
    }
}
