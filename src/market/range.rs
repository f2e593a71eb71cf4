//! Market subtitle grammar and temperature-to-bucket classification.
//!
//! Exactly three subtitle forms are recognized:
//!
//! - `"X° to Y°"`    -> `[X, Y]`
//! - `"X° or above"` -> `[X, +inf]`
//! - `"X° or below"` -> `[-inf, X]`
//!
//! Anything else is a [`ParseError`]. Intervals are closed on both ends, so
//! two contiguous buckets share their boundary and the first listed one wins.

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

use crate::error::ParseError;
use crate::market::types::{MarketListing, MarketRange, Settlement};

const GRAMMAR: &str =
    r"^\s*(-?\d+(?:\.\d+)?)°\s+(?:to\s+(-?\d+(?:\.\d+)?)°|or\s+(above|below))\s*$";

fn grammar() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(GRAMMAR).ok()).as_ref()
}

fn bounds(descriptor: &str) -> Option<(f64, f64)> {
    let cap = grammar()?.captures(descriptor)?;
    let first = cap[1].parse::<f64>().ok()?;

    if let Some(high) = cap.get(2) {
        let high = high.as_str().parse::<f64>().ok()?;
        return (first <= high).then_some((first, high));
    }

    match cap.get(3)?.as_str() {
        "above" => Some((first, f64::INFINITY)),
        "below" => Some((f64::NEG_INFINITY, first)),
        _ => None,
    }
}

/// Parse a bare subtitle into an unticketed [`MarketRange`].
pub fn parse_range(descriptor: &str) -> Result<MarketRange, ParseError> {
    let (low, high) =
        bounds(descriptor).ok_or_else(|| ParseError::UnrecognizedFormat(descriptor.to_string()))?;
    Ok(MarketRange {
        ticker: String::new(),
        subtitle: descriptor.to_string(),
        low,
        high,
    })
}

/// Parse a listing's subtitle, keeping its ticker.
pub fn parse_listing(listing: &MarketListing) -> Result<MarketRange, ParseError> {
    Ok(MarketRange {
        ticker: listing.ticker.clone(),
        ..parse_range(&listing.subtitle)?
    })
}

/// Parse every listing, dropping unparseable ones. Order is preserved.
pub fn parse_listings(listings: &[MarketListing]) -> Vec<MarketRange> {
    listings
        .iter()
        .filter_map(|listing| match parse_listing(listing) {
            Ok(range) => Some(range),
            Err(e) => {
                warn!("Skipping market {}: {}", listing.ticker, e);
                None
            }
        })
        .collect()
}

/// First range with `low <= value <= high`, in listing order.
pub fn classify(value: f64, ranges: &[MarketRange]) -> Option<&MarketRange> {
    if value.is_nan() {
        return None;
    }
    ranges.iter().find(|r| r.contains(value))
}

/// Pairs of ranges (by index) whose intervals intersect.
pub fn overlapping_pairs(ranges: &[MarketRange]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..ranges.len() {
        for j in (i + 1)..ranges.len() {
            let (a, b) = (&ranges[i], &ranges[j]);
            if a.low <= b.high && b.low <= a.high {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// The range whose listing settled "yes", if the market has settled.
pub fn settled_range<'a>(ranges: &'a [MarketRange], listings: &[MarketListing]) -> Option<&'a MarketRange> {
    let winner = listings
        .iter()
        .find(|l| l.settlement == Some(Settlement::Yes))?;
    ranges.iter().find(|r| r.ticker == winner.ticker)
}


#[cfg(test)]
mod tests {
    use super::fixtures::daily_listings;
    use super::*;

    fn range(low: f64, high: f64) -> MarketRange {
        MarketRange {
            ticker: format!("T{}-{}", low, high),
            subtitle: format!("{}° to {}°", low, high),
            low,
            high,
        }
    }

    fn bounds_of(descriptor: &str) -> (f64, f64) {
        let r = parse_range(descriptor).unwrap();
        (r.low, r.high)
    }

    #[test]
    fn test_parse_between() {
        assert_eq!(bounds_of("59° to 60°"), (59.0, 60.0));
    }

    #[test]
    fn test_parse_above() {
        assert_eq!(bounds_of("65° or above"), (65.0, f64::INFINITY));
    }

    #[test]
    fn test_parse_below() {
        assert_eq!(bounds_of("56° or below"), (f64::NEG_INFINITY, 56.0));
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(
            parse_range("garbage"),
            Err(ParseError::UnrecognizedFormat("garbage".to_string()))
        );
    }

    #[test]
    fn test_parse_listing_keeps_ticker() {
        let listing = MarketListing::new("KXHIGHNY-25JAN05-B57.5", "57° to 58°");
        let range = parse_listing(&listing).unwrap();
        assert_eq!(range.ticker, "KXHIGHNY-25JAN05-B57.5");
        assert_eq!((range.low, range.high), (57.0, 58.0));
    }

    #[test]
    fn test_parse_rejects_partial_matches() {
        assert!(parse_range("High of 59° to 60° in NYC").is_err());
        assert!(parse_range("59 to 60").is_err());
        assert!(parse_range("65° or more").is_err());
        assert!(parse_range("60° to 59°").is_err());
    }

    #[test]
    fn test_parse_listings_skips_bad_subtitles() {
        let mut listings = daily_listings();
        listings.insert(2, MarketListing::new("BAD", "Will it rain?"));
        let ranges = parse_listings(&listings);
        assert_eq!(ranges.len(), 6);
        assert!(ranges.iter().all(|r| r.ticker != "BAD"));
        assert_eq!(ranges[0].ticker, "KXHIGHNY-25JAN05-B54");
    }

    #[test]
    fn test_classify_closed_boundaries() {
        let ranges = parse_listings(&daily_listings());
        assert_eq!(classify(59.0, &ranges).unwrap().subtitle, "59° to 60°");
        assert_eq!(classify(60.0, &ranges).unwrap().subtitle, "59° to 60°");
        assert_eq!(classify(59.5, &ranges).unwrap().subtitle, "59° to 60°");
    }

    #[test]
    fn test_classify_open_ended() {
        let ranges = parse_listings(&daily_listings());
        assert_eq!(classify(20.0, &ranges).unwrap().subtitle, "54° or below");
        assert_eq!(classify(99.0, &ranges).unwrap().subtitle, "63° or above");
    }

    #[test]
    fn test_classify_gap_is_not_found() {
        let ranges = parse_listings(&daily_listings());
        assert!(classify(58.5, &ranges).is_none());
        assert!(classify(f64::NAN, &ranges).is_none());
    }

    #[test]
    fn test_classify_first_match_wins_on_shared_boundary() {
        let ranges = vec![range(57.0, 58.0), range(58.0, 59.0), range(59.0, 60.0)];
        assert_eq!(classify(58.0, &ranges).unwrap().low, 57.0);
        assert_eq!(classify(58.1, &ranges).unwrap().low, 58.0);

        let reversed: Vec<_> = ranges.iter().rev().cloned().collect();
        assert_eq!(classify(58.0, &reversed).unwrap().low, 58.0);
    }

    #[test]
    fn test_daily_fixture_has_no_overlap() {
        let ranges = parse_listings(&daily_listings());
        assert!(overlapping_pairs(&ranges).is_empty());
    }

    #[test]
    fn test_overlap_detected_on_shared_boundary() {
        let ranges = vec![range(57.0, 58.0), range(58.0, 59.0)];
        assert_eq!(overlapping_pairs(&ranges), vec![(0, 1)]);
    }

    #[test]
    fn test_settled_range() {
        let mut listings = daily_listings();
        listings[3].settlement = Some(Settlement::Yes);
        listings[2].settlement = Some(Settlement::No);
        let ranges = parse_listings(&listings);
        assert_eq!(settled_range(&ranges, &listings).unwrap().subtitle, "59° to 60°");

        assert!(settled_range(&ranges, &daily_listings()).is_none());
    }
}
