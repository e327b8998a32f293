use chrono::{DateTime, Utc};
use journey_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::{require_id, CoreError, CoreResult};

/// Well-known status values. Statuses are stored as free-form strings, these
/// are only the ones the booking flow itself produces.
pub mod status {
    pub const CONFIRMED: &str = "Confirmed";
    pub const CANCELLED: &str = "Cancelled";
    pub const SCHEDULED: &str = "Scheduled";
    pub const BOARDING: &str = "Boarding";
    pub const DEPARTED: &str = "Departed";
    pub const DELAYED: &str = "Delayed";
}

/// A passenger itinerary: the aggregate stored under one cache key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Journey {
    pub id: String,
    pub passenger_name: String,
    pub passenger_email: Masked<String>,
    pub booking_date: DateTime<Utc>,
    pub status: String,
    /// Sum of segment prices at construction. Not re-derived afterwards.
    pub total_price: Decimal,
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Journey {
    pub fn new(
        id: impl Into<String>,
        passenger_name: impl Into<String>,
        passenger_email: impl Into<Masked<String>>,
        booking_date: DateTime<Utc>,
        status: impl Into<String>,
        segments: Vec<Segment>,
        metadata: BTreeMap<String, String>,
    ) -> CoreResult<Self> {
        let total_price = segments.iter().map(|s| s.price).sum();
        let journey = Self {
            id: id.into(),
            passenger_name: passenger_name.into(),
            passenger_email: passenger_email.into(),
            booking_date,
            status: status.into(),
            total_price,
            segments,
            metadata,
        };

        journey.validate()?;
        Ok(journey)
    }

    /// Checks the aggregate invariants: a non-blank id, and segments with
    /// non-blank, unique ids and positive prices.
    pub fn validate(&self) -> CoreResult<()> {
        require_id("Journey ID", &self.id)?;

        let mut seen = HashSet::with_capacity(self.segments.len());
        for segment in &self.segments {
            require_id("Segment ID", &segment.segment_id)?;

            if !seen.insert(segment.segment_id.as_str()) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate segment {} in journey {}",
                    segment.segment_id, self.id
                )));
            }

            if segment.price <= Decimal::ZERO {
                return Err(CoreError::ValidationError(format!(
                    "Segment {} must have a positive price, got {}",
                    segment.segment_id, segment.price
                )));
            }
        }

        Ok(())
    }

    pub fn segment(&self, segment_id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.segment_id == segment_id)
    }

    pub fn segment_mut(&mut self, segment_id: &str) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|s| s.segment_id == segment_id)
    }
}

/// One flight leg of a journey. `segment_id` is only unique within its journey.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub segment_id: String,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub flight_number: String,
    pub carrier: String,
    pub status: String,
    pub price: Decimal,
}

impl Segment {
    /// A new segment starts out `Scheduled`.
    pub fn new(
        segment_id: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
        departure_time: DateTime<Utc>,
        arrival_time: DateTime<Utc>,
        price: Decimal,
    ) -> Self {
        Self {
            segment_id: segment_id.into(),
            origin: origin.into(),
            destination: destination.into(),
            departure_time,
            arrival_time,
            flight_number: String::new(),
            carrier: String::new(),
            status: status::SCHEDULED.to_string(),
            price,
        }
    }

    pub fn operated_by(mut self, carrier: impl Into<String>, flight_number: impl Into<String>) -> Self {
        self.carrier = carrier.into();
        self.flight_number = flight_number.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn segment(id: &str, cents: i64) -> Segment {
        let departure = Utc::now() + Duration::days(1);
        Segment::new(id, "MAD", "BCN", departure, departure + Duration::hours(2), Decimal::new(cents, 2))
            .operated_by("Iberia", "IB3001")
    }

    #[test]
    fn test_total_price_is_sum_of_segments() {
        let journey = Journey::new(
            "JRN-1",
            "Test User",
            "test@test.com",
            Utc::now(),
            status::CONFIRMED,
            vec![segment("SEG-001", 10100), segment("SEG-002", 10250)],
            BTreeMap::new(),
        )
        .unwrap();

        assert_eq!(journey.total_price, Decimal::new(20350, 2));
        assert_eq!(journey.segments[0].status, status::SCHEDULED);
    }

    #[test]
    fn test_total_price_not_rederived_on_segment_change() {
        let mut journey = Journey::new(
            "JRN-1",
            "Test User",
            "test@test.com",
            Utc::now(),
            status::CONFIRMED,
            vec![segment("SEG-001", 10000)],
            BTreeMap::new(),
        )
        .unwrap();

        journey.segment_mut("SEG-001").unwrap().price = Decimal::new(50000, 2);
        assert_eq!(journey.total_price, Decimal::new(10000, 2));
    }

    #[test]
    fn test_duplicate_segment_ids_rejected() {
        let result = Journey::new(
            "JRN-1",
            "Test User",
            "test@test.com",
            Utc::now(),
            status::CONFIRMED,
            vec![segment("SEG-001", 100), segment("SEG-001", 200)],
            BTreeMap::new(),
        );

        assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }

    #[test]
    fn test_blank_ids_and_non_positive_prices_rejected() {
        let blank_journey = Journey::new(
            "  ",
            "Test User",
            "test@test.com",
            Utc::now(),
            status::CONFIRMED,
            vec![],
            BTreeMap::new(),
        );
        assert!(blank_journey.is_err());

        let blank_segment = Journey::new(
            "JRN-1",
            "Test User",
            "test@test.com",
            Utc::now(),
            status::CONFIRMED,
            vec![segment("", 100)],
            BTreeMap::new(),
        );
        assert!(blank_segment.is_err());

        let free_segment = Journey::new(
            "JRN-1",
            "Test User",
            "test@test.com",
            Utc::now(),
            status::CONFIRMED,
            vec![segment("SEG-001", 0)],
            BTreeMap::new(),
        );
        assert!(free_segment.is_err());
    }

    #[test]
    fn test_segment_lookup() {
        let journey = Journey::new(
            "JRN-1",
            "Test User",
            "test@test.com",
            Utc::now(),
            status::CONFIRMED,
            vec![segment("SEG-001", 100), segment("SEG-002", 100)],
            BTreeMap::new(),
        )
        .unwrap();

        assert_eq!(journey.segment("SEG-002").unwrap().segment_id, "SEG-002");
        assert!(journey.segment("SEG-404").is_none());
    }
}
