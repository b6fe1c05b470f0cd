// =============================================================================
// AVAILABILITY MODULE
// =============================================================================
// Date ranges, the per-room inventory index, and the availability predicate.
//
// A stay occupies every night from check-in up to, but not including, the
// check-out day. The checkout day itself never consumes inventory.
// =============================================================================

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::booking::BookingError;

/// Longest stay a single booking may cover
pub const MAX_STAY_NIGHTS: u32 = 365;

// =============================================================================
// DATE RANGE
// =============================================================================
/// Requested stay: `from` is the check-in day, `to` the check-out day.
///
/// Valid only when `to > from`. Construction does not enforce this so that
/// request bodies can be deserialized first and rejected with a
/// `BookingError::Validation` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// Calendar-day difference; zero or negative for invalid ranges.
    pub fn nights(&self) -> i64 {
        (self.to - self.from).num_days()
    }

    /// Number of occupied nights, or a validation error for empty, inverted
    /// and over-long ranges.
    pub fn validate(&self) -> Result<u32, BookingError> {
        let nights = self.nights();
        if nights <= 0 {
            return Err(BookingError::Validation(format!(
                "check-out ({}) must be after check-in ({})",
                self.to, self.from
            )));
        }
        if nights > i64::from(MAX_STAY_NIGHTS) {
            return Err(BookingError::Validation(format!(
                "stay of {} nights exceeds the {} night limit",
                nights, MAX_STAY_NIGHTS
            )));
        }
        u32::try_from(nights)
            .map_err(|_| BookingError::Validation(format!("stay of {} nights is too long", nights)))
    }

    /// Every occupied night, checkout day excluded.
    pub fn occupied_nights(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.from.iter_days().take_while(move |day| *day < self.to)
    }
}

// =============================================================================
// INVENTORY INDEX
// =============================================================================
/// Booked-room count per calendar day for a single room.
///
/// Only days with at least one booking are stored; a missing day reads as 0.
/// Serializes as a JSON object keyed by `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryMap {
    days: BTreeMap<NaiveDate, u32>,
}

impl InventoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rooms already committed on `day`.
    pub fn booked_on(&self, day: NaiveDate) -> u32 {
        self.days.get(&day).copied().unwrap_or(0)
    }

    /// Overwrite the count for a day. Zero removes the entry.
    pub fn set(&mut self, day: NaiveDate, booked: u32) {
        if booked == 0 {
            self.days.remove(&day);
        } else {
            self.days.insert(day, booked);
        }
    }

    /// Commit one room for every occupied night of `range`.
    pub fn record_stay(&mut self, range: &DateRange) {
        for day in range.occupied_nights() {
            *self.days.entry(day).or_insert(0) += 1;
        }
    }

    /// Copy of the entries that fall inside the occupied nights of `range`.
    pub fn window(&self, range: &DateRange) -> InventoryMap {
        // BTreeMap::range panics on an inverted range
        if range.nights() <= 0 {
            return InventoryMap::new();
        }
        let days = self
            .days
            .range(range.from..range.to)
            .map(|(day, booked)| (*day, *booked))
            .collect();
        InventoryMap { days }
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, u32)> + '_ {
        self.days.iter().map(|(day, booked)| (*day, *booked))
    }
}

impl FromIterator<(NaiveDate, u32)> for InventoryMap {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, u32)>>(iter: I) -> Self {
        let mut map = InventoryMap::new();
        for (day, booked) in iter {
            map.set(day, booked);
        }
        map
    }
}

// =============================================================================
// AVAILABILITY CHECKER
// =============================================================================
/// `true` only if every occupied night of `range` has a booked count strictly
/// below `capacity`.
///
/// Empty and inverted ranges are never available; callers reject them with
/// `DateRange::validate` before getting here.
pub fn is_available(range: &DateRange, inventory: &InventoryMap, capacity: u32) -> bool {
    if range.nights() <= 0 {
        return false;
    }
    range
        .occupied_nights()
        .all(|day| inventory.booked_on(day) < capacity)
}

/// First occupied night with no capacity left, for error messages.
pub fn first_full_night(
    range: &DateRange,
    inventory: &InventoryMap,
    capacity: u32,
) -> Option<NaiveDate> {
    range
        .occupied_nights()
        .find(|day| inventory.booked_on(*day) >= capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn range(from: &str, to: &str) -> DateRange {
        DateRange::new(day(from), day(to))
    }

    fn saturated_mid_august() -> InventoryMap {
        serde_json::from_str(r#"{"2024-08-15": 2}"#).unwrap()
    }

    #[test]
    fn saturated_night_blocks_single_night_stay() {
        let inventory = saturated_mid_august();
        assert!(!is_available(&range("2024-08-15", "2024-08-16"), &inventory, 2));
    }

    #[test]
    fn stay_after_saturated_night_is_available() {
        let inventory = saturated_mid_august();
        assert!(is_available(&range("2024-08-16", "2024-08-17"), &inventory, 2));
    }

    #[test]
    fn checkout_day_is_not_checked() {
        // Only 2024-08-15 is full and it is the checkout day.
        let inventory = saturated_mid_august();
        assert!(is_available(&range("2024-08-12", "2024-08-15"), &inventory, 2));
    }

    #[test]
    fn one_free_slot_is_enough() {
        let mut inventory = InventoryMap::new();
        for capacity in 1..5 {
            inventory.set(day("2024-03-01"), capacity - 1);
            assert!(is_available(&range("2024-03-01", "2024-03-02"), &inventory, capacity));
        }
    }

    #[test]
    fn full_night_inside_multi_night_stay_blocks_it() {
        let mut inventory = InventoryMap::new();
        inventory.set(day("2024-08-13"), 3);
        let stay = range("2024-08-11", "2024-08-16");
        assert!(!is_available(&stay, &inventory, 3));
        assert_eq!(first_full_night(&stay, &inventory, 3), Some(day("2024-08-13")));
    }

    #[test]
    fn empty_and_inverted_ranges_are_never_available() {
        let inventory = InventoryMap::new();
        assert!(!is_available(&range("2024-08-15", "2024-08-15"), &inventory, 5));
        assert!(!is_available(&range("2024-08-16", "2024-08-15"), &inventory, 5));
    }

    #[test]
    fn validate_reports_nights() {
        assert_eq!(range("2024-08-15", "2024-08-18").validate().unwrap(), 3);
        assert!(matches!(
            range("2024-08-15", "2024-08-15").validate(),
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(
            range("2024-08-18", "2024-08-15").validate(),
            Err(BookingError::Validation(_))
        ));
    }

    #[test]
    fn stays_longer_than_a_year_are_rejected() {
        assert_eq!(range("2024-01-01", "2024-12-31").validate().unwrap(), 365);
        assert!(matches!(
            range("2024-01-01", "2025-01-01").validate(),
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(
            range("0001-01-01", "9999-12-31").validate(),
            Err(BookingError::Validation(_))
        ));
    }

    #[test]
    fn occupied_nights_cross_month_boundary() {
        let nights: Vec<_> = range("2024-02-28", "2024-03-02").occupied_nights().collect();
        assert_eq!(nights, vec![day("2024-02-28"), day("2024-02-29"), day("2024-03-01")]);
    }

    #[test]
    fn record_stay_increments_each_night_only() {
        let mut inventory = InventoryMap::new();
        inventory.record_stay(&range("2024-08-15", "2024-08-17"));
        inventory.record_stay(&range("2024-08-16", "2024-08-17"));
        assert_eq!(inventory.booked_on(day("2024-08-15")), 1);
        assert_eq!(inventory.booked_on(day("2024-08-16")), 2);
        assert_eq!(inventory.booked_on(day("2024-08-17")), 0);
    }

    #[test]
    fn window_keeps_only_occupied_nights() {
        let inventory: InventoryMap = [
            (day("2024-08-14"), 1),
            (day("2024-08-15"), 2),
            (day("2024-08-16"), 1),
        ]
        .into_iter()
        .collect();
        let window = inventory.window(&range("2024-08-15", "2024-08-16"));
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![(day("2024-08-15"), 2)]);
    }

    #[test]
    fn zero_counts_are_not_stored() {
        let mut inventory = InventoryMap::new();
        inventory.set(day("2024-08-15"), 0);
        assert!(inventory.is_empty());
        assert_eq!(serde_json::to_string(&inventory).unwrap(), "{}");
    }
}
