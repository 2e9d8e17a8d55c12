use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// The two physical ranges that can be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RangeType {
    #[serde(rename = ".22 Range")]
    TwentyTwo,
    #[serde(rename = "Rifle Range")]
    Rifle,
}

impl RangeType {
    pub const ALL: [RangeType; 2] = [RangeType::TwentyTwo, RangeType::Rifle];

    pub fn as_str(&self) -> &'static str {
        match self {
            RangeType::TwentyTwo => ".22 Range",
            RangeType::Rifle => "Rifle Range",
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RangeType::TwentyTwo => "22",
            RangeType::Rifle => "rifle",
        }
    }
}

impl fmt::Display for RangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RangeType::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or(ParseError::RangeType)
    }
}

/// One of the eight one-hour slots, identified by its starting hour.
/// Renders as `"09:00-10:00"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeSlot(u8);

impl TimeSlot {
    pub const FIRST_HOUR: u8 = 9;
    pub const LAST_HOUR: u8 = 16;

    pub fn from_start_hour(hour: u8) -> Option<Self> {
        (Self::FIRST_HOUR..=Self::LAST_HOUR)
            .contains(&hour)
            .then_some(Self(hour))
    }

    pub fn start_hour(&self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = TimeSlot> {
        (Self::FIRST_HOUR..=Self::LAST_HOUR).map(TimeSlot)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00-{:02}:00", self.0, self.0 + 1)
    }
}

impl FromStr for TimeSlot {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeSlot::all()
            .find(|slot| slot.to_string() == s)
            .ok_or(ParseError::TimeSlot)
    }
}

impl Serialize for TimeSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    RangeType,
    TimeSlot,
    Date,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::RangeType => write!(f, "unknown range type"),
            ParseError::TimeSlot => write!(f, "unknown time slot"),
            ParseError::Date => write!(f, "date must be YYYY-MM-DD"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ParseError::Date)
}

/// The range is open Wednesday through Saturday.
pub fn is_open_day(date: NaiveDate) -> bool {
    matches!(
        date.weekday(),
        Weekday::Wed | Weekday::Thu | Weekday::Fri | Weekday::Sat
    )
}

/// Emails are owner keys and always compared lowercase.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The unit of capacity: one slot of one range on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub range_type: RangeType,
    pub time_slot: TimeSlot,
}

impl SlotKey {
    pub fn new(date: NaiveDate, range_type: RangeType, time_slot: TimeSlot) -> Self {
        Self {
            date,
            range_type,
            time_slot,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.date, self.range_type, self.time_slot)
    }
}

/// Per-range slot capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacities {
    pub twenty_two: u32,
    pub rifle: u32,
}

impl Capacities {
    pub fn for_range(&self, range_type: RangeType) -> u32 {
        match range_type {
            RangeType::TwentyTwo => self.twenty_two,
            RangeType::Rifle => self.rifle,
        }
    }
}

impl Default for Capacities {
    fn default() -> Self {
        Self {
            twenty_two: 5,
            rifle: 3,
        }
    }
}

/// A reservation of one slot. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub date: NaiveDate,
    pub range_type: RangeType,
    pub time_slot: TimeSlot,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(self.date, self.range_type, self.time_slot)
    }
}

/// Argon2 cost parameters, stored with every hashed credential so a
/// credential stays verifiable after the defaults change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MiB
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Stored representation of a user's password. One per email.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Credential {
    /// Written before hashing was introduced. Rehashed at startup.
    Plaintext(String),
    /// Argon2id over the password; `salt` and `hash` are base64.
    HashedV1 {
        salt: String,
        hash: String,
        params: KdfParams,
    },
    /// An imported `(hash, salt)` pair from the legacy hasher. It cannot be
    /// recomputed here, so it never verifies; it only keeps the email claimed.
    Foreign { hash: String, salt: String },
}

impl Credential {
    pub fn is_plaintext(&self) -> bool {
        matches!(self, Credential::Plaintext(_))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Plaintext(_) => f.write_str("Plaintext(..)"),
            Credential::HashedV1 { params, .. } => f
                .debug_struct("HashedV1")
                .field("params", params)
                .finish_non_exhaustive(),
            Credential::Foreign { .. } => f.write_str("Foreign(..)"),
        }
    }
}

/// All bookings held in one slot, ordered by creation.
#[derive(Debug, Clone)]
pub struct SlotState {
    pub key: SlotKey,
    pub bookings: Vec<Booking>,
}

impl SlotState {
    pub fn new(key: SlotKey) -> Self {
        Self {
            key,
            bookings: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// Insert maintaining creation order.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| (b.created_at, b.id) <= (booking.created_at, booking.id));
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn holds_email(&self, email: &str) -> bool {
        self.bookings.iter().any(|b| b.email == email)
    }
}

/// The WAL record format. State is the fold of these in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated { booking: Booking },
    BookingCancelled { id: Ulid, key: SlotKey },
    CredentialSet { email: String, credential: Credential },
}
