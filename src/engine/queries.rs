use chrono::NaiveDate;

use crate::model::*;

use super::Engine;

impl Engine {
    /// Bookings currently held in one slot.
    pub async fn count_bookings(&self, key: &SlotKey) -> usize {
        match self.store.get_slot(key) {
            Some(slot) => slot.read().await.len(),
            None => 0,
        }
    }

    pub async fn list_slot(&self, key: &SlotKey) -> Vec<Booking> {
        match self.store.get_slot(key) {
            Some(slot) => slot.read().await.bookings.clone(),
            None => Vec::new(),
        }
    }

    /// Every booking for a range on a day, ordered by slot then creation.
    pub async fn list_availability(&self, date: NaiveDate, range_type: RangeType) -> Vec<Booking> {
        let mut out = Vec::new();
        for time_slot in TimeSlot::all() {
            out.extend(self.list_slot(&SlotKey::new(date, range_type, time_slot)).await);
        }
        out
    }

    /// All bookings owned by `email` (already normalized), ordered by date,
    /// slot, then creation.
    pub async fn list_user_bookings(&self, email: &str) -> Vec<Booking> {
        let mut out = Vec::new();
        for id in self.store.bookings_for_email(email) {
            // A booking cancelled since the index read has no slot entry.
            let Some(key) = self.store.slot_for_booking(&id) else {
                continue;
            };
            let Some(slot) = self.store.get_slot(&key) else {
                continue;
            };
            if let Some(booking) = slot.read().await.get(id) {
                out.push(booking.clone());
            }
        }
        out.sort_by(|a, b| {
            (a.date, a.time_slot, a.created_at).cmp(&(b.date, b.time_slot, b.created_at))
        });
        out
    }

    pub fn credential(&self, email: &str) -> Option<Credential> {
        self.store.credential(email)
    }

    pub fn booking_count(&self) -> usize {
        self.store.booking_count()
    }
}
