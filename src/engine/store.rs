use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::SharedSlotState;

/// In-memory indexes over the event stream. Slots are locked individually;
/// everything else is a concurrent map.
pub struct BookingStore {
    slots: DashMap<SlotKey, SharedSlotState>,
    booking_to_slot: DashMap<Ulid, SlotKey>,
    by_email: DashMap<String, Vec<Ulid>>,
    credentials: DashMap<String, Credential>,
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            booking_to_slot: DashMap::new(),
            by_email: DashMap::new(),
            credentials: DashMap::new(),
        }
    }

    // ── Slots ────────────────────────────────────────────────

    pub fn get_slot(&self, key: &SlotKey) -> Option<SharedSlotState> {
        self.slots.get(key).map(|e| e.value().clone())
    }

    /// Slots are created lazily on first booking and never removed, so a
    /// handle taken here stays the one every writer locks.
    pub fn get_or_create_slot(&self, key: SlotKey) -> SharedSlotState {
        self.slots
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(SlotState::new(key))))
            .value()
            .clone()
    }

    pub fn slot_keys(&self) -> Vec<SlotKey> {
        self.slots.iter().map(|e| *e.key()).collect()
    }

    // ── Booking index ────────────────────────────────────────

    pub fn slot_for_booking(&self, id: &Ulid) -> Option<SlotKey> {
        self.booking_to_slot.get(id).map(|e| *e.value())
    }

    pub fn contains_booking(&self, id: &Ulid) -> bool {
        self.booking_to_slot.contains_key(id)
    }

    pub fn booking_count(&self) -> usize {
        self.booking_to_slot.len()
    }

    pub fn bookings_for_email(&self, email: &str) -> Vec<Ulid> {
        self.by_email
            .get(email)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn email_booking_count(&self, email: &str) -> usize {
        self.by_email.get(email).map_or(0, |e| e.len())
    }

    // ── Credentials ──────────────────────────────────────────

    pub fn credential(&self, email: &str) -> Option<Credential> {
        self.credentials.get(email).map(|e| e.value().clone())
    }

    pub fn has_credential(&self, email: &str) -> bool {
        self.credentials.contains_key(email)
    }

    pub fn plaintext_credentials(&self) -> Vec<(String, Credential)> {
        self.credentials
            .iter()
            .filter(|e| e.value().is_plaintext())
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn credential_entries(&self) -> Vec<(String, Credential)> {
        self.credentials
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    // ── Event application ────────────────────────────────────

    /// Apply a booking event to its slot. The caller holds the slot's write lock.
    pub fn apply_to_slot(&self, slot: &mut SlotState, event: &Event) {
        match event {
            Event::BookingCreated { booking } => {
                self.booking_to_slot.insert(booking.id, slot.key);
                self.by_email
                    .entry(booking.email.clone())
                    .or_default()
                    .push(booking.id);
                slot.insert_booking(booking.clone());
            }
            Event::BookingCancelled { id, .. } => {
                if let Some(booking) = slot.remove_booking(*id) {
                    self.booking_to_slot.remove(id);
                    let now_empty = match self.by_email.get_mut(&booking.email) {
                        Some(mut ids) => {
                            ids.retain(|b| b != id);
                            ids.is_empty()
                        }
                        None => false,
                    };
                    if now_empty {
                        self.by_email.remove_if(&booking.email, |_, ids| ids.is_empty());
                    }
                }
            }
            Event::CredentialSet { .. } => self.apply_credential(event),
        }
    }

    pub fn apply_credential(&self, event: &Event) {
        if let Event::CredentialSet { email, credential } = event {
            self.credentials.insert(email.clone(), credential.clone());
        }
    }
}
