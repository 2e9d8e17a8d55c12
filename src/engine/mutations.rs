use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::password::CredentialHasher;

use super::capacity::{check_admission, validate_booking};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Count-and-insert under the slot's write lock: the booking is admitted
    /// only while the slot is below capacity for its range.
    pub async fn create_booking(&self, booking: Booking) -> Result<Booking, EngineError> {
        self.admit(booking, None).await
    }

    /// Create the first booking for an email together with its credential.
    /// Both land in one WAL commit, so a refused booking leaves no credential
    /// behind. Fails with `CredentialExists` when the email already has one
    /// and with `Unclaimed` when it holds bookings without one.
    pub async fn create_booking_with_credential(
        &self,
        booking: Booking,
        credential: Credential,
    ) -> Result<Booking, EngineError> {
        self.admit(booking, Some(credential)).await
    }

    async fn admit(
        &self,
        booking: Booking,
        credential: Option<Credential>,
    ) -> Result<Booking, EngineError> {
        validate_booking(&booking)?;
        if self.store.contains_booking(&booking.id) {
            return Err(EngineError::AlreadyExists(booking.id.to_string()));
        }

        let capacity = self.capacities.for_range(booking.range_type);
        let _gate = self.write_gate.read().await;
        // Lock order: gate, email, credential, slot.
        let _email = self.lock_email(&booking.email).await;
        if self.store.email_booking_count(&booking.email) >= MAX_BOOKINGS_PER_EMAIL {
            return Err(EngineError::LimitExceeded("too many bookings for email"));
        }

        let _credential_lock = match &credential {
            Some(_) => {
                let lock = self.credential_lock.lock().await;
                if self.store.has_credential(&booking.email) {
                    return Err(EngineError::CredentialExists(booking.email.clone()));
                }
                if self.store.email_booking_count(&booking.email) > 0 {
                    return Err(EngineError::Unclaimed(booking.email.clone()));
                }
                Some(lock)
            }
            None => None,
        };

        let slot = self.store.get_or_create_slot(booking.slot_key());
        let mut guard = slot.write().await;
        if guard.get(booking.id).is_some() {
            return Err(EngineError::AlreadyExists(booking.id.to_string()));
        }
        if let Err(e) = check_admission(&guard, &booking, capacity) {
            if matches!(e, EngineError::CapacityExceeded { .. }) {
                metrics::counter!(
                    crate::observability::CAPACITY_REJECTIONS_TOTAL,
                    "range" => booking.range_type.label()
                )
                .increment(1);
            }
            return Err(e);
        }

        let created = Event::BookingCreated {
            booking: booking.clone(),
        };
        match credential {
            Some(credential) => {
                let set = Event::CredentialSet {
                    email: booking.email.clone(),
                    credential,
                };
                self.wal_append_all(vec![set.clone(), created.clone()]).await?;
                self.store.apply_credential(&set);
                self.store.apply_to_slot(&mut guard, &created);
            }
            None => self.persist_and_apply(&mut guard, &created).await?,
        }
        metrics::counter!(
            crate::observability::BOOKINGS_CREATED_TOTAL,
            "range" => booking.range_type.label()
        )
        .increment(1);
        Ok(booking)
    }

    /// Delete a booking owned by `email`. An unknown id and another owner's
    /// id are both `NotFound`.
    pub async fn cancel_booking(&self, id: Ulid, email: &str) -> Result<Booking, EngineError> {
        let key = self
            .store
            .slot_for_booking(&id)
            .ok_or(EngineError::NotFound(id))?;
        let slot = self.store.get_slot(&key).ok_or(EngineError::NotFound(id))?;

        let _gate = self.write_gate.read().await;
        let mut guard = slot.write().await;
        // Re-read under the lock: a concurrent cancel may have won.
        let booking = guard
            .get(id)
            .filter(|b| b.email == email)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        let event = Event::BookingCancelled { id, key };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(booking)
    }

    /// Store the first credential for an email that was imported without
    /// going through `create_booking_with_credential`. Fails with
    /// `AlreadyExists` if one is already present.
    pub async fn register_credential(
        &self,
        email: &str,
        credential: Credential,
    ) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        let _lock = self.credential_lock.lock().await;
        if self.store.has_credential(email) {
            return Err(EngineError::AlreadyExists(email.to_string()));
        }
        self.persist_credential(email, credential).await
    }

    async fn persist_credential(&self, email: &str, credential: Credential) -> Result<(), EngineError> {
        let event = Event::CredentialSet {
            email: email.to_string(),
            credential,
        };
        self.wal_append(&event).await?;
        self.store.apply_credential(&event);
        Ok(())
    }

    /// Rehash every plaintext credential. Returns how many were migrated.
    pub async fn migrate_legacy_credentials(
        &self,
        hasher: &CredentialHasher,
    ) -> Result<usize, EngineError> {
        let mut migrated = 0;
        for (email, credential) in self.store.plaintext_credentials() {
            let Credential::Plaintext(password) = &credential else {
                continue;
            };
            let hashed = hasher.hash_blocking(password.clone()).await?;

            let _gate = self.write_gate.read().await;
            let _lock = self.credential_lock.lock().await;
            // Skip if the credential changed while we were hashing.
            if self.store.credential(&email).as_ref() != Some(&credential) {
                continue;
            }
            self.persist_credential(&email, hashed).await?;
            migrated += 1;
        }
        if migrated > 0 {
            metrics::counter!(crate::observability::CREDENTIALS_MIGRATED_TOTAL)
                .increment(migrated as u64);
            tracing::info!("migrated {migrated} legacy plaintext credentials");
        }
        Ok(migrated)
    }

    /// Rewrite the WAL with only the events needed to recreate current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.write_gate.write().await;

        let mut events: Vec<Event> = self
            .store
            .credential_entries()
            .into_iter()
            .map(|(email, credential)| Event::CredentialSet { email, credential })
            .collect();

        let mut keys = self.store.slot_keys();
        keys.sort();
        for key in keys {
            let Some(slot) = self.store.get_slot(&key) else {
                continue;
            };
            let guard = slot.read().await;
            events.extend(guard.bookings.iter().map(|b| Event::BookingCreated {
                booking: b.clone(),
            }));
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
