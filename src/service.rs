//! The booking request handler: validates input, applies the credential
//! policy and maps engine outcomes onto the public error taxonomy.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::*;
use crate::model::*;
use crate::password::{self, CredentialHasher};

pub const MSG_DATE_AND_RANGE_REQUIRED: &str = "Date and range type are required";
pub const MSG_ALL_FIELDS_REQUIRED: &str = "All fields are required";
pub const MSG_SLOT_FULL: &str = "This time slot is fully booked";
pub const MSG_ALREADY_IN_SLOT: &str = "You already have a booking for this time slot";
pub const MSG_INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const MSG_CANCEL_DENIED: &str = "Booking not found or not authorized";
pub const MSG_CANCEL_FIELDS_REQUIRED: &str = "Booking ID and email are required";
pub const MSG_CANCEL_PASSWORD_REQUIRED: &str = "Booking ID, email and password are required";
pub const MSG_VERIFY_FIELDS_REQUIRED: &str = "Email and password are required";

/// Outcome taxonomy shared by every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    Validation(String),
    Conflict(String),
    /// Deliberately the same for "no such user" and "wrong password".
    Auth(String),
    NotFound(String),
    /// Carries only the user-facing message; details are logged.
    Internal(String),
}

impl ServiceError {
    pub fn message(&self) -> &str {
        match self {
            ServiceError::Validation(m)
            | ServiceError::Conflict(m)
            | ServiceError::Auth(m)
            | ServiceError::NotFound(m)
            | ServiceError::Internal(m) => m,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Auth(_) => "auth",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.label(), self.message())
    }
}

impl std::error::Error for ServiceError {}

/// The operations the handler dispatches between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListAvailability,
    ListUserBookings,
    VerifyCredentials,
    CreateBooking,
    CancelBooking,
}

impl Operation {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Operation::ListAvailability => "list_availability",
            Operation::ListUserBookings => "list_user_bookings",
            Operation::VerifyCredentials => "verify_credentials",
            Operation::CreateBooking => "create_booking",
            Operation::CancelBooking => "cancel_booking",
        }
    }
}

/// Listing query. An absent or blank email selects availability.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub email: Option<String>,
    pub date: Option<String>,
    pub range_type: Option<String>,
    #[serde(default)]
    pub upcoming: bool,
}

impl ListQuery {
    pub fn operation(&self) -> Operation {
        if present(&self.email).is_some() {
            Operation::ListUserBookings
        } else {
            Operation::ListAvailability
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date: Option<String>,
    pub range_type: Option<String>,
    pub time_slot: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelBookingRequest {
    pub id: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Knobs that differ between deployments.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    /// Creates and cancels must carry a password.
    pub require_password: bool,
    /// Reject dates outside Wednesday to Saturday.
    pub enforce_open_days: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            require_password: true,
            enforce_open_days: true,
        }
    }
}

fn create_error(e: EngineError) -> ServiceError {
    match e {
        EngineError::CapacityExceeded { key, capacity } => {
            warn!("{key} is full ({capacity})");
            ServiceError::Conflict(MSG_SLOT_FULL.to_string())
        }
        EngineError::DuplicateSlot(_) => ServiceError::Conflict(MSG_ALREADY_IN_SLOT.to_string()),
        EngineError::LimitExceeded(what) => {
            ServiceError::Validation(format!("Booking rejected: {what}"))
        }
        e => {
            error!("error creating booking: {e}");
            ServiceError::Internal("Failed to create booking".to_string())
        }
    }
}

/// Trimmed, non-empty value of an optional field.
fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn validation(msg: &str) -> ServiceError {
    ServiceError::Validation(msg.to_string())
}

pub struct BookingService {
    engine: Arc<Engine>,
    hasher: CredentialHasher,
    policy: Policy,
    /// Checked in place of a missing credential.
    decoy: Credential,
}

impl BookingService {
    pub fn new(engine: Arc<Engine>, hasher: CredentialHasher, policy: Policy) -> Self {
        Self {
            engine,
            decoy: password::timing_decoy(hasher.params()),
            hasher,
            policy,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// `GET` dispatch: user bookings when an email is given, availability otherwise.
    pub async fn list(&self, query: &ListQuery) -> Result<Vec<Booking>, ServiceError> {
        match present(&query.email) {
            Some(email) => Ok(self.list_user_bookings(email, query.upcoming).await),
            None => {
                self.list_availability(query.date.as_deref(), query.range_type.as_deref())
                    .await
            }
        }
    }

    pub async fn list_availability(
        &self,
        date: Option<&str>,
        range_type: Option<&str>,
    ) -> Result<Vec<Booking>, ServiceError> {
        let (Some(date), Some(range_type)) = (
            date.map(str::trim).filter(|s| !s.is_empty()),
            range_type.map(str::trim).filter(|s| !s.is_empty()),
        ) else {
            return Err(validation(MSG_DATE_AND_RANGE_REQUIRED));
        };
        let date = parse_date(date).map_err(|e| ServiceError::Validation(e.to_string()))?;
        let range_type: RangeType = range_type
            .parse()
            .map_err(|e: ParseError| ServiceError::Validation(e.to_string()))?;
        Ok(self.engine.list_availability(date, range_type).await)
    }

    pub async fn list_user_bookings(&self, email: &str, upcoming: bool) -> Vec<Booking> {
        let mut bookings = self.engine.list_user_bookings(&normalize_email(email)).await;
        if upcoming {
            let today = Utc::now().date_naive();
            bookings.retain(|b| b.date >= today);
        }
        bookings
    }

    pub async fn verify_credentials(&self, req: &VerifyRequest) -> Result<Vec<Booking>, ServiceError> {
        let (Some(email), Some(password)) = (present(&req.email), req.password.as_deref()) else {
            return Err(validation(MSG_VERIFY_FIELDS_REQUIRED));
        };
        let email = normalize_email(email);
        self.authenticate(&email, password, Operation::VerifyCredentials)
            .await?;
        Ok(self.engine.list_user_bookings(&email).await)
    }

    /// Check `password` against the stored credential. An unknown email and a
    /// wrong password produce the same error after the same hashing work.
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
        operation: Operation,
    ) -> Result<(), ServiceError> {
        let (credential, known) = match self.engine.credential(email) {
            Some(credential) => (credential, true),
            None => (self.decoy.clone(), false),
        };
        let ok = password::verify_blocking(password.to_string(), credential).await && known;
        if ok {
            return Ok(());
        }
        metrics::counter!(
            crate::observability::AUTH_FAILURES_TOTAL,
            "operation" => operation.label()
        )
        .increment(1);
        warn!("{} rejected for {email}", operation.label());
        Err(ServiceError::Auth(MSG_INVALID_CREDENTIALS.to_string()))
    }

    pub async fn create_booking(&self, req: CreateBookingRequest) -> Result<Booking, ServiceError> {
        let (Some(name), Some(email), Some(date), Some(range_type), Some(time_slot)) = (
            present(&req.name),
            present(&req.email),
            present(&req.date),
            present(&req.range_type),
            present(&req.time_slot),
        ) else {
            return Err(validation(MSG_ALL_FIELDS_REQUIRED));
        };
        let password = req.password.as_deref().filter(|p| !p.is_empty());
        if self.policy.require_password && password.is_none() {
            return Err(validation(MSG_ALL_FIELDS_REQUIRED));
        }
        if let Some(p) = password {
            if p.chars().count() < MIN_PASSWORD_LEN {
                return Err(ServiceError::Validation(format!(
                    "Password must be at least {MIN_PASSWORD_LEN} characters"
                )));
            }
            if p.len() > MAX_PASSWORD_LEN {
                return Err(validation("Password is too long"));
            }
        }
        if name.len() > MAX_NAME_LEN {
            return Err(validation("Name is too long"));
        }
        let email = normalize_email(email);
        if email.len() > MAX_EMAIL_LEN || !email.contains('@') {
            return Err(validation("Email is invalid"));
        }
        let date = parse_date(date).map_err(|e| ServiceError::Validation(e.to_string()))?;
        self.check_open_day(date)?;
        let range_type: RangeType = range_type
            .parse()
            .map_err(|e: ParseError| ServiceError::Validation(e.to_string()))?;
        let time_slot: TimeSlot = time_slot
            .parse()
            .map_err(|e: ParseError| ServiceError::Validation(e.to_string()))?;

        let booking = Booking {
            id: Ulid::new(),
            name: name.to_string(),
            email,
            date,
            range_type,
            time_slot,
            created_at: Utc::now(),
        };
        let booking = match password {
            Some(password) => self.admit_with_password(booking, password).await?,
            None => self.engine.create_booking(booking).await.map_err(create_error)?,
        };
        info!("booked {} for {} ({})", booking.slot_key(), booking.email, booking.id);
        Ok(booking)
    }

    fn check_open_day(&self, date: NaiveDate) -> Result<(), ServiceError> {
        if self.policy.enforce_open_days && !is_open_day(date) {
            return Err(validation(
                "The shooting range is only open Wednesday through Saturday",
            ));
        }
        Ok(())
    }

    /// A first-time email gets its credential stored in the same commit as
    /// the booking. Any other email must present the stored password.
    async fn admit_with_password(&self, booking: Booking, password: &str) -> Result<Booking, ServiceError> {
        let email = booking.email.clone();
        if self.engine.credential(&email).is_none() {
            let credential = self
                .hasher
                .hash_blocking(password.to_string())
                .await
                .map_err(|e| create_error(EngineError::Hashing(e)))?;
            match self
                .engine
                .create_booking_with_credential(booking.clone(), credential)
                .await
            {
                // Registered by a concurrent request, or held without a
                // credential: only the stored password can get past here.
                Err(EngineError::CredentialExists(_) | EngineError::Unclaimed(_)) => {}
                other => return other.map_err(create_error),
            }
        }
        self.authenticate(&email, password, Operation::CreateBooking)
            .await?;
        self.engine.create_booking(booking).await.map_err(create_error)
    }
    pub async fn cancel_booking(&self, req: &CancelBookingRequest) -> Result<(), ServiceError> {
        let require_password = self.policy.require_password;
        let (Some(id), Some(email)) = (present(&req.id), present(&req.email)) else {
            return Err(validation(if require_password {
                MSG_CANCEL_PASSWORD_REQUIRED
            } else {
                MSG_CANCEL_FIELDS_REQUIRED
            }));
        };
        let password = req.password.as_deref().filter(|p| !p.is_empty());
        if require_password && password.is_none() {
            return Err(validation(MSG_CANCEL_PASSWORD_REQUIRED));
        }

        let denied = || {
            if require_password {
                ServiceError::Auth(MSG_CANCEL_DENIED.to_string())
            } else {
                ServiceError::NotFound(MSG_CANCEL_DENIED.to_string())
            }
        };

        let email = normalize_email(email);
        if let (true, Some(password)) = (require_password, password) {
            if self
                .authenticate(&email, password, Operation::CancelBooking)
                .await
                .is_err()
            {
                return Err(denied());
            }
        }
        let Ok(id) = Ulid::from_string(id) else {
            return Err(denied());
        };

        match self.engine.cancel_booking(id, &email).await {
            Ok(booking) => {
                info!("cancelled {} ({}) for {email}", booking.slot_key(), booking.id);
                Ok(())
            }
            Err(EngineError::NotFound(_)) => Err(denied()),
            Err(e) => {
                error!("error deleting booking: {e}");
                Err(ServiceError::Internal("Failed to delete booking".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::fast_hasher;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("rangebook_test_service");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn service(name: &str, policy: Policy) -> BookingService {
        let engine = Arc::new(Engine::new(test_wal_path(name), Capacities::default()).unwrap());
        BookingService::new(engine, fast_hasher(), policy)
    }

    fn create_req(email: &str, slot: &str, password: &str) -> CreateBookingRequest {
        CreateBookingRequest {
            name: Some("A".into()),
            email: Some(email.into()),
            date: Some("2024-06-05".into()),
            range_type: Some("Rifle Range".into()),
            time_slot: Some(slot.into()),
            password: Some(password.into()),
        }
    }

    #[tokio::test]
    async fn create_then_list_is_case_insensitive() {
        let svc = service("svc_case.wal", Policy::default());
        let created = svc
            .create_booking(create_req("X@Y.com", "09:00-10:00", "abcd"))
            .await
            .unwrap();
        assert_eq!(created.email, "x@y.com");

        let listed = svc.list_user_bookings("x@y.com", false).await;
        assert_eq!(listed, vec![created.clone()]);
        let listed_upper = svc.list_user_bookings("X@Y.COM", false).await;
        assert_eq!(listed_upper, vec![created]);
    }

    #[tokio::test]
    async fn fourth_rifle_booking_conflicts() {
        let svc = service("svc_conflict.wal", Policy::default());
        for i in 0..3 {
            svc.create_booking(create_req(&format!("u{i}@example.com"), "09:00-10:00", "abcd"))
                .await
                .unwrap();
        }
        let err = svc
            .create_booking(create_req("late@example.com", "09:00-10:00", "abcd"))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Conflict(MSG_SLOT_FULL.into()));

        let key = SlotKey::new(
            parse_date("2024-06-05").unwrap(),
            RangeType::Rifle,
            "09:00-10:00".parse().unwrap(),
        );
        assert_eq!(svc.engine().count_bookings(&key).await, 3);
    }

    #[tokio::test]
    async fn refused_first_booking_leaves_email_unclaimed() {
        let svc = service("svc_refused_first.wal", Policy::default());
        for i in 0..3 {
            svc.create_booking(create_req(&format!("u{i}@example.com"), "09:00-10:00", "abcd"))
                .await
                .unwrap();
        }
        let err = svc
            .create_booking(create_req("late@example.com", "09:00-10:00", "first"))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Conflict(MSG_SLOT_FULL.into()));
        assert!(svc.engine().credential("late@example.com").is_none());

        // The refused password was never bound, so a different one works.
        svc.create_booking(create_req("late@example.com", "10:00-11:00", "second"))
            .await
            .unwrap();
        assert_eq!(
            svc.create_booking(create_req("late@example.com", "11:00-12:00", "first"))
                .await
                .unwrap_err(),
            ServiceError::Auth(MSG_INVALID_CREDENTIALS.into())
        );
    }

    #[tokio::test]
    async fn imported_emails_cannot_be_claimed() {
        let svc = service("svc_imported.wal", Policy::default());
        let legacy_row = |id: i64, email: &str, hash: Option<&str>, salt: Option<&str>| {
            serde_json::from_value::<crate::legacy::LegacyRow>(serde_json::json!({
                "id": id,
                "name": "Legacy Shooter",
                "email": email,
                "date": "2024-06-05",
                "range_type": "Rifle Range",
                "time_slot": "09:00-10:00",
                "created_at": "2024-06-01T10:00:00Z",
                "password_hash": hash,
                "salt": salt,
            }))
            .unwrap()
        };
        crate::legacy::import_rows(
            svc.engine(),
            vec![
                legacy_row(1, "hashed@example.com", Some("abc123"), Some("9f8e7d")),
                legacy_row(2, "bare@example.com", None, None),
            ],
        )
        .await
        .unwrap();
        let owned = svc.engine().list_user_bookings("hashed@example.com").await;
        assert_eq!(owned.len(), 1);

        for email in ["hashed@example.com", "bare@example.com"] {
            assert_eq!(
                svc.create_booking(create_req(email, "10:00-11:00", "taken"))
                    .await
                    .unwrap_err(),
                ServiceError::Auth(MSG_INVALID_CREDENTIALS.into())
            );
            assert!(svc
                .verify_credentials(&VerifyRequest {
                    email: Some(email.into()),
                    password: Some("taken".into()),
                })
                .await
                .is_err());
        }
        assert!(svc.engine().credential("bare@example.com").is_none());

        let cancel = CancelBookingRequest {
            id: Some(owned[0].id.to_string()),
            email: Some("hashed@example.com".into()),
            password: Some("taken".into()),
        };
        assert_eq!(
            svc.cancel_booking(&cancel).await,
            Err(ServiceError::Auth(MSG_CANCEL_DENIED.into()))
        );
        assert_eq!(svc.engine().booking_count(), 2);
    }

    #[tokio::test]
    async fn create_validation() {
        let svc = service("svc_validation.wal", Policy::default());

        let mut missing = create_req("a@example.com", "09:00-10:00", "abcd");
        missing.name = None;
        assert_eq!(
            svc.create_booking(missing).await.unwrap_err(),
            ServiceError::Validation(MSG_ALL_FIELDS_REQUIRED.into())
        );

        let mut blank = create_req("a@example.com", "09:00-10:00", "abcd");
        blank.range_type = Some("   ".into());
        assert!(matches!(
            svc.create_booking(blank).await,
            Err(ServiceError::Validation(_))
        ));

        let short = create_req("a@example.com", "09:00-10:00", "abc");
        assert!(matches!(
            svc.create_booking(short).await,
            Err(ServiceError::Validation(m)) if m.contains("at least 4")
        ));

        let no_password = CreateBookingRequest {
            password: None,
            ..create_req("a@example.com", "09:00-10:00", "abcd")
        };
        assert!(matches!(
            svc.create_booking(no_password).await,
            Err(ServiceError::Validation(_))
        ));

        let bad_slot = create_req("a@example.com", "08:00-09:00", "abcd");
        assert!(matches!(
            svc.create_booking(bad_slot).await,
            Err(ServiceError::Validation(_))
        ));

        let mut bad_range = create_req("a@example.com", "09:00-10:00", "abcd");
        bad_range.range_type = Some("Pistol Range".into());
        assert!(matches!(
            svc.create_booking(bad_range).await,
            Err(ServiceError::Validation(_))
        ));

        let mut sunday = create_req("a@example.com", "09:00-10:00", "abcd");
        sunday.date = Some("2024-06-09".into());
        assert!(matches!(
            svc.create_booking(sunday).await,
            Err(ServiceError::Validation(m)) if m.contains("Wednesday")
        ));

        assert_eq!(svc.engine().booking_count(), 0);
    }

    #[tokio::test]
    async fn closed_days_allowed_when_not_enforced() {
        let svc = service(
            "svc_open_days.wal",
            Policy {
                enforce_open_days: false,
                ..Policy::default()
            },
        );
        let mut sunday = create_req("a@example.com", "09:00-10:00", "abcd");
        sunday.date = Some("2024-06-09".into());
        assert!(svc.create_booking(sunday).await.is_ok());
    }

    #[tokio::test]
    async fn second_booking_requires_same_password() {
        let svc = service("svc_same_pw.wal", Policy::default());
        svc.create_booking(create_req("a@example.com", "09:00-10:00", "abcd"))
            .await
            .unwrap();
        let err = svc
            .create_booking(create_req("a@example.com", "10:00-11:00", "zzzz"))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Auth(MSG_INVALID_CREDENTIALS.into()));
        assert!(svc
            .create_booking(create_req("A@example.com", "10:00-11:00", "abcd"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn same_email_twice_in_one_slot_conflicts() {
        let svc = service("svc_dup_slot.wal", Policy::default());
        svc.create_booking(create_req("a@example.com", "09:00-10:00", "abcd"))
            .await
            .unwrap();
        assert_eq!(
            svc.create_booking(create_req("a@example.com", "09:00-10:00", "abcd"))
                .await
                .unwrap_err(),
            ServiceError::Conflict(MSG_ALREADY_IN_SLOT.into())
        );
    }

    #[tokio::test]
    async fn verify_failures_are_indistinguishable() {
        let svc = service("svc_verify.wal", Policy::default());
        let created = svc
            .create_booking(create_req("x@y.com", "09:00-10:00", "abcd"))
            .await
            .unwrap();

        let wrong = svc
            .verify_credentials(&VerifyRequest {
                email: Some("x@y.com".into()),
                password: Some("wrong".into()),
            })
            .await
            .unwrap_err();
        let unknown = svc
            .verify_credentials(&VerifyRequest {
                email: Some("nobody@y.com".into()),
                password: Some("wrong".into()),
            })
            .await
            .unwrap_err();
        assert_eq!(wrong, unknown);
        assert_eq!(wrong, ServiceError::Auth(MSG_INVALID_CREDENTIALS.into()));

        let ok = svc
            .verify_credentials(&VerifyRequest {
                email: Some("X@Y.com".into()),
                password: Some("abcd".into()),
            })
            .await
            .unwrap();
        assert_eq!(ok, vec![created]);
    }

    #[tokio::test]
    async fn cancel_failures_are_uniform() {
        let svc = service("svc_cancel.wal", Policy::default());
        let mine = svc
            .create_booking(create_req("me@example.com", "09:00-10:00", "abcd"))
            .await
            .unwrap();
        let theirs = svc
            .create_booking(create_req("them@example.com", "09:00-10:00", "efgh"))
            .await
            .unwrap();

        let cancel = |id: String, email: &str, password: &str| CancelBookingRequest {
            id: Some(id),
            email: Some(email.into()),
            password: Some(password.into()),
        };

        let outcomes = vec![
            svc.cancel_booking(&cancel(Ulid::new().to_string(), "me@example.com", "abcd")).await,
            svc.cancel_booking(&cancel(theirs.id.to_string(), "me@example.com", "abcd")).await,
            svc.cancel_booking(&cancel(mine.id.to_string(), "me@example.com", "nope")).await,
            svc.cancel_booking(&cancel("not-a-ulid".into(), "me@example.com", "abcd")).await,
            svc.cancel_booking(&cancel(mine.id.to_string(), "ghost@example.com", "abcd")).await,
        ];
        for outcome in outcomes {
            assert_eq!(outcome, Err(ServiceError::Auth(MSG_CANCEL_DENIED.into())));
        }
        assert_eq!(svc.engine().booking_count(), 2);

        svc.cancel_booking(&cancel(mine.id.to_string(), "ME@example.com", "abcd"))
            .await
            .unwrap();
        assert_eq!(svc.engine().booking_count(), 1);

        // Already gone: same outcome again.
        assert_eq!(
            svc.cancel_booking(&cancel(mine.id.to_string(), "me@example.com", "abcd"))
                .await,
            Err(ServiceError::Auth(MSG_CANCEL_DENIED.into()))
        );
    }

    #[tokio::test]
    async fn passwordless_policy_uses_not_found() {
        let svc = service(
            "svc_passwordless.wal",
            Policy {
                require_password: false,
                ..Policy::default()
            },
        );
        let created = svc
            .create_booking(CreateBookingRequest {
                password: None,
                ..create_req("a@example.com", "09:00-10:00", "")
            })
            .await
            .unwrap();
        assert!(svc.engine().credential("a@example.com").is_none());

        let wrong_owner = svc
            .cancel_booking(&CancelBookingRequest {
                id: Some(created.id.to_string()),
                email: Some("b@example.com".into()),
                password: None,
            })
            .await;
        assert_eq!(wrong_owner, Err(ServiceError::NotFound(MSG_CANCEL_DENIED.into())));

        svc.cancel_booking(&CancelBookingRequest {
            id: Some(created.id.to_string()),
            email: Some("a@example.com".into()),
            password: None,
        })
        .await
        .unwrap();
        assert_eq!(svc.engine().booking_count(), 0);
    }

    #[tokio::test]
    async fn list_dispatch() {
        let svc = service("svc_list.wal", Policy::default());
        let created = svc
            .create_booking(create_req("a@example.com", "11:00-12:00", "abcd"))
            .await
            .unwrap();

        let by_email = ListQuery {
            email: Some("A@example.com".into()),
            ..ListQuery::default()
        };
        assert_eq!(by_email.operation(), Operation::ListUserBookings);
        assert_eq!(svc.list(&by_email).await.unwrap(), vec![created.clone()]);

        let blank_email = ListQuery {
            email: Some("".into()),
            ..ListQuery::default()
        };
        assert_eq!(blank_email.operation(), Operation::ListAvailability);
        assert_eq!(
            svc.list(&blank_email).await.unwrap_err(),
            ServiceError::Validation(MSG_DATE_AND_RANGE_REQUIRED.into())
        );

        let availability = ListQuery {
            date: Some("2024-06-05".into()),
            range_type: Some("Rifle Range".into()),
            ..ListQuery::default()
        };
        assert_eq!(svc.list(&availability).await.unwrap(), vec![created]);

        let other_range = ListQuery {
            date: Some("2024-06-05".into()),
            range_type: Some(".22 Range".into()),
            ..ListQuery::default()
        };
        assert!(svc.list(&other_range).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upcoming_filters_past_dates() {
        let svc = service("svc_upcoming.wal", Policy::default());
        svc.create_booking(create_req("a@example.com", "09:00-10:00", "abcd"))
            .await
            .unwrap();
        assert_eq!(svc.list_user_bookings("a@example.com", false).await.len(), 1);
        assert!(svc.list_user_bookings("a@example.com", true).await.is_empty());
    }
}
