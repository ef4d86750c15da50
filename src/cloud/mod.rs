//! Backend wire shapes.
//!
//! Pure encode/decode for the two cloud surfaces the feeder talks to:
//! the Firestore REST document store ([`firestore`]) and the Realtime
//! Database event stream ([`rtdb`]).  No I/O here; the ESP-IDF adapter in
//! [`crate::adapters`] moves the bytes.

pub mod firestore;
pub mod rtdb;

/// Firestore collection holding one document per registered feeder.
pub const FEEDERS_COLLECTION: &str = "feeders";
/// Firestore collection holding owner profiles.
pub const USERS_COLLECTION: &str = "users";

/// `feeders/{identity}/schedules`
pub fn schedules_path(identity: &str) -> String {
    format!("{FEEDERS_COLLECTION}/{identity}/schedules")
}

/// `users/{owner}`
pub fn owner_path(owner_id: &str) -> String {
    format!("{USERS_COLLECTION}/{owner_id}")
}

/// `/commands/{identity}`
pub fn command_path(identity: &str) -> String {
    format!("/commands/{identity}")
}
