pub mod envelopes;

pub use envelopes::{ErrorEnvelope, FirestoreResponse, Status, StorageListingResponse};
