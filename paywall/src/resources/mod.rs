//! Paid resources and the paywall.
//!
//! A resource is either free or priced in points. Users unlock priced
//! resources by spending points; the debit and the unlock record are written
//! in one atomic unit by the repository, so a user is never charged without
//! gaining access (or the reverse).
//!
//! [`gate::is_unlocked`] is the pure visibility rule shared by the server and
//! the client.

pub mod errors;
pub mod gate;
pub mod manager;
pub mod models;

pub use errors::{ResourceError, ResourceResult};
pub use gate::{Entitlements, is_unlocked};
pub use manager::ResourceManager;
pub use models::{
    NewResource, PurchaseReceipt, PurchaseResponse, Resource, ResourceId, ResourceView,
    UnlockRecord, purchase_reference,
};
