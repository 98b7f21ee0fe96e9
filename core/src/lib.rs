pub mod cofid_import;
pub mod db;
pub mod firestore;
pub mod models;
pub mod reconcile;
pub mod store;
